//! Cutting order items and their normalization.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcut_core::{ComponentId, DomainError, DomainResult, quantity};

/// One persisted (order, component) row. Unique per order; quantity > 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub component_id: ComponentId,
    pub quantity: Decimal,
}

/// Caller-supplied item, possibly duplicated or not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemInput {
    pub component_id: ComponentId,
    pub quantity: Decimal,
}

impl OrderItemInput {
    pub fn new(component_id: ComponentId, quantity: Decimal) -> Self {
        Self {
            component_id,
            quantity,
        }
    }

    /// Coerce free-form input (e.g. form fields) into a typed item.
    pub fn parse(component: &str, quantity: &str) -> DomainResult<Self> {
        let component_id = component
            .parse::<ComponentId>()
            .map_err(|e| DomainError::validation(format!("invalid component reference: {e}")))?;
        let quantity = quantity::parse_positive(quantity, "item quantity")?;
        Ok(Self {
            component_id,
            quantity,
        })
    }
}

/// Validate every quantity and merge duplicate components by summation.
///
/// The result is sorted by component id, which is also the lock order used when
/// reserving or debiting.
pub fn normalize_items(inputs: &[OrderItemInput]) -> DomainResult<Vec<OrderItem>> {
    let mut merged: BTreeMap<ComponentId, Decimal> = BTreeMap::new();
    for input in inputs {
        let qty = quantity::positive(input.quantity, "item quantity")?;
        *merged.entry(input.component_id).or_insert(Decimal::ZERO) += qty;
    }
    Ok(merged
        .into_iter()
        .map(|(component_id, quantity)| OrderItem {
            component_id,
            quantity,
        })
        .collect())
}

pub fn items_total(items: &[OrderItem]) -> Decimal {
    items.iter().map(|i| i.quantity).sum()
}

/// `sum(items) <= target_quantity`.
pub fn ensure_within_target(items: &[OrderItem], target_quantity: Decimal) -> DomainResult<()> {
    let total = items_total(items);
    if total > target_quantity {
        return Err(DomainError::validation(format!(
            "items total {total} exceeds target quantity {target_quantity}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn duplicates_are_merged_by_summation() {
        let a = ComponentId::new();
        let b = ComponentId::new();
        let items = normalize_items(&[
            OrderItemInput::new(a, dec!(2)),
            OrderItemInput::new(b, dec!(1.5)),
            OrderItemInput::new(a, dec!(3.25)),
        ])
        .unwrap();

        assert_eq!(items.len(), 2);
        let qty_a = items.iter().find(|i| i.component_id == a).unwrap().quantity;
        assert_eq!(qty_a, dec!(5.25));
        assert_eq!(items_total(&items), dec!(6.75));
    }

    #[test]
    fn normalized_items_are_sorted_by_component() {
        let ids: Vec<_> = (0..5).map(|_| ComponentId::new()).collect();
        let inputs: Vec<_> = ids.iter().rev().map(|c| OrderItemInput::new(*c, dec!(1))).collect();
        let items = normalize_items(&inputs).unwrap();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(items.iter().map(|i| i.component_id).collect::<Vec<_>>(), sorted);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let err = normalize_items(&[OrderItemInput::new(ComponentId::new(), dec!(0))]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn parse_coerces_text() {
        let c = ComponentId::new();
        let item = OrderItemInput::parse(&c.to_string(), "4.5").unwrap();
        assert_eq!(item, OrderItemInput::new(c, dec!(4.5)));
        assert!(OrderItemInput::parse("coil-7", "4.5").is_err());
        assert!(OrderItemInput::parse(&c.to_string(), "-2").is_err());
    }

    #[test]
    fn within_target_boundary_is_inclusive() {
        let items = vec![OrderItem {
            component_id: ComponentId::new(),
            quantity: dec!(10),
        }];
        assert!(ensure_within_target(&items, dec!(10)).is_ok());
        assert!(ensure_within_target(&items, dec!(9.9999)).is_err());
    }
}
