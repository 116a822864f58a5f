use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcut_core::{Audit, ComponentId, DomainError, DomainResult, Entity, ItemId, UserId};

use crate::event::StockEvent;
use crate::target::StockTarget;

/// One stock-holding row per item or component.
///
/// `quantity` is a cached projection of the event trail (or, for a composite item,
/// of its components' balances). It is never negative, and only the ledger's
/// append and the composite synchronizer write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStock {
    target: StockTarget,
    parent_item: Option<ItemId>,
    quantity: Decimal,
    audit: Audit,
}

impl ItemStock {
    /// New zero-balance row for a simple or composite item.
    pub fn for_item(item: ItemId, actor: UserId, at: DateTime<Utc>) -> Self {
        Self {
            target: StockTarget::Item(item),
            parent_item: None,
            quantity: Decimal::ZERO,
            audit: Audit::created(actor, at),
        }
    }

    /// New zero-balance row for a component owned by `parent`.
    pub fn for_component(
        component: ComponentId,
        parent: ItemId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            target: StockTarget::Component(component),
            parent_item: Some(parent),
            quantity: Decimal::ZERO,
            audit: Audit::created(actor, at),
        }
    }

    /// Rebuild a row loaded from storage, re-checking its invariants.
    pub fn restore(
        target: StockTarget,
        parent_item: Option<ItemId>,
        quantity: Decimal,
        audit: Audit,
    ) -> DomainResult<Self> {
        match (&target, parent_item) {
            (StockTarget::Component(_), None) => {
                return Err(DomainError::invariant(format!("{target} has no parent item")));
            }
            (StockTarget::Item(_), Some(_)) => {
                return Err(DomainError::invariant(format!(
                    "{target} cannot have a parent item"
                )));
            }
            _ => {}
        }
        if quantity < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "{target} has negative stored quantity {quantity}"
            )));
        }
        Ok(Self {
            target,
            parent_item,
            quantity,
            audit,
        })
    }

    pub fn target(&self) -> StockTarget {
        self.target
    }

    /// Composite item this component belongs to (`None` for item rows).
    pub fn parent_item(&self) -> Option<ItemId> {
        self.parent_item
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn audit(&self) -> &Audit {
        &self.audit
    }

    pub fn is_active(&self) -> bool {
        self.audit.active
    }

    /// Balance that would result from applying `delta`; rejects negative results.
    pub fn balance_after(&self, delta: Decimal) -> DomainResult<Decimal> {
        let next = self.quantity + delta;
        if next < Decimal::ZERO {
            return Err(DomainError::insufficient_stock(
                self.target,
                -delta,
                self.quantity,
            ));
        }
        Ok(next)
    }

    /// Apply a ledger event to this row's cached balance.
    pub fn apply(&mut self, event: &StockEvent) -> DomainResult<()> {
        if event.target != self.target {
            return Err(DomainError::invariant(format!(
                "event for {} applied to {}",
                event.target, self.target
            )));
        }
        self.quantity = self.balance_after(event.delta)?;
        self.audit.touch(event.actor, event.created_at);
        Ok(())
    }

    /// Overwrite the cached balance with a derived value (composite mirror).
    ///
    /// Returns whether anything changed.
    pub fn project(&mut self, quantity: Decimal, actor: UserId, at: DateTime<Utc>) -> DomainResult<bool> {
        if quantity < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "projected quantity for {} is negative ({quantity})",
                self.target
            )));
        }
        if quantity == self.quantity {
            return Ok(false);
        }
        self.quantity = quantity;
        self.audit.touch(actor, at);
        Ok(true)
    }

    pub fn deactivate(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.audit.deactivate(actor, at);
    }

    pub fn reactivate(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.audit.reactivate(actor, at);
    }
}

impl Entity for ItemStock {
    type Id = StockTarget;

    fn id(&self) -> &Self::Id {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StockEventKind;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn component_stock() -> ItemStock {
        ItemStock::for_component(ComponentId::new(), ItemId::new(), UserId::new(), Utc::now())
    }

    fn event_for(stock: &ItemStock, delta: Decimal) -> StockEvent {
        let kind = if delta.is_sign_negative() {
            StockEventKind::OutflowAdjustment
        } else {
            StockEventKind::Inflow
        };
        StockEvent::record(stock.target(), delta, kind, "test", UserId::new(), Utc::now()).unwrap()
    }

    #[test]
    fn apply_moves_balance_and_stamps_modifier() {
        let mut stock = component_stock();
        let inflow = event_for(&stock, dec!(10));
        stock.apply(&inflow).unwrap();
        assert_eq!(stock.quantity(), dec!(10));
        assert_eq!(stock.audit().modified_by, Some(inflow.actor));
    }

    #[test]
    fn overdraw_is_rejected_with_context_and_leaves_balance() {
        let mut stock = component_stock();
        stock.apply(&event_for(&stock, dec!(5))).unwrap();

        let err = stock.apply(&event_for(&stock, dec!(-7.5))).unwrap_err();
        match err {
            DomainError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, dec!(7.5));
                assert_eq!(available, dec!(5));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(stock.quantity(), dec!(5));
    }

    #[test]
    fn event_for_other_target_is_an_invariant_violation() {
        let mut a = component_stock();
        let b = component_stock();
        let err = a.apply(&event_for(&b, dec!(1))).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn restore_checks_parent_shape_and_sign() {
        let audit = Audit::created(UserId::new(), Utc::now());
        let component = StockTarget::Component(ComponentId::new());
        let item = StockTarget::Item(ItemId::new());

        assert!(ItemStock::restore(component, None, dec!(1), audit.clone()).is_err());
        assert!(ItemStock::restore(item, Some(ItemId::new()), dec!(1), audit.clone()).is_err());
        assert!(ItemStock::restore(item, None, dec!(-1), audit.clone()).is_err());
        assert!(ItemStock::restore(item, None, dec!(0), audit).is_ok());
    }

    #[test]
    fn project_reports_change_only_when_different() {
        let mut stock = ItemStock::for_item(ItemId::new(), UserId::new(), Utc::now());
        let actor = UserId::new();
        assert!(!stock.project(dec!(0), actor, Utc::now()).unwrap());
        assert!(stock.project(dec!(3), actor, Utc::now()).unwrap());
        assert!(stock.project(dec!(-1), actor, Utc::now()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of appends leaves the balance non-negative, and
        /// rejected appends never mutate it.
        #[test]
        fn balance_never_goes_negative(deltas in prop::collection::vec(-1_000i64..1_000i64, 1..64)) {
            let mut stock = component_stock();
            let mut expected = Decimal::ZERO;

            for raw in deltas {
                if raw == 0 {
                    continue;
                }
                let delta = Decimal::new(raw, 1);
                let before = stock.quantity();
                match stock.apply(&event_for(&stock, delta)) {
                    Ok(()) => expected += delta,
                    Err(_) => prop_assert_eq!(stock.quantity(), before),
                }
                prop_assert!(stock.quantity() >= Decimal::ZERO);
                prop_assert_eq!(stock.quantity(), expected);
            }
        }
    }
}
