//! Composite items: balance mirrored from their components.

use rust_decimal::Decimal;

use crate::stock::ItemStock;

/// Balance a composite item must show: the sum over its *active* components.
///
/// Returns `None` when there are no component rows at all, in which case the
/// item is not composite and keeps its own ledger-driven balance.
pub fn mirrored_quantity<'a, I>(components: I) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a ItemStock>,
{
    let mut seen = false;
    let mut total = Decimal::ZERO;
    for stock in components {
        seen = true;
        if stock.is_active() {
            total += stock.quantity();
        }
    }
    seen.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockcut_core::{Audit, ComponentId, ItemId, UserId};

    use crate::target::StockTarget;

    fn component(parent: ItemId, quantity: Decimal, active: bool) -> ItemStock {
        let mut audit = Audit::created(UserId::new(), Utc::now());
        audit.active = active;
        ItemStock::restore(
            StockTarget::Component(ComponentId::new()),
            Some(parent),
            quantity,
            audit,
        )
        .unwrap()
    }

    #[test]
    fn no_components_means_not_composite() {
        assert_eq!(mirrored_quantity(&[]), None);
    }

    #[test]
    fn inactive_components_do_not_count() {
        let parent = ItemId::new();
        let rows = vec![
            component(parent, dec!(10.5), true),
            component(parent, dec!(4), false),
            component(parent, dec!(2), true),
        ];
        assert_eq!(mirrored_quantity(&rows), Some(dec!(12.5)));
    }

    #[test]
    fn all_inactive_mirrors_zero() {
        let parent = ItemId::new();
        let rows = vec![component(parent, dec!(3), false)];
        assert_eq!(mirrored_quantity(&rows), Some(Decimal::ZERO));
    }
}
