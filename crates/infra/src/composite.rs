//! Composite stock synchronizer: a composite item's cached balance mirrors the
//! sum of its active components.
//!
//! This is a projection refresh, not a ledger event. It runs inside the
//! transaction that mutated the component, right after the mutation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::instrument;

use stockcut_core::{DomainError, ItemId, UserId};
use stockcut_inventory::{StockTarget, mirrored_quantity};

use crate::error::EngineResult;
use crate::store::{StockStore, StockTx};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The item has no component rows; its balance is ledger-driven.
    NotComposite,
    Unchanged(Decimal),
    Updated { from: Decimal, to: Decimal },
}

/// Re-mirror `item` inside an open transaction.
///
/// Locks the composite row, recomputes the sum over active components and
/// writes it only if different. A composite with components but no stock row
/// of its own is a consistency fault (initialization creates it).
pub fn sync_in<T: StockTx + ?Sized>(
    tx: &mut T,
    item: ItemId,
    actor: UserId,
    at: DateTime<Utc>,
) -> EngineResult<SyncOutcome> {
    let target = StockTarget::Item(item);
    // Composite row first: the component sum is read under its lock.
    let locked = tx.lock_stock(target)?;
    let components = tx.component_stocks_of(item)?;
    let Some(mirrored) = mirrored_quantity(&components) else {
        return Ok(SyncOutcome::NotComposite);
    };
    let mut stock = locked.ok_or_else(|| {
        DomainError::consistency(format!("composite {target} has components but no stock row"))
    })?;

    let from = stock.quantity();
    if !stock.project(mirrored, actor, at)? {
        return Ok(SyncOutcome::Unchanged(from));
    }
    tx.save_stock(&stock)?;
    tracing::debug!(%target, %from, to = %mirrored, "composite balance re-synced");
    Ok(SyncOutcome::Updated { from, to: mirrored })
}

/// Standalone entry point for re-syncing a composite in its own transaction
/// (operator repair, reconciliation).
#[derive(Debug)]
pub struct CompositeStockSynchronizer<S> {
    store: Arc<S>,
}

impl<S: StockStore> CompositeStockSynchronizer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(item_id = %item), err)]
    pub fn sync(&self, item: ItemId, actor: UserId) -> EngineResult<SyncOutcome> {
        let mut tx = self.store.begin()?;
        let outcome = sync_in(&mut tx, item, actor, Utc::now())?;
        tx.commit()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockcut_core::{ComponentId, CuttingOrderId};
    use stockcut_cutting::CuttingOrder;
    use stockcut_inventory::{ItemStock, StockEvent, StockEventKind};

    use crate::store::{InMemoryStockStore, StoreError};

    fn seed_component<T: StockTx>(tx: &mut T, parent: ItemId, qty: Decimal) -> ComponentId {
        let actor = UserId::new();
        let component = ComponentId::new();
        let mut stock = ItemStock::for_component(component, parent, actor, Utc::now());
        tx.insert_stock(&stock).unwrap();
        let event = StockEvent::record(
            component.into(),
            qty,
            StockEventKind::InitialInflow,
            "",
            actor,
            Utc::now(),
        )
        .unwrap();
        stock.apply(&event).unwrap();
        tx.insert_stock_event(&event).unwrap();
        tx.save_stock(&stock).unwrap();
        component
    }

    #[test]
    fn mirrors_sum_of_active_components() {
        let store = Arc::new(InMemoryStockStore::new());
        let sheet = ItemId::new();
        let actor = UserId::new();

        let mut tx = store.begin().unwrap();
        tx.insert_stock(&ItemStock::for_item(sheet, actor, Utc::now())).unwrap();
        seed_component(&mut tx, sheet, dec!(40));
        let b = seed_component(&mut tx, sheet, dec!(10));
        tx.commit().unwrap();

        let sync = CompositeStockSynchronizer::new(store.clone());
        assert_eq!(
            sync.sync(sheet, actor).unwrap(),
            SyncOutcome::Updated { from: dec!(0), to: dec!(50) }
        );
        assert_eq!(sync.sync(sheet, actor).unwrap(), SyncOutcome::Unchanged(dec!(50)));

        let mut tx = store.begin().unwrap();
        let mut coil = tx.lock_stock(b.into()).unwrap().unwrap();
        coil.deactivate(actor, Utc::now());
        tx.save_stock(&coil).unwrap();
        assert_eq!(
            sync_in(&mut tx, sheet, actor, Utc::now()).unwrap(),
            SyncOutcome::Updated { from: dec!(50), to: dec!(40) }
        );
    }

    #[test]
    fn item_without_components_is_left_alone() {
        let store = Arc::new(InMemoryStockStore::new());
        let sync = CompositeStockSynchronizer::new(store);
        assert_eq!(
            sync.sync(ItemId::new(), UserId::new()).unwrap(),
            SyncOutcome::NotComposite
        );
    }

    #[test]
    fn missing_composite_row_is_a_consistency_fault() {
        let store = Arc::new(InMemoryStockStore::new());
        let sheet = ItemId::new();
        let mut tx = store.begin().unwrap();
        seed_component(&mut tx, sheet, dec!(5));

        let err = sync_in(&mut tx, sheet, UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::ConsistencyFault(_))
        ));
    }

    /// Delegates to the in-memory transaction and records the row accesses
    /// `sync_in` makes.
    struct RecordingTx<'a> {
        inner: crate::store::in_memory::InMemoryTx<'a>,
        calls: Vec<&'static str>,
    }

    impl StockTx for RecordingTx<'_> {
        fn find_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError> {
            self.calls.push("find_stock");
            self.inner.find_stock(target)
        }

        fn lock_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError> {
            self.calls.push("lock_stock");
            self.inner.lock_stock(target)
        }

        fn insert_stock(&mut self, stock: &ItemStock) -> Result<bool, StoreError> {
            self.inner.insert_stock(stock)
        }

        fn save_stock(&mut self, stock: &ItemStock) -> Result<(), StoreError> {
            self.calls.push("save_stock");
            self.inner.save_stock(stock)
        }

        fn component_stocks_of(&mut self, item: ItemId) -> Result<Vec<ItemStock>, StoreError> {
            self.calls.push("component_stocks_of");
            self.inner.component_stocks_of(item)
        }

        fn list_stocks(&mut self) -> Result<Vec<ItemStock>, StoreError> {
            self.inner.list_stocks()
        }

        fn insert_stock_event(&mut self, event: &StockEvent) -> Result<(), StoreError> {
            self.inner.insert_stock_event(event)
        }

        fn stock_events(&mut self, target: StockTarget) -> Result<Vec<StockEvent>, StoreError> {
            self.inner.stock_events(target)
        }

        fn find_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError> {
            self.inner.find_order(id)
        }

        fn find_order_by_number(
            &mut self,
            order_number: &str,
        ) -> Result<Option<CuttingOrderId>, StoreError> {
            self.inner.find_order_by_number(order_number)
        }

        fn lock_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError> {
            self.inner.lock_order(id)
        }

        fn insert_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError> {
            self.inner.insert_order(order)
        }

        fn save_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError> {
            self.inner.save_order(order)
        }

        fn reserved_quantity(
            &mut self,
            component: ComponentId,
            excluding: Option<CuttingOrderId>,
        ) -> Result<Decimal, StoreError> {
            self.inner.reserved_quantity(component, excluding)
        }

        fn list_orders(&mut self) -> Result<Vec<CuttingOrder>, StoreError> {
            self.inner.list_orders()
        }

        fn commit(self) -> Result<(), StoreError> {
            self.inner.commit()
        }

        fn rollback(self) -> Result<(), StoreError> {
            self.inner.rollback()
        }
    }

    #[test]
    fn composite_row_is_locked_before_components_are_read() {
        let store = Arc::new(InMemoryStockStore::new());
        let sheet = ItemId::new();
        let actor = UserId::new();

        let mut tx = store.begin().unwrap();
        tx.insert_stock(&ItemStock::for_item(sheet, actor, Utc::now())).unwrap();
        seed_component(&mut tx, sheet, dec!(7));
        tx.commit().unwrap();

        let mut tx = RecordingTx {
            inner: store.begin().unwrap(),
            calls: Vec::new(),
        };
        assert_eq!(
            sync_in(&mut tx, sheet, actor, Utc::now()).unwrap(),
            SyncOutcome::Updated { from: dec!(0), to: dec!(7) }
        );
        assert_eq!(tx.calls, ["lock_stock", "component_stocks_of", "save_stock"]);
        tx.commit().unwrap();
    }
}
