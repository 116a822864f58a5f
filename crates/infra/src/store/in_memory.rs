use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use rust_decimal::Decimal;

use stockcut_core::{ComponentId, CuttingOrderId, ItemId};
use stockcut_cutting::CuttingOrder;
use stockcut_inventory::{ItemStock, StockEvent, StockTarget};

use super::{StockStore, StockTx, StoreError};

#[derive(Debug, Clone, Default)]
struct State {
    stocks: BTreeMap<StockTarget, ItemStock>,
    events: Vec<StockEvent>,
    orders: BTreeMap<CuttingOrderId, CuttingOrder>,
    order_numbers: HashMap<String, CuttingOrderId>,
}

/// In-memory store with serializable transactions.
///
/// One transaction runs at a time: `begin` takes the store lock and works on a
/// staged copy of the state, which replaces the committed state at `commit`.
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: Mutex<State>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StockStore for InMemoryStockStore {
    type Tx<'a> = InMemoryTx<'a>;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError> {
        let committed = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        let staged = committed.clone();
        Ok(InMemoryTx { committed, staged })
    }
}

/// Transaction over [`InMemoryStockStore`]; holds the store lock until dropped.
#[derive(Debug)]
pub struct InMemoryTx<'a> {
    committed: MutexGuard<'a, State>,
    staged: State,
}

fn check_order_rows(order: &CuttingOrder) -> Result<(), StoreError> {
    let mut seen = BTreeSet::new();
    for item in order.items() {
        if item.quantity <= Decimal::ZERO {
            return Err(StoreError::CheckViolation(format!(
                "cutting order item quantity must be > 0 (component {})",
                item.component_id
            )));
        }
        if !seen.insert(item.component_id) {
            return Err(StoreError::UniqueViolation(format!(
                "duplicate component {} in order {}",
                item.component_id,
                order.id_typed()
            )));
        }
    }
    Ok(())
}

impl StockTx for InMemoryTx<'_> {
    fn find_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError> {
        Ok(self.staged.stocks.get(&target).cloned())
    }

    fn lock_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError> {
        // The whole store is already exclusively held by this transaction.
        self.find_stock(target)
    }

    fn insert_stock(&mut self, stock: &ItemStock) -> Result<bool, StoreError> {
        if self.staged.stocks.contains_key(&stock.target()) {
            return Ok(false);
        }
        if stock.quantity() < Decimal::ZERO {
            return Err(StoreError::CheckViolation(format!(
                "quantity of {} must be >= 0",
                stock.target()
            )));
        }
        self.staged.stocks.insert(stock.target(), stock.clone());
        Ok(true)
    }

    fn save_stock(&mut self, stock: &ItemStock) -> Result<(), StoreError> {
        if stock.quantity() < Decimal::ZERO {
            return Err(StoreError::CheckViolation(format!(
                "quantity of {} must be >= 0",
                stock.target()
            )));
        }
        match self.staged.stocks.get_mut(&stock.target()) {
            Some(row) => {
                *row = stock.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "no stock row for {}",
                stock.target()
            ))),
        }
    }

    fn component_stocks_of(&mut self, item: ItemId) -> Result<Vec<ItemStock>, StoreError> {
        Ok(self
            .staged
            .stocks
            .values()
            .filter(|s| s.parent_item() == Some(item))
            .cloned()
            .collect())
    }

    fn list_stocks(&mut self) -> Result<Vec<ItemStock>, StoreError> {
        Ok(self.staged.stocks.values().cloned().collect())
    }

    fn insert_stock_event(&mut self, event: &StockEvent) -> Result<(), StoreError> {
        if event.delta.is_zero() {
            return Err(StoreError::CheckViolation(
                "stock event delta must be <> 0".to_string(),
            ));
        }
        if !self.staged.stocks.contains_key(&event.target) {
            return Err(StoreError::Backend(format!(
                "stock event references missing row {}",
                event.target
            )));
        }
        if self.staged.events.iter().any(|e| e.id == event.id) {
            return Err(StoreError::UniqueViolation(format!(
                "stock event {} already recorded",
                event.id
            )));
        }
        self.staged.events.push(event.clone());
        Ok(())
    }

    fn stock_events(&mut self, target: StockTarget) -> Result<Vec<StockEvent>, StoreError> {
        Ok(self
            .staged
            .events
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect())
    }

    fn find_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    fn find_order_by_number(
        &mut self,
        order_number: &str,
    ) -> Result<Option<CuttingOrderId>, StoreError> {
        Ok(self.staged.order_numbers.get(order_number).copied())
    }

    fn lock_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError> {
        self.find_order(id)
    }

    fn insert_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError> {
        let header = order
            .header()
            .ok_or_else(|| StoreError::Backend("cannot insert an uncreated order".to_string()))?;
        if self.staged.orders.contains_key(&order.id_typed()) {
            return Err(StoreError::UniqueViolation(format!(
                "cutting order {} already exists",
                order.id_typed()
            )));
        }
        if self.staged.order_numbers.contains_key(&header.order_number) {
            return Err(StoreError::UniqueViolation(format!(
                "order number {} already exists",
                header.order_number
            )));
        }
        check_order_rows(order)?;

        self.staged
            .order_numbers
            .insert(header.order_number.clone(), order.id_typed());
        self.staged.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    fn save_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError> {
        check_order_rows(order)?;
        match self.staged.orders.get_mut(&order.id_typed()) {
            Some(row) => {
                *row = order.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "no cutting order {}",
                order.id_typed()
            ))),
        }
    }

    fn reserved_quantity(
        &mut self,
        component: ComponentId,
        excluding: Option<CuttingOrderId>,
    ) -> Result<Decimal, StoreError> {
        Ok(self
            .staged
            .orders
            .values()
            .filter(|o| Some(o.id_typed()) != excluding)
            .filter(|o| o.status().is_some_and(|s| s.is_active()))
            .flat_map(|o| o.items())
            .filter(|i| i.component_id == component)
            .map(|i| i.quantity)
            .sum())
    }

    fn list_orders(&mut self) -> Result<Vec<CuttingOrder>, StoreError> {
        Ok(self.staged.orders.values().cloned().collect())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        *self.committed = std::mem::take(&mut self.staged);
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockcut_core::UserId;
    use stockcut_inventory::StockEventKind;

    fn item_row(item: ItemId) -> ItemStock {
        ItemStock::for_item(item, UserId::new(), Utc::now())
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let store = InMemoryStockStore::new();
        let item = ItemId::new();

        {
            let mut tx = store.begin().unwrap();
            assert!(tx.insert_stock(&item_row(item)).unwrap());
            // dropped without commit
        }
        let mut tx = store.begin().unwrap();
        assert!(tx.find_stock(item.into()).unwrap().is_none());

        assert!(tx.insert_stock(&item_row(item)).unwrap());
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        assert!(tx.find_stock(item.into()).unwrap().is_some());
    }

    #[test]
    fn second_insert_for_same_target_is_ignored() {
        let store = InMemoryStockStore::new();
        let item = ItemId::new();
        let mut tx = store.begin().unwrap();
        assert!(tx.insert_stock(&item_row(item)).unwrap());
        assert!(!tx.insert_stock(&item_row(item)).unwrap());
        assert_eq!(tx.list_stocks().unwrap().len(), 1);
    }

    #[test]
    fn events_require_an_existing_row() {
        let store = InMemoryStockStore::new();
        let item = ItemId::new();
        let event = StockEvent::record(
            item.into(),
            dec!(5),
            StockEventKind::Inflow,
            "",
            UserId::new(),
            Utc::now(),
        )
        .unwrap();

        let mut tx = store.begin().unwrap();
        assert!(matches!(
            tx.insert_stock_event(&event),
            Err(StoreError::Backend(_))
        ));

        tx.insert_stock(&item_row(item)).unwrap();
        tx.insert_stock_event(&event).unwrap();
        assert!(matches!(
            tx.insert_stock_event(&event),
            Err(StoreError::UniqueViolation(_))
        ));
        assert_eq!(tx.stock_events(item.into()).unwrap(), vec![event]);
    }
}
