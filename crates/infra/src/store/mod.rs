//! Transactional storage boundary for stock rows, ledger events and cutting orders.
//!
//! Every service operation runs inside exactly one [`StockTx`]: reads that a
//! decision depends on, the row locks that make the decision safe, and the
//! writes that follow from it. Nothing is visible to other transactions until
//! [`StockTx::commit`]; dropping a transaction rolls it back.
//!
//! ## Constraints enforced by every backend
//!
//! | Constraint | Violation |
//! |------------|-----------|
//! | one stock row per target | `insert_stock` reports "not inserted" |
//! | stock quantity `>= 0` | [`StoreError::CheckViolation`] |
//! | stock event delta `<> 0` | [`StoreError::CheckViolation`] |
//! | unique order number | [`StoreError::UniqueViolation`] |
//! | unique (order, component), item quantity `> 0` | [`StoreError::UniqueViolation`] / [`StoreError::CheckViolation`] |

use rust_decimal::Decimal;
use thiserror::Error;

use stockcut_core::{ComponentId, CuttingOrderId, ItemId};
use stockcut_cutting::CuttingOrder;
use stockcut_inventory::{ItemStock, StockEvent, StockTarget};

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryStockStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStockStore;

/// Storage failure. Any of these aborts the running transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Factory for units of work.
pub trait StockStore: Send + Sync {
    type Tx<'a>: StockTx
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;
}

/// One atomic unit of work.
///
/// `lock_*` methods take an exclusive row lock held until commit/rollback.
/// Callers that lock several stock rows must lock component rows first, in
/// ascending [`StockTarget`] order, and their composite item rows last.
pub trait StockTx {
    fn find_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError>;

    fn lock_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError>;

    /// Insert a new stock row. Returns `false` (and changes nothing) when a row
    /// for the same target already exists.
    fn insert_stock(&mut self, stock: &ItemStock) -> Result<bool, StoreError>;

    fn save_stock(&mut self, stock: &ItemStock) -> Result<(), StoreError>;

    /// All component rows (active or not) whose parent is `item`, ordered by target.
    fn component_stocks_of(&mut self, item: ItemId) -> Result<Vec<ItemStock>, StoreError>;

    fn list_stocks(&mut self) -> Result<Vec<ItemStock>, StoreError>;

    fn insert_stock_event(&mut self, event: &StockEvent) -> Result<(), StoreError>;

    /// Ledger trail of one target, oldest first.
    fn stock_events(&mut self, target: StockTarget) -> Result<Vec<StockEvent>, StoreError>;

    fn find_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError>;

    fn find_order_by_number(
        &mut self,
        order_number: &str,
    ) -> Result<Option<CuttingOrderId>, StoreError>;

    fn lock_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError>;

    fn insert_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError>;

    /// Persist header changes and replace the full item set.
    fn save_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError>;

    /// Sum of item quantities for `component` over active (pending/in-process)
    /// orders, optionally leaving one order out.
    fn reserved_quantity(
        &mut self,
        component: ComponentId,
        excluding: Option<CuttingOrderId>,
    ) -> Result<Decimal, StoreError>;

    fn list_orders(&mut self) -> Result<Vec<CuttingOrder>, StoreError>;

    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;

    fn rollback(self) -> Result<(), StoreError>
    where
        Self: Sized;
}
