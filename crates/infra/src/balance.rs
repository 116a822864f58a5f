//! Read-only queries over the cached stock rows.

use std::sync::Arc;

use rust_decimal::Decimal;

use stockcut_core::DomainError;
use stockcut_inventory::{ItemStock, StockTarget};

use crate::error::EngineResult;
use crate::store::{StockStore, StockTx};

#[derive(Debug)]
pub struct BalanceView<S> {
    store: Arc<S>,
}

impl<S: StockStore> BalanceView<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Current physical balance of `target`.
    pub fn balance(&self, target: StockTarget) -> EngineResult<Decimal> {
        Ok(self.stock(target)?.quantity())
    }

    /// The stock row of `target`, including audit fields.
    pub fn stock(&self, target: StockTarget) -> EngineResult<ItemStock> {
        let mut tx = self.store.begin()?;
        tx.find_stock(target)?
            .ok_or_else(|| DomainError::not_found("item stock", target).into())
    }

    /// Every stock row, active or not, ordered by target.
    pub fn list(&self) -> EngineResult<Vec<ItemStock>> {
        let mut tx = self.store.begin()?;
        Ok(tx.list_stocks()?)
    }
}
