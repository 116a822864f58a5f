//! Infrastructure layer: storage, transactions and the services that
//! orchestrate the pure stock and cutting-order domains.

pub mod balance;
pub mod catalog;
pub mod composite;
pub mod config;
pub mod error;
pub mod ledger;
pub mod publish;
pub mod reconcile;
pub mod reservations;
pub mod store;
pub mod workflow;


pub use balance::BalanceView;
pub use catalog::{CatalogComponent, CatalogItem, InMemoryItemDirectory, ItemDirectory};
pub use composite::{CompositeStockSynchronizer, SyncOutcome};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use ledger::{AppendRequest, Posting, StockLedger};
pub use reconcile::{Divergence, ReconciliationReport, Reconciler};
pub use reservations::{Availability, ReservationAccounting};
pub use store::{InMemoryStockStore, StockStore, StockTx, StoreError};
pub use workflow::{CreateOrderRequest, CuttingOrderWorkflow, OrderView, UpdateOrderRequest};
