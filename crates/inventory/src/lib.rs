//! Inventory stock domain.
//!
//! Pure, deterministic rules for stock rows, ledger events and composite
//! mirroring (no IO, no storage). The infrastructure crate owns transactions.

pub mod composite;
pub mod event;
pub mod projection;
pub mod stock;
pub mod target;

pub use composite::mirrored_quantity;
pub use event::{Direction, StockEvent, StockEventKind};
pub use projection::BalanceProjection;
pub use stock::ItemStock;
pub use target::StockTarget;
