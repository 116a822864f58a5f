//! `stockcut-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod audit;
pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;

pub use aggregate::{Aggregate, AggregateRoot};
pub use audit::Audit;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ComponentId, CuttingOrderId, ItemId, StockEventId, UserId};
pub use quantity::MAX_QUANTITY_SCALE;
