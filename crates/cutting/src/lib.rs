//! Cutting order domain module.
//!
//! Business rules for the reservation-holding cutting order, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage). Availability
//! checks and the stock debit at completion are orchestrated by the
//! infrastructure crate inside one transaction.

pub mod item;
pub mod order;
pub mod status;

pub use item::{OrderItem, OrderItemInput, ensure_within_target, items_total, normalize_items};
pub use order::{
    CreateCuttingOrder, CuttingOrder, CuttingOrderCancelled, CuttingOrderCommand,
    CuttingOrderCompleted, CuttingOrderCreated, CuttingOrderEvent, CuttingOrderHeader,
    CuttingOrderStarted, CuttingOrderUpdated, OrderChanges, TransitionCuttingOrder,
    UpdateCuttingOrder,
};
pub use status::CuttingOrderStatus;
