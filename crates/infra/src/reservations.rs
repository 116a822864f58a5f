//! Reservation accounting: how much of a component is free to reserve.
//!
//! Holds no state. Every answer is recomputed from the component's stock row
//! and the items of active cutting orders, inside the caller's transaction.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockcut_core::{ComponentId, CuttingOrderId, DomainError};
use stockcut_inventory::StockTarget;

use crate::error::EngineResult;
use crate::store::{StockStore, StockTx};

/// Availability breakdown of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub component: ComponentId,
    pub physical: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
}

pub fn reserved_in<T: StockTx + ?Sized>(
    tx: &mut T,
    component: ComponentId,
    excluding: Option<CuttingOrderId>,
) -> EngineResult<Decimal> {
    Ok(tx.reserved_quantity(component, excluding)?)
}

/// `physical - reserved(excluding)`, computed inside `tx`.
///
/// A component without a stock row has no physical stock. A negative result means reservations already exceed stock, which is
/// reported as a consistency fault instead of being clamped.
pub fn availability_in<T: StockTx + ?Sized>(
    tx: &mut T,
    component: ComponentId,
    excluding: Option<CuttingOrderId>,
) -> EngineResult<Availability> {
    let physical = tx
        .find_stock(StockTarget::Component(component))?
        .map(|s| s.quantity())
        .unwrap_or(Decimal::ZERO);
    let reserved = reserved_in(tx, component, excluding)?;
    let available = physical - reserved;

    if available < Decimal::ZERO {
        tracing::error!(
            %component,
            %physical,
            %reserved,
            "reservations exceed physical stock"
        );
        return Err(DomainError::consistency(format!(
            "component {component}: reserved {reserved} exceeds physical balance {physical}"
        ))
        .into());
    }

    Ok(Availability {
        component,
        physical,
        reserved,
        available,
    })
}

/// Read-only service over [`availability_in`] with its own transaction.
#[derive(Debug)]
pub struct ReservationAccounting<S> {
    store: Arc<S>,
}

impl<S: StockStore> ReservationAccounting<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub fn reserved(
        &self,
        component: ComponentId,
        excluding: Option<CuttingOrderId>,
    ) -> EngineResult<Decimal> {
        let mut tx = self.store.begin()?;
        reserved_in(&mut tx, component, excluding)
    }

    #[instrument(skip(self), err)]
    pub fn available(
        &self,
        component: ComponentId,
        excluding: Option<CuttingOrderId>,
    ) -> EngineResult<Decimal> {
        Ok(self.availability(component, excluding)?.available)
    }

    pub fn availability(
        &self,
        component: ComponentId,
        excluding: Option<CuttingOrderId>,
    ) -> EngineResult<Availability> {
        let mut tx = self.store.begin()?;
        availability_in(&mut tx, component, excluding)
    }
}
