//! Cutting order workflow: order lifecycle, reservation checks and the stock
//! debit at completion.
//!
//! Each operation is one short transaction:
//!
//! ```text
//! lock order row (update/transition)
//!   ↓
//! CuttingOrder::handle (pure rules: quantities, transition table)
//!   ↓
//! lock component stock rows in ascending order, check availability
//!   or, at completion, debit each component through the ledger
//!   ↓
//! re-sync the composite, persist the order
//!   ↓
//! commit, then publish order.* / stock.* events
//! ```
//!
//! Reservations are purely logical: an active order's items are its
//! reservation. Locking the component rows while validating serializes two
//! orders competing for the same stock.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;
use uuid::Uuid;

use stockcut_core::{Aggregate, AggregateRoot, ComponentId, CuttingOrderId, DomainError, ItemId, UserId};
use stockcut_cutting::{
    CreateCuttingOrder, CuttingOrder, CuttingOrderCommand, CuttingOrderEvent, CuttingOrderHeader,
    CuttingOrderStatus, OrderChanges, OrderItem, OrderItemInput, TransitionCuttingOrder,
    UpdateCuttingOrder,
};
use stockcut_events::{EventBus, EventEnvelope};
use stockcut_inventory::{StockEventKind, StockTarget};

use crate::catalog::ItemDirectory;
use crate::composite::sync_in;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{AppendRequest, append_in};
use crate::publish::{ORDER_AGGREGATE, Outbox, Publisher, STOCK_AGGREGATE};
use crate::reservations::{Availability, availability_in};
use crate::store::{StockStore, StockTx, StoreError};

/// An order as returned to callers: header, items and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order: CuttingOrderHeader,
    pub items: Vec<OrderItem>,
    pub version: u64,
}

impl OrderView {
    fn of(order: &CuttingOrder) -> EngineResult<Self> {
        let header = order
            .header()
            .ok_or_else(|| DomainError::not_found("cutting order", order.id_typed()))?;
        Ok(Self {
            order: header.clone(),
            items: order.items().to_vec(),
            version: order.version(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub order_number: String,
    pub sales_order_id: Option<Uuid>,
    pub sales_order_line_id: Option<Uuid>,
    pub target_item: ItemId,
    pub target_quantity: Decimal,
    pub items: Vec<OrderItemInput>,
    pub allow_late_items: bool,
    pub operator: Option<UserId>,
    pub notes: String,
    pub actor: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub changes: OrderChanges,
    /// `Some` replaces the full item set.
    pub items: Option<Vec<OrderItemInput>>,
    pub actor: UserId,
}

pub struct CuttingOrderWorkflow<S, B> {
    store: Arc<S>,
    directory: Arc<dyn ItemDirectory>,
    publisher: Publisher<B>,
    config: EngineConfig,
}

impl<S, B> CuttingOrderWorkflow<S, B>
where
    S: StockStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn ItemDirectory>,
        bus: B,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            directory,
            publisher: Publisher::new(bus),
            config,
        }
    }

    /// Create a `pending` order whose items reserve component stock.
    #[instrument(
        skip(self, request),
        fields(order_number = %request.order_number, target_item = %request.target_item),
        err
    )]
    pub fn create_order(&self, request: CreateOrderRequest) -> EngineResult<OrderView> {
        let order_number = request.order_number.trim().to_string();
        let mut tx = self.store.begin()?;

        if tx.find_order_by_number(&order_number)?.is_some() {
            tracing::warn!("duplicate order number");
            return Err(DomainError::DuplicateOrderNumber(order_number).into());
        }
        self.directory
            .item(request.target_item)
            .ok_or_else(|| DomainError::not_found("item", request.target_item))?;

        let order_id = CuttingOrderId::new();
        let mut order = CuttingOrder::empty(order_id);
        let command = CuttingOrderCommand::Create(CreateCuttingOrder {
            order_id,
            order_number: order_number.clone(),
            sales_order_id: request.sales_order_id,
            sales_order_line_id: request.sales_order_line_id,
            target_item: request.target_item,
            target_quantity: request.target_quantity,
            items: request.items,
            allow_late_items: request.allow_late_items,
            operator: request.operator,
            notes: request.notes,
            actor: request.actor,
            occurred_at: Utc::now(),
        });
        let events = self.decide(&order, &command)?;
        for event in &events {
            order.apply(event);
        }

        self.check_items(&mut tx, &order, None)?;

        tx.insert_order(&order).map_err(|e| match e {
            StoreError::UniqueViolation(_) => {
                EngineError::from(DomainError::DuplicateOrderNumber(order_number.clone()))
            }
            other => EngineError::from(other),
        })?;

        let mut outbox = Outbox::new();
        record_order_events(&mut outbox, &events)?;
        tx.commit()?;
        self.publisher.publish(outbox);

        tracing::info!(order_id = %order_id, items = order.items().len(), "cutting order created");
        OrderView::of(&order)
    }

    /// Change header fields and/or replace the item set of an active order.
    #[instrument(skip(self, request), err)]
    pub fn update_order(
        &self,
        order_id: CuttingOrderId,
        request: UpdateOrderRequest,
    ) -> EngineResult<OrderView> {
        let mut tx = self.store.begin()?;
        let mut order = lock_order(&mut tx, order_id)?;

        let command = CuttingOrderCommand::Update(UpdateCuttingOrder {
            order_id,
            changes: request.changes,
            items: request.items,
            actor: request.actor,
            occurred_at: Utc::now(),
        });
        let events = self.decide(&order, &command)?;
        if events.is_empty() {
            return OrderView::of(&order);
        }
        for event in &events {
            order.apply(event);
        }

        // The order's own reservation does not count against itself.
        self.check_items(&mut tx, &order, Some(order_id))?;
        tx.save_order(&order)?;

        let mut outbox = Outbox::new();
        record_order_events(&mut outbox, &events)?;
        tx.commit()?;
        self.publisher.publish(outbox);

        tracing::info!(items = order.items().len(), "cutting order updated");
        OrderView::of(&order)
    }

    /// Move an order to `target`. Completing debits every item from its
    /// component; cancelling only releases the reservation.
    ///
    /// Requesting the current status again is a no-op.
    #[instrument(skip(self), err)]
    pub fn transition_order(
        &self,
        order_id: CuttingOrderId,
        target: CuttingOrderStatus,
        actor: UserId,
    ) -> EngineResult<OrderView> {
        let mut tx = self.store.begin()?;
        let mut order = lock_order(&mut tx, order_id)?;
        let now = Utc::now();

        let command = CuttingOrderCommand::Transition(TransitionCuttingOrder {
            order_id,
            target,
            actor,
            occurred_at: now,
        });
        let events = self.decide(&order, &command)?;
        if events.is_empty() {
            return OrderView::of(&order);
        }

        let mut outbox = Outbox::new();
        for event in &events {
            if let CuttingOrderEvent::Completed(completed) = event {
                self.debit_components(&mut tx, &order, &completed.items, actor, now, &mut outbox)?;
            }
            order.apply(event);
        }
        tx.save_order(&order)?;

        // Order events go out before the stock events they caused.
        let mut published = Outbox::new();
        record_order_events(&mut published, &events)?;
        published.extend(outbox);

        tx.commit()?;
        self.publisher.publish(published);

        tracing::info!(status = %target, "cutting order transitioned");
        OrderView::of(&order)
    }

    pub fn cancel_order(&self, order_id: CuttingOrderId, actor: UserId) -> EngineResult<OrderView> {
        self.transition_order(order_id, CuttingOrderStatus::Cancelled, actor)
    }

    pub fn get_order(&self, order_id: CuttingOrderId) -> EngineResult<OrderView> {
        let mut tx = self.store.begin()?;
        let order = tx
            .find_order(order_id)?
            .ok_or_else(|| DomainError::not_found("cutting order", order_id))?;
        OrderView::of(&order)
    }

    pub fn get_availability(&self, component: ComponentId) -> EngineResult<Availability> {
        let mut tx = self.store.begin()?;
        availability_in(&mut tx, component, None)
    }

    fn decide(
        &self,
        order: &CuttingOrder,
        command: &CuttingOrderCommand,
    ) -> EngineResult<Vec<CuttingOrderEvent>> {
        order.handle(command).map_err(|e| {
            tracing::warn!(error = %e, "cutting order command rejected");
            e.into()
        })
    }

    /// Item checks that need the catalog and the store: size limit, component
    /// ownership, and per-component availability under row locks.
    fn check_items<T: StockTx + ?Sized>(
        &self,
        tx: &mut T,
        order: &CuttingOrder,
        excluding: Option<CuttingOrderId>,
    ) -> EngineResult<()> {
        let header = order
            .header()
            .ok_or_else(|| DomainError::not_found("cutting order", order.id_typed()))?;
        let items = order.items();

        if items.len() > self.config.max_items_per_order {
            return Err(DomainError::validation(format!(
                "an order may hold at most {} components (got {})",
                self.config.max_items_per_order,
                items.len()
            ))
            .into());
        }

        for item in items {
            let component = self
                .directory
                .component(item.component_id)
                .ok_or_else(|| DomainError::not_found("component", item.component_id))?;
            if component.item_id != header.target_item {
                return Err(DomainError::validation(format!(
                    "component {} does not belong to item {}",
                    item.component_id, header.target_item
                ))
                .into());
            }
        }

        // Items are sorted by component, which is also the lock order.
        for item in items {
            tx.lock_stock(StockTarget::Component(item.component_id))?;
            let availability = availability_in(tx, item.component_id, excluding)?;
            if item.quantity > availability.available {
                tracing::warn!(
                    component = %item.component_id,
                    requested = %item.quantity,
                    available = %availability.available,
                    "reservation exceeds availability"
                );
                return Err(DomainError::insufficient_stock(
                    StockTarget::Component(item.component_id),
                    item.quantity,
                    availability.available,
                )
                .into());
            }
        }
        Ok(())
    }

    /// Debit every item (ascending component order) and re-sync the affected
    /// composites. Any failure aborts the caller's transaction.
    fn debit_components<T: StockTx + ?Sized>(
        &self,
        tx: &mut T,
        order: &CuttingOrder,
        items: &[OrderItem],
        actor: UserId,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> EngineResult<()> {
        let note = order
            .header()
            .map(|h| format!("cutting order {}", h.order_number))
            .unwrap_or_default();

        let mut sorted = items.to_vec();
        sorted.sort_by_key(|i| i.component_id);

        let mut parents = BTreeSet::new();
        for item in &sorted {
            let request = AppendRequest::new(
                item.component_id,
                -item.quantity,
                StockEventKind::OutflowCut,
                note.clone(),
                actor,
            )
            .consuming(order.id_typed());
            let posting = append_in(tx, &request, now)?;
            outbox.record(*item.component_id.as_uuid(), STOCK_AGGREGATE, &posting.event)?;
            if let Some(parent) = posting.parent_item {
                parents.insert(parent);
            }
        }
        for parent in parents {
            sync_in(tx, parent, actor, now)?;
        }
        Ok(())
    }
}

fn lock_order<T: StockTx + ?Sized>(tx: &mut T, order_id: CuttingOrderId) -> EngineResult<CuttingOrder> {
    let order = tx
        .lock_order(order_id)?
        .ok_or_else(|| DomainError::not_found("cutting order", order_id))?;
    Ok(order)
}

fn record_order_events(outbox: &mut Outbox, events: &[CuttingOrderEvent]) -> EngineResult<()> {
    for event in events {
        outbox.record(*event.order_id().as_uuid(), ORDER_AGGREGATE, event)?;
    }
    Ok(())
}
