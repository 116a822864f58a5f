use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockcut_core::{
    Aggregate, AggregateRoot, Audit, CuttingOrderId, DomainError, DomainResult, ItemId, UserId,
    quantity,
};
use stockcut_events::Event;

use crate::item::{OrderItem, OrderItemInput, ensure_within_target, items_total, normalize_items};
use crate::status::CuttingOrderStatus;

/// Header row of a cutting order (everything except its items).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingOrderHeader {
    pub id: CuttingOrderId,
    pub order_number: String,
    /// Originating sales order / line. Opaque foreign keys, not validated here.
    pub sales_order_id: Option<Uuid>,
    pub sales_order_line_id: Option<Uuid>,
    pub target_item: ItemId,
    pub target_quantity: Decimal,
    pub status: CuttingOrderStatus,
    pub operator: Option<UserId>,
    pub allow_late_items: bool,
    pub notes: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub audit: Audit,
}

/// Aggregate root: CuttingOrder (the reservation holder).
///
/// While the order is `pending` or `in_process` its items are logical
/// reservations against component stock. Nothing physical moves until
/// completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuttingOrder {
    id: CuttingOrderId,
    header: Option<CuttingOrderHeader>,
    items: Vec<OrderItem>,
    version: u64,
}

impl CuttingOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: CuttingOrderId) -> Self {
        Self {
            id,
            header: None,
            items: Vec::new(),
            version: 0,
        }
    }

    /// Rebuild an order loaded from storage.
    pub fn restore(header: CuttingOrderHeader, mut items: Vec<OrderItem>, version: u64) -> Self {
        items.sort_by_key(|i| i.component_id);
        Self {
            id: header.id,
            header: Some(header),
            items,
            version,
        }
    }

    pub fn id_typed(&self) -> CuttingOrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.header.is_some()
    }

    pub fn header(&self) -> Option<&CuttingOrderHeader> {
        self.header.as_ref()
    }

    pub fn status(&self) -> Option<CuttingOrderStatus> {
        self.header.as_ref().map(|h| h.status)
    }

    /// Items sorted by component id.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn items_total(&self) -> Decimal {
        items_total(&self.items)
    }

    fn require_header(&self) -> DomainResult<&CuttingOrderHeader> {
        self.header
            .as_ref()
            .ok_or_else(|| DomainError::not_found("cutting order", self.id))
    }

    fn ensure_order_id(&self, order_id: CuttingOrderId) -> DomainResult<()> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for CuttingOrder {
    type Id = CuttingOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateCuttingOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCuttingOrder {
    pub order_id: CuttingOrderId,
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
    pub occurred_at: DateTime<Utc>,
}

/// Header fields an update may change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderChanges {
    pub target_quantity: Option<Decimal>,
    pub operator: Option<Option<UserId>>,
    pub allow_late_items: Option<bool>,
    pub notes: Option<String>,
}

/// Command: UpdateCuttingOrder. `items: Some(..)` replaces the full item set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCuttingOrder {
    pub order_id: CuttingOrderId,
    pub changes: OrderChanges,
    pub items: Option<Vec<OrderItemInput>>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionCuttingOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCuttingOrder {
    pub order_id: CuttingOrderId,
    pub target: CuttingOrderStatus,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CuttingOrderCommand {
    Create(CreateCuttingOrder),
    Update(UpdateCuttingOrder),
    Transition(TransitionCuttingOrder),
}

/// Event: CuttingOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingOrderCreated {
    pub order_id: CuttingOrderId,
    pub order_number: String,
    pub sales_order_id: Option<Uuid>,
    pub sales_order_line_id: Option<Uuid>,
    pub target_item: ItemId,
    pub target_quantity: Decimal,
    pub items: Vec<OrderItem>,
    pub allow_late_items: bool,
    pub operator: Option<UserId>,
    pub notes: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CuttingOrderUpdated (resulting header fields and item set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingOrderUpdated {
    pub order_id: CuttingOrderId,
    pub target_quantity: Decimal,
    pub operator: Option<UserId>,
    pub allow_late_items: bool,
    pub notes: String,
    pub items: Vec<OrderItem>,
    pub items_replaced: bool,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CuttingOrderStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingOrderStarted {
    pub order_id: CuttingOrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CuttingOrderCompleted. `items` are the quantities debited from stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingOrderCompleted {
    pub order_id: CuttingOrderId,
    pub target_item: ItemId,
    pub items: Vec<OrderItem>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CuttingOrderCancelled. `released` are the reservations given back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingOrderCancelled {
    pub order_id: CuttingOrderId,
    pub previous_status: CuttingOrderStatus,
    pub released: Vec<OrderItem>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CuttingOrderEvent {
    Created(CuttingOrderCreated),
    Updated(CuttingOrderUpdated),
    Started(CuttingOrderStarted),
    Completed(CuttingOrderCompleted),
    Cancelled(CuttingOrderCancelled),
}

impl CuttingOrderEvent {
    pub fn order_id(&self) -> CuttingOrderId {
        match self {
            CuttingOrderEvent::Created(e) => e.order_id,
            CuttingOrderEvent::Updated(e) => e.order_id,
            CuttingOrderEvent::Started(e) => e.order_id,
            CuttingOrderEvent::Completed(e) => e.order_id,
            CuttingOrderEvent::Cancelled(e) => e.order_id,
        }
    }
}

impl Event for CuttingOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CuttingOrderEvent::Created(_) => "order.created",
            CuttingOrderEvent::Updated(_) => "order.updated",
            CuttingOrderEvent::Started(_) => "order.started",
            CuttingOrderEvent::Completed(_) => "order.completed",
            CuttingOrderEvent::Cancelled(_) => "order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CuttingOrderEvent::Created(e) => e.occurred_at,
            CuttingOrderEvent::Updated(e) => e.occurred_at,
            CuttingOrderEvent::Started(e) => e.occurred_at,
            CuttingOrderEvent::Completed(e) => e.occurred_at,
            CuttingOrderEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CuttingOrder {
    type Command = CuttingOrderCommand;
    type Event = CuttingOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CuttingOrderEvent::Created(e) => {
                self.id = e.order_id;
                self.header = Some(CuttingOrderHeader {
                    id: e.order_id,
                    order_number: e.order_number.clone(),
                    sales_order_id: e.sales_order_id,
                    sales_order_line_id: e.sales_order_line_id,
                    target_item: e.target_item,
                    target_quantity: e.target_quantity,
                    status: CuttingOrderStatus::Pending,
                    operator: e.operator,
                    allow_late_items: e.allow_late_items,
                    notes: e.notes.clone(),
                    completed_at: None,
                    audit: Audit::created(e.actor, e.occurred_at),
                });
                self.items = e.items.clone();
            }
            CuttingOrderEvent::Updated(e) => {
                if let Some(h) = self.header.as_mut() {
                    h.target_quantity = e.target_quantity;
                    h.operator = e.operator;
                    h.allow_late_items = e.allow_late_items;
                    h.notes = e.notes.clone();
                    h.audit.touch(e.actor, e.occurred_at);
                }
                self.items = e.items.clone();
            }
            CuttingOrderEvent::Started(e) => {
                if let Some(h) = self.header.as_mut() {
                    h.status = CuttingOrderStatus::InProcess;
                    h.audit.touch(e.actor, e.occurred_at);
                }
            }
            CuttingOrderEvent::Completed(e) => {
                if let Some(h) = self.header.as_mut() {
                    h.status = CuttingOrderStatus::Completed;
                    h.completed_at = Some(e.occurred_at);
                    h.audit.touch(e.actor, e.occurred_at);
                }
            }
            CuttingOrderEvent::Cancelled(e) => {
                if let Some(h) = self.header.as_mut() {
                    h.status = CuttingOrderStatus::Cancelled;
                    h.audit.touch(e.actor, e.occurred_at);
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CuttingOrderCommand::Create(cmd) => self.handle_create(cmd),
            CuttingOrderCommand::Update(cmd) => self.handle_update(cmd),
            CuttingOrderCommand::Transition(cmd) => self.handle_transition(cmd),
        }
    }
}

impl CuttingOrder {
    fn handle_create(&self, cmd: &CreateCuttingOrder) -> DomainResult<Vec<CuttingOrderEvent>> {
        if self.is_created() {
            return Err(DomainError::DuplicateOrderNumber(cmd.order_number.clone()));
        }
        self.ensure_order_id(cmd.order_id)?;

        let order_number = cmd.order_number.trim();
        if order_number.is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        let target_quantity = quantity::positive(cmd.target_quantity, "target quantity")?;

        let items = normalize_items(&cmd.items)?;
        if items.is_empty() && !cmd.allow_late_items {
            return Err(DomainError::validation(
                "items are required unless late filling is allowed",
            ));
        }
        ensure_within_target(&items, target_quantity)?;

        Ok(vec![CuttingOrderEvent::Created(CuttingOrderCreated {
            order_id: cmd.order_id,
            order_number: order_number.to_string(),
            sales_order_id: cmd.sales_order_id,
            sales_order_line_id: cmd.sales_order_line_id,
            target_item: cmd.target_item,
            target_quantity,
            items,
            allow_late_items: cmd.allow_late_items,
            operator: cmd.operator,
            notes: cmd.notes.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCuttingOrder) -> DomainResult<Vec<CuttingOrderEvent>> {
        let header = self.require_header()?;
        self.ensure_order_id(cmd.order_id)?;

        if header.status.is_terminal() {
            return Err(DomainError::invalid_transition(header.status, "updated"));
        }

        let target_quantity = match cmd.changes.target_quantity {
            Some(q) => quantity::positive(q, "target quantity")?,
            None => header.target_quantity,
        };
        let items = match &cmd.items {
            Some(inputs) => normalize_items(inputs)?,
            None => self.items.clone(),
        };
        let allow_late_items = cmd.changes.allow_late_items.unwrap_or(header.allow_late_items);
        let operator = cmd.changes.operator.unwrap_or(header.operator);
        let notes = cmd.changes.notes.clone().unwrap_or_else(|| header.notes.clone());

        if items.is_empty() && !allow_late_items {
            return Err(DomainError::validation(
                "items are required unless late filling is allowed",
            ));
        }
        ensure_within_target(&items, target_quantity)?;

        let items_replaced = items != self.items;
        let unchanged = !items_replaced
            && target_quantity == header.target_quantity
            && allow_late_items == header.allow_late_items
            && operator == header.operator
            && notes == header.notes;
        if unchanged {
            return Ok(vec![]);
        }

        Ok(vec![CuttingOrderEvent::Updated(CuttingOrderUpdated {
            order_id: cmd.order_id,
            target_quantity,
            operator,
            allow_late_items,
            notes,
            items,
            items_replaced,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(
        &self,
        cmd: &TransitionCuttingOrder,
    ) -> DomainResult<Vec<CuttingOrderEvent>> {
        let header = self.require_header()?;
        self.ensure_order_id(cmd.order_id)?;

        // Repeating the current status is an idempotent no-op (safe client retries).
        if header.status == cmd.target {
            return Ok(vec![]);
        }
        if !header.status.can_transition_to(cmd.target) {
            return Err(DomainError::invalid_transition(header.status, cmd.target));
        }

        let event = match cmd.target {
            CuttingOrderStatus::InProcess => CuttingOrderEvent::Started(CuttingOrderStarted {
                order_id: cmd.order_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            CuttingOrderStatus::Completed => {
                if self.items.is_empty() {
                    return Err(DomainError::validation(
                        "cannot complete a cutting order without items",
                    ));
                }
                let total = self.items_total();
                if total > header.target_quantity {
                    return Err(DomainError::invariant(format!(
                        "items total {total} exceeds target quantity {} at completion",
                        header.target_quantity
                    )));
                }
                CuttingOrderEvent::Completed(CuttingOrderCompleted {
                    order_id: cmd.order_id,
                    target_item: header.target_item,
                    items: self.items.clone(),
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })
            }
            CuttingOrderStatus::Cancelled => CuttingOrderEvent::Cancelled(CuttingOrderCancelled {
                order_id: cmd.order_id,
                previous_status: header.status,
                released: self.items.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            CuttingOrderStatus::Pending => {
                return Err(DomainError::invalid_transition(header.status, cmd.target));
            }
        };

        Ok(vec![event])
    }
}
