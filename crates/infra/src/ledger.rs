//! Stock ledger: the only code path that changes a stock row's balance.
//!
//! ```text
//! append(target, delta, kind)
//!   ↓
//! 1. Validate the event (delta <> 0, sign matches kind, scale)
//!   ↓
//! 2. Lock the target's stock row
//!   ↓
//! 3. new_balance = current + delta, rejected if negative or, for component
//!    outflows, below what active cutting orders have reserved
//!   ↓
//! 4. Write the event and the new balance in the same transaction
//!   ↓
//! 5. Re-sync the composite parent (components only)
//!   ↓
//! 6. Commit, then publish stock.debited / stock.credited
//! ```
//!
//! [`append_in`] runs steps 1-4 inside a caller's transaction; cutting order
//! completion uses it to debit several components atomically.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::instrument;

use stockcut_core::{CuttingOrderId, DomainError, ItemId, UserId, quantity};
use stockcut_events::{EventBus, EventEnvelope};
use stockcut_inventory::{ItemStock, StockEvent, StockEventKind, StockTarget};

use crate::catalog::ItemDirectory;
use crate::composite::sync_in;
use crate::error::EngineResult;
use crate::publish::{Outbox, Publisher, STOCK_AGGREGATE};
use crate::reservations::reserved_in;
use crate::store::{StockStore, StockTx};

/// One balance change to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRequest {
    pub target: StockTarget,
    pub delta: Decimal,
    pub kind: StockEventKind,
    pub note: String,
    pub actor: UserId,
    /// Cutting order whose own reservation this outflow consumes.
    pub consuming: Option<CuttingOrderId>,
}

impl AppendRequest {
    pub fn new(
        target: impl Into<StockTarget>,
        delta: Decimal,
        kind: StockEventKind,
        note: impl Into<String>,
        actor: UserId,
    ) -> Self {
        Self {
            target: target.into(),
            delta,
            kind,
            note: note.into(),
            actor,
            consuming: None,
        }
    }

    /// Let the outflow draw on `order`'s reservation (cutting order completion).
    pub fn consuming(mut self, order: CuttingOrderId) -> Self {
        self.consuming = Some(order);
        self
    }
}

/// Result of [`append_in`]: the recorded event and the row's new balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub event: StockEvent,
    pub balance: Decimal,
    /// Composite the target belongs to; the caller must re-sync it before commit.
    pub parent_item: Option<ItemId>,
}

/// Record one event and write the resulting balance inside `tx`.
///
/// Rejects appends to inactive rows and to composite items (their balance is
/// derived from their components). A component outflow may not leave less than
/// the active reservations on it, except those of `request.consuming`.
/// Does not re-sync the composite parent.
pub fn append_in<T: StockTx + ?Sized>(
    tx: &mut T,
    request: &AppendRequest,
    at: DateTime<Utc>,
) -> EngineResult<Posting> {
    let event = StockEvent::record(
        request.target,
        request.delta,
        request.kind,
        request.note.clone(),
        request.actor,
        at,
    )?;

    let mut stock = tx
        .lock_stock(event.target)?
        .ok_or_else(|| DomainError::not_found("item stock", event.target))?;

    if !stock.is_active() {
        return Err(DomainError::validation(format!("{} is inactive", event.target)).into());
    }
    if let StockTarget::Item(item) = event.target {
        if !tx.component_stocks_of(item)?.is_empty() {
            return Err(DomainError::validation(format!(
                "{} is composite; its balance mirrors its components",
                event.target
            ))
            .into());
        }
    }

    if let Err(e) = stock.apply(&event) {
        tracing::warn!(
            target = %event.target,
            delta = %event.delta,
            balance = %stock.quantity(),
            "stock append rejected"
        );
        return Err(e.into());
    }

    if let (Some(component), true) = (event.target.component(), event.delta.is_sign_negative()) {
        let reserved = reserved_in(tx, component, request.consuming)?;
        if stock.quantity() < reserved {
            let available = stock.quantity() - event.delta - reserved;
            tracing::warn!(
                target = %event.target,
                delta = %event.delta,
                %reserved,
                %available,
                "stock append would release reserved stock"
            );
            return Err(
                DomainError::insufficient_stock(event.target, -event.delta, available).into(),
            );
        }
    }

    tx.insert_stock_event(&event)?;
    tx.save_stock(&stock)?;

    Ok(Posting {
        balance: stock.quantity(),
        parent_item: stock.parent_item(),
        event,
    })
}

/// Ledger service: each call is one transaction followed by publication.
pub struct StockLedger<S, B> {
    store: Arc<S>,
    directory: Arc<dyn ItemDirectory>,
    publisher: Publisher<B>,
}

impl<S, B> StockLedger<S, B>
where
    S: StockStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: Arc<S>, directory: Arc<dyn ItemDirectory>, bus: B) -> Self {
        Self {
            store,
            directory,
            publisher: Publisher::new(bus),
        }
    }

    /// Create the stock row for `target`, optionally with an initial inflow.
    ///
    /// Idempotent: when the row already exists it is returned unchanged and no
    /// event is recorded. Initializing a component also creates its composite
    /// parent's row (at zero) and re-syncs it.
    #[instrument(skip(self), err)]
    pub fn initialize(
        &self,
        target: StockTarget,
        initial_quantity: Decimal,
        actor: UserId,
    ) -> EngineResult<ItemStock> {
        if initial_quantity < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "initial quantity must be >= 0 (got {initial_quantity})"
            ))
            .into());
        }
        let initial_quantity = quantity::storable(initial_quantity, "initial quantity")?;

        let mut tx = self.store.begin()?;
        if let Some(existing) = tx.find_stock(target)? {
            tracing::info!(%target, "stock already initialized");
            return Ok(existing);
        }

        let now = Utc::now();
        let stock = match target {
            StockTarget::Item(item) => {
                self.directory
                    .item(item)
                    .ok_or_else(|| DomainError::not_found("item", item))?;
                ItemStock::for_item(item, actor, now)
            }
            StockTarget::Component(component) => {
                let entry = self
                    .directory
                    .component(component)
                    .ok_or_else(|| DomainError::not_found("component", component))?;
                if tx.insert_stock(&ItemStock::for_item(entry.item_id, actor, now))? {
                    tracing::debug!(item_id = %entry.item_id, "created composite stock row");
                }
                ItemStock::for_component(component, entry.item_id, actor, now)
            }
        };

        if !tx.insert_stock(&stock)? {
            // A concurrent initialize committed first.
            let existing = tx.find_stock(target)?.ok_or_else(|| {
                DomainError::consistency(format!("{target} vanished after insert conflict"))
            })?;
            return Ok(existing);
        }

        let mut outbox = Outbox::new();
        if initial_quantity > Decimal::ZERO {
            let request = AppendRequest::new(
                target,
                initial_quantity,
                StockEventKind::InitialInflow,
                "initial stock",
                actor,
            );
            let posting = append_in(&mut tx, &request, now)?;
            outbox.record(*target.as_uuid(), STOCK_AGGREGATE, &posting.event)?;
        }
        if let Some(parent) = stock.parent_item() {
            sync_in(&mut tx, parent, actor, now)?;
        }

        let stock = tx.find_stock(target)?.ok_or_else(|| {
            DomainError::consistency(format!("{target} missing after initialization"))
        })?;
        tx.commit()?;
        self.publisher.publish(outbox);

        tracing::info!(%target, quantity = %stock.quantity(), "stock initialized");
        Ok(stock)
    }

    /// Record one balance change in its own transaction.
    #[instrument(
        skip(self, request),
        fields(target = %request.target, delta = %request.delta, kind = %request.kind),
        err
    )]
    pub fn append(&self, request: AppendRequest) -> EngineResult<StockEvent> {
        let mut tx = self.store.begin()?;
        let now = Utc::now();

        let posting = append_in(&mut tx, &request, now)?;
        if let Some(parent) = posting.parent_item {
            sync_in(&mut tx, parent, request.actor, now)?;
        }

        let mut outbox = Outbox::new();
        outbox.record(*posting.event.target.as_uuid(), STOCK_AGGREGATE, &posting.event)?;
        tx.commit()?;
        self.publisher.publish(outbox);

        tracing::info!(
            event_id = %posting.event.id,
            balance = %posting.balance,
            "stock event appended"
        );
        Ok(posting.event)
    }

    /// Logically delete a stock row. Already-inactive rows are returned as-is.
    #[instrument(skip(self), err)]
    pub fn deactivate(&self, target: StockTarget, actor: UserId) -> EngineResult<ItemStock> {
        self.set_active(target, actor, false)
    }

    #[instrument(skip(self), err)]
    pub fn reactivate(&self, target: StockTarget, actor: UserId) -> EngineResult<ItemStock> {
        self.set_active(target, actor, true)
    }

    /// The append-only trail of `target`, oldest first.
    pub fn events(&self, target: StockTarget) -> EngineResult<Vec<StockEvent>> {
        let mut tx = self.store.begin()?;
        if tx.find_stock(target)?.is_none() {
            return Err(DomainError::not_found("item stock", target).into());
        }
        Ok(tx.stock_events(target)?)
    }

    fn set_active(&self, target: StockTarget, actor: UserId, active: bool) -> EngineResult<ItemStock> {
        let mut tx = self.store.begin()?;
        let mut stock = tx
            .lock_stock(target)?
            .ok_or_else(|| DomainError::not_found("item stock", target))?;
        if stock.is_active() == active {
            return Ok(stock);
        }

        let now = Utc::now();
        if active {
            stock.reactivate(actor, now);
        } else {
            stock.deactivate(actor, now);
        }
        tx.save_stock(&stock)?;
        if let Some(parent) = stock.parent_item() {
            sync_in(&mut tx, parent, actor, now)?;
        }
        tx.commit()?;

        tracing::info!(%target, active, "stock row activity changed");
        Ok(stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use stockcut_core::ComponentId;
    use stockcut_events::InMemoryEventBus;

    use crate::catalog::InMemoryItemDirectory;
    use crate::store::InMemoryStockStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct Fixture {
        store: Arc<InMemoryStockStore>,
        directory: Arc<InMemoryItemDirectory>,
        bus: Bus,
        ledger: StockLedger<InMemoryStockStore, Bus>,
    }

    fn setup() -> Fixture {
        let store = Arc::new(InMemoryStockStore::new());
        let directory = Arc::new(InMemoryItemDirectory::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let ledger = StockLedger::new(store.clone(), directory.clone(), bus.clone());
        Fixture {
            store,
            directory,
            bus,
            ledger,
        }
    }

    fn balance(store: &InMemoryStockStore, target: StockTarget) -> Decimal {
        let mut tx = store.begin().unwrap();
        tx.find_stock(target).unwrap().unwrap().quantity()
    }

    #[test]
    fn initialize_is_idempotent() {
        let fx = setup();
        let actor = UserId::new();
        let item = fx.directory.register_item("bolt");

        let first = fx.ledger.initialize(item.into(), dec!(10), actor).unwrap();
        let second = fx.ledger.initialize(item.into(), dec!(10), actor).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.quantity(), dec!(10));
        let events = fx.ledger.events(item.into()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, StockEventKind::InitialInflow);
    }

    #[test]
    fn initialize_at_zero_records_no_event() {
        let fx = setup();
        let item = fx.directory.register_item("nut");
        let stock = fx.ledger.initialize(item.into(), dec!(0), UserId::new()).unwrap();
        assert_eq!(stock.quantity(), dec!(0));
        assert!(fx.ledger.events(item.into()).unwrap().is_empty());
    }

    #[test]
    fn initialize_unknown_item_is_not_found() {
        let fx = setup();
        let err = fx
            .ledger
            .initialize(ItemId::new().into(), dec!(1), UserId::new())
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotFound { .. })));
    }

    #[test]
    fn initializing_a_component_creates_and_syncs_the_composite() {
        let fx = setup();
        let actor = UserId::new();
        let sheet = fx.directory.register_item("sheet");
        let coil = fx.directory.register_component(sheet, "coil");

        fx.ledger.initialize(coil.into(), dec!(12.5), actor).unwrap();

        assert_eq!(balance(&fx.store, sheet.into()), dec!(12.5));
    }

    #[test]
    fn append_rejects_overdraw_without_writing() {
        let fx = setup();
        let actor = UserId::new();
        let item = fx.directory.register_item("bolt");
        fx.ledger.initialize(item.into(), dec!(5), actor).unwrap();

        let err = fx
            .ledger
            .append(AppendRequest::new(item, dec!(-6), StockEventKind::OutflowSale, "", actor))
            .unwrap_err();
        match err.domain() {
            Some(DomainError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(*requested, dec!(6));
                assert_eq!(*available, dec!(5));
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(balance(&fx.store, item.into()), dec!(5));
        assert_eq!(fx.ledger.events(item.into()).unwrap().len(), 1);
    }

    #[test]
    fn append_rejects_zero_and_wrong_sign() {
        let fx = setup();
        let actor = UserId::new();
        let item = fx.directory.register_item("bolt");
        fx.ledger.initialize(item.into(), dec!(5), actor).unwrap();

        for (delta, kind) in [
            (dec!(0), StockEventKind::Inflow),
            (dec!(-1), StockEventKind::Inflow),
            (dec!(1), StockEventKind::OutflowCut),
        ] {
            let err = fx
                .ledger
                .append(AppendRequest::new(item, delta, kind, "", actor))
                .unwrap_err();
            assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
        }
    }

    #[test]
    fn append_to_composite_item_is_rejected() {
        let fx = setup();
        let actor = UserId::new();
        let sheet = fx.directory.register_item("sheet");
        let coil = fx.directory.register_component(sheet, "coil");
        fx.ledger.initialize(coil.into(), dec!(3), actor).unwrap();

        let err = fx
            .ledger
            .append(AppendRequest::new(sheet, dec!(1), StockEventKind::Inflow, "", actor))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
    }

    #[test]
    fn component_append_resyncs_parent_and_publishes_after_commit() {
        let fx = setup();
        let actor = UserId::new();
        let sheet = fx.directory.register_item("sheet");
        let a = fx.directory.register_component(sheet, "coil a");
        let b = fx.directory.register_component(sheet, "coil b");
        fx.ledger.initialize(a.into(), dec!(10), actor).unwrap();
        fx.ledger.initialize(b.into(), dec!(5), actor).unwrap();

        let sub = fx.bus.subscribe();
        fx.ledger
            .append(AppendRequest::new(a, dec!(-4), StockEventKind::OutflowAdjustment, "scrap", actor))
            .unwrap();

        assert_eq!(balance(&fx.store, sheet.into()), dec!(11));
        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type(), "stock.debited");
    }

    #[test]
    fn deactivating_a_component_removes_it_from_the_mirror() {
        let fx = setup();
        let actor = UserId::new();
        let sheet = fx.directory.register_item("sheet");
        let a = fx.directory.register_component(sheet, "coil a");
        let b = fx.directory.register_component(sheet, "coil b");
        fx.ledger.initialize(a.into(), dec!(10), actor).unwrap();
        fx.ledger.initialize(b.into(), dec!(5), actor).unwrap();

        let row = fx.ledger.deactivate(b.into(), actor).unwrap();
        assert!(!row.is_active());
        assert_eq!(row.audit().deleted_by, Some(actor));
        assert_eq!(balance(&fx.store, sheet.into()), dec!(10));

        // inactive rows take no events
        let err = fx
            .ledger
            .append(AppendRequest::new(b, dec!(1), StockEventKind::Inflow, "", actor))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

        fx.ledger.reactivate(b.into(), actor).unwrap();
        assert_eq!(balance(&fx.store, sheet.into()), dec!(15));
    }

    #[test]
    fn events_of_unknown_target_is_not_found() {
        let fx = setup();
        let err = fx.ledger.events(ComponentId::new().into()).unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotFound { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: random sequences of appends never produce a negative
        /// balance, and every rejected append leaves the balance untouched.
        #[test]
        fn balance_never_negative(deltas in prop::collection::vec(-500i64..500i64, 1..40)) {
            let fx = setup();
            let actor = UserId::new();
            let item = fx.directory.register_item("widget");
            fx.ledger.initialize(item.into(), Decimal::ZERO, actor).unwrap();

            let mut expected = Decimal::ZERO;
            for raw in deltas {
                if raw == 0 {
                    continue;
                }
                let delta = Decimal::new(raw, 1);
                let kind = if raw > 0 { StockEventKind::Inflow } else { StockEventKind::OutflowSale };
                let result = fx.ledger.append(AppendRequest::new(item, delta, kind, "", actor));

                if expected + delta < Decimal::ZERO {
                    prop_assert!(result.is_err());
                } else {
                    prop_assert!(result.is_ok());
                    expected += delta;
                }
                let current = balance(&fx.store, item.into());
                prop_assert_eq!(current, expected);
                prop_assert!(current >= Decimal::ZERO);
            }
        }
    }
}
