//! Post-commit event publication.
//!
//! Services collect envelopes in an [`Outbox`] while their transaction runs and
//! hand it to the [`Publisher`] only after `commit()` returned. A rolled-back
//! transaction simply drops its outbox.

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockcut_events::{Event, EventBus, EventEnvelope};

use crate::error::EngineResult;

pub const STOCK_AGGREGATE: &str = "item_stock";
pub const ORDER_AGGREGATE: &str = "cutting_order";

/// Envelopes produced by one unit of work, in emission order.
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<EventEnvelope<JsonValue>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<E>(&mut self, aggregate_id: Uuid, aggregate_type: &str, event: &E) -> EngineResult<()>
    where
        E: Event + Serialize,
    {
        self.envelopes
            .push(EventEnvelope::from_typed(aggregate_id, aggregate_type, event)?);
        Ok(())
    }

    /// Append another outbox's envelopes after this one's.
    pub fn extend(&mut self, other: Outbox) {
        self.envelopes.extend(other.envelopes);
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

/// Hands committed envelopes to the bus.
#[derive(Debug, Clone)]
pub struct Publisher<B> {
    bus: B,
}

impl<B> Publisher<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Publish everything in `outbox`. Returns how many envelopes the bus accepted.
    ///
    /// The data is already committed, so a bus failure is logged and the
    /// remaining envelopes are still attempted.
    pub fn publish(&self, outbox: Outbox) -> usize {
        let mut delivered = 0;
        for envelope in outbox.envelopes {
            let event_id = envelope.event_id();
            let event_type = envelope.event_type().to_string();
            match self.bus.publish(envelope) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    %event_id,
                    event_type = %event_type,
                    error = ?e,
                    "failed to publish committed event"
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockcut_core::{ItemId, UserId};
    use stockcut_events::{InMemoryEventBus, Subscription};
    use stockcut_inventory::{StockEvent, StockEventKind};

    struct FailingBus;

    impl EventBus<EventEnvelope<JsonValue>> for FailingBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err("bus down")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            let (_tx, rx) = std::sync::mpsc::channel();
            Subscription::new(rx)
        }
    }

    fn outbox_with_one_event() -> Outbox {
        let item = ItemId::new();
        let event = StockEvent::record(
            item.into(),
            dec!(3),
            StockEventKind::Inflow,
            "receipt",
            UserId::new(),
            Utc::now(),
        )
        .unwrap();
        let mut outbox = Outbox::new();
        outbox.record(*item.as_uuid(), STOCK_AGGREGATE, &event).unwrap();
        outbox
    }

    #[test]
    fn publishes_in_order() {
        let bus: std::sync::Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> =
            std::sync::Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let publisher = Publisher::new(bus.clone());

        assert_eq!(publisher.publish(outbox_with_one_event()), 1);
        assert_eq!(bus.delivered(), 1);

        let received = sub.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event_type(), "stock.credited");
        assert_eq!(received[0].aggregate_type(), STOCK_AGGREGATE);
    }

    #[test]
    fn bus_failure_is_not_an_error() {
        let publisher = Publisher::new(FailingBus);
        assert_eq!(publisher.publish(outbox_with_one_event()), 0);
    }
}
