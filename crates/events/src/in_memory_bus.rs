//! In-process bus used by the engine in tests and single-node deployments.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("event bus lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Fanout<M> {
    senders: Vec<mpsc::Sender<M>>,
    delivered: u64,
}

/// Broadcasts each published message to every live [`Subscription`].
///
/// Delivery is synchronous and in publish order per subscriber. Subscriptions
/// whose receiver was dropped are removed on the next publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    fanout: Mutex<Fanout<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.fanout.lock().map(|f| f.senders.len()).unwrap_or(0)
    }

    /// Messages handed to at least one subscriber so far.
    pub fn delivered(&self) -> u64 {
        self.fanout.lock().map(|f| f.delivered).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            fanout: Mutex::new(Fanout {
                senders: Vec::new(),
                delivered: 0,
            }),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut fanout = self.fanout.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        let before = fanout.senders.len();
        fanout.senders.retain(|tx| tx.send(message.clone()).is_ok());
        let pruned = before - fanout.senders.len();
        if pruned > 0 {
            tracing::debug!(pruned, "closed subscriptions removed");
        }
        if !fanout.senders.is_empty() {
            fanout.delivered += 1;
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        match self.fanout.lock() {
            Ok(mut fanout) => fanout.senders.push(tx),
            Err(_) => tracing::warn!("event bus lock poisoned; subscription will stay empty"),
        }
        Subscription::new(rx)
    }
}
