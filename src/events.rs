//! Event channel for engine activity.
//!
//! Failures inside timer and subscription callbacks cannot propagate to
//! the caller, so they are published here (and logged). Consumers get a
//! bounded channel; a consumer that lets it fill up is dropped.

use crate::types::{Backend, StoreName};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Events published by bindings.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// A binding finished its initial read.
    Bound { name: StoreName },

    /// A backend substrate accepted a write.
    Persisted {
        name: StoreName,
        backend: Backend,
        /// True if the binary-safe transform was applied.
        encoded: bool,
    },

    /// A backend substrate refused a write. The value will be retried on
    /// the next change.
    WriteFailed {
        name: StoreName,
        backend: Backend,
        error: String,
    },

    /// Back/forward navigation updated these keys in the store.
    Resynced { name: StoreName, keys: Vec<String> },

    /// A binding was torn down.
    Destroyed { name: StoreName },
}

/// Unique identifier for an event subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventSubscriptionId(pub u64);

/// Receiving side of an event subscription.
pub struct EventSubscription {
    pub id: EventSubscriptionId,
    pub receiver: Receiver<SyncEvent>,
}

impl EventSubscription {
    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Option<SyncEvent> {
        self.receiver.try_recv().ok()
    }

    /// Everything received so far.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Broadcasts events to subscribers.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventSubscriptionId, Sender<SyncEvent>>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl EventBus {
    /// Create a bus with `buffer_size` slots per subscriber.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self) -> EventSubscription {
        let id = EventSubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);
        self.subscribers.write().insert(id, sender);
        EventSubscription { id, receiver }
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: EventSubscriptionId) {
        self.subscribers.write().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Send to every subscriber, dropping those that are full or gone.
    pub fn publish(&self, event: SyncEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscribers.read();
            if subs.is_empty() {
                return;
            }
            for (id, sender) in subs.iter() {
                if sender.try_send(event.clone()).is_err() {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                subs.remove(&id);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
