//! The reactive store the engine binds to.
//!
//! The engine only needs get/patch/subscribe. [`MemoryStore`] is the bundled
//! implementation; any other store can be bound by implementing
//! [`ReactiveStore`].

use crate::types::{KeySet, Snapshot};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Called with `(next, previous)` after every transition.
pub type StoreListener = Arc<dyn Fn(&Snapshot, &Snapshot) + Send + Sync>;

/// Unique identifier for a store subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Observable state container.
pub trait ReactiveStore: Send + Sync + 'static {
    /// Current full state.
    fn get(&self) -> Snapshot;

    /// Merge `partial` into the state and notify listeners.
    fn set(&self, partial: Snapshot) {
        self.patch(partial, &KeySet::default());
    }

    /// Merge `partial` and leave every key in `cleared` undefined, as one
    /// transition.
    fn patch(&self, partial: Snapshot, cleared: &KeySet);

    /// Register `listener` for every later transition.
    fn subscribe(&self, listener: StoreListener) -> SubscriptionId;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

struct StoreState {
    value: Snapshot,
    listeners: BTreeMap<SubscriptionId, StoreListener>,
    next_id: u64,
}

/// In-memory reactive store.
///
/// Listeners run after the internal lock is released, in subscription
/// order, so they may read or write the store again.
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Create a store holding `initial`.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            state: Mutex::new(StoreState {
                value: initial,
                listeners: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Mutate the state in place and notify listeners.
    pub fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        let (next, previous, listeners) = {
            let mut state = self.state.lock();
            let previous = state.value.clone();
            f(&mut state.value);
            let listeners: Vec<StoreListener> = state.listeners.values().cloned().collect();
            (state.value.clone(), previous, listeners)
        };

        for listener in listeners {
            listener(&next, &previous);
        }
    }

    /// Clear a field, leaving it undefined.
    pub fn remove(&self, key: &str) {
        self.patch(Snapshot::new(), &KeySet::of([key]));
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

impl ReactiveStore for MemoryStore {
    fn get(&self) -> Snapshot {
        self.state.lock().value.clone()
    }

    fn patch(&self, partial: Snapshot, cleared: &KeySet) {
        self.update(|state| {
            for key in cleared.iter() {
                state.remove(key);
            }
            state.merge(partial);
        });
    }

    fn subscribe(&self, listener: StoreListener) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.listeners.insert(id, listener);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.state.lock().listeners.remove(&id);
    }
}
