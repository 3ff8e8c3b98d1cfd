//! Back/forward navigation fan-out.
//!
//! The host reports external navigation (a `popstate` in browsers) through
//! `SyncContext::notify_navigation`; the hub forwards it to every binding
//! that registered for it.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Callback run on external navigation.
pub type NavigationListener = Arc<dyn Fn() + Send + Sync>;

/// Handle to a registered navigation listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Registered navigation listeners.
pub struct NavigationHub {
    listeners: Mutex<BTreeMap<ListenerId, NavigationListener>>,
    next_id: AtomicU64,
}

impl NavigationHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a listener for back/forward navigation.
    pub fn register(&self, listener: NavigationListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().insert(id, listener);
        id
    }

    /// Remove a listener.
    pub fn unregister(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Run every listener, in registration order, outside the lock.
    pub fn dispatch(&self) {
        let listeners: Vec<NavigationListener> = self.listeners.lock().values().cloned().collect();
        trace!(listeners = listeners.len(), "Dispatching navigation");
        for listener in listeners {
            listener();
        }
    }
}

impl Default for NavigationHub {
    fn default() -> Self {
        Self::new()
    }
}
