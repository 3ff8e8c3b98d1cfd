//! Backend adapters.
//!
//! Each adapter wraps one host substrate and speaks snapshots:
//! - `read` looks up a store's payload and projects it onto the requested keys
//! - `write` projects the current state, skips the call if nothing changed
//!   since the last persisted text, and reports every outcome as a
//!   [`WriteOutcome`] instead of an error
//!
//! A missing substrate is a normal operating mode (non-browser hosts):
//! reads return nothing and writes report [`WriteOutcome::Unavailable`].

mod navigation;
mod query;
mod storage;

pub use navigation::NavigationAdapter;
pub use query::{QueryCache, QueryParams};
pub use storage::StorageAdapter;

use crate::error::SubstrateError;
use crate::types::{Backend, KeySet, PersistedPayload, Snapshot, StoreName};

/// Result of a single backend write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The substrate accepted the write.
    Written {
        /// Plain serialization of the projected snapshot.
        serialized: String,
        /// True if the binary-safe transform was applied.
        encoded: bool,
    },
    /// The projection matched the last persisted text; no substrate call.
    Unchanged,
    /// No substrate in this host.
    Unavailable,
    /// The substrate refused the write.
    Failed(SubstrateError),
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// The three backend adapters of a context.
pub struct Adapters {
    pub navigation: NavigationAdapter,
    pub durable: StorageAdapter,
    pub session: StorageAdapter,
}

impl Adapters {
    /// Payload stored for `name`, if any decodes.
    pub fn load(&self, backend: Backend, name: &StoreName) -> Option<PersistedPayload> {
        match backend {
            Backend::Navigation => self.navigation.load(name),
            Backend::Durable => self.durable.load(name),
            Backend::Session => self.session.load(name),
        }
    }

    /// Persisted values for `keys`. Empty if nothing usable is stored.
    pub fn read(&self, backend: Backend, name: &StoreName, keys: &KeySet) -> Snapshot {
        self.load(backend, name)
            .map(|payload| payload.data.project(keys))
            .unwrap_or_default()
    }
}
