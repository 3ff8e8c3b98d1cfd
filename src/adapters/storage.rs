//! Adapter for durable and session key-value storage.

use super::WriteOutcome;
use crate::codec::Codec;
use crate::error::SubstrateError;
use crate::substrate::KeyValueSubstrate;
use crate::types::{Backend, KeySet, PersistedPayload, Snapshot, StoreName};
use std::sync::Arc;
use tracing::{trace, warn};

/// One entry per store name, holding the JSON text of its key subset.
pub struct StorageAdapter {
    backend: Backend,
    substrate: Option<Arc<dyn KeyValueSubstrate>>,
}

impl StorageAdapter {
    pub fn new(backend: Backend, substrate: Option<Arc<dyn KeyValueSubstrate>>) -> Self {
        Self { backend, substrate }
    }

    pub fn is_available(&self) -> bool {
        self.substrate.is_some()
    }

    pub fn load(&self, name: &StoreName) -> Option<PersistedPayload> {
        let raw = self.substrate.as_ref()?.get_item(name.as_str())?;

        match Codec::decode(&raw, false) {
            Ok(data) => Some(PersistedPayload {
                name: name.clone(),
                data,
                encoded: false,
            }),
            Err(e) => {
                warn!(name = %name, backend = %self.backend, error = %e, "Ignoring undecodable payload");
                None
            }
        }
    }

    pub fn read(&self, name: &StoreName, keys: &KeySet) -> Snapshot {
        self.load(name)
            .map(|payload| payload.data.project(keys))
            .unwrap_or_default()
    }

    /// Persist `state` projected onto `keys`, unless it matches `prior`.
    pub fn write(
        &self,
        name: &StoreName,
        keys: &KeySet,
        state: &Snapshot,
        prior: Option<&str>,
    ) -> WriteOutcome {
        let serialized = match Codec::serialize(&state.project(keys)) {
            Ok(text) => text,
            Err(e) => return WriteOutcome::Failed(SubstrateError::Rejected(e.to_string())),
        };

        if prior == Some(serialized.as_str()) {
            trace!(name = %name, backend = %self.backend, "Skipping unchanged write");
            return WriteOutcome::Unchanged;
        }

        let Some(substrate) = self.substrate.as_ref() else {
            return WriteOutcome::Unavailable;
        };

        match substrate.set_item(name.as_str(), &serialized) {
            Ok(()) => WriteOutcome::Written {
                serialized,
                encoded: false,
            },
            Err(e) => {
                warn!(name = %name, backend = %self.backend, error = %e, "Storage write failed");
                WriteOutcome::Failed(e)
            }
        }
    }
}
