//! Names already bound, per backend.

use crate::error::{Result, SyncError};
use crate::types::{Backend, KeySets, StoreName};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-backend set of bound store names.
///
/// A name stays reserved after its binding is destroyed; only
/// [`Registry::clear`] releases names.
#[derive(Default)]
pub struct Registry {
    bound: Mutex<HashMap<Backend, HashSet<StoreName>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` in every backend `key_sets` declares.
    ///
    /// Fails without reserving anything if any of those backends already
    /// holds the name.
    pub fn claim(&self, name: &StoreName, key_sets: &KeySets) -> Result<()> {
        let mut bound = self.bound.lock();

        for (backend, _) in key_sets.declared() {
            if bound.get(&backend).is_some_and(|names| names.contains(name)) {
                return Err(SyncError::BindingConflict {
                    name: name.to_string(),
                    backend,
                });
            }
        }

        for (backend, _) in key_sets.declared() {
            bound.entry(backend).or_default().insert(name.clone());
        }

        debug!(name = %name, "Reserved store name");
        Ok(())
    }

    /// Whether `name` is reserved in `backend`.
    pub fn is_bound(&self, name: &StoreName, backend: Backend) -> bool {
        self.bound
            .lock()
            .get(&backend)
            .is_some_and(|names| names.contains(name))
    }

    /// Release every name.
    pub fn clear(&self) {
        self.bound.lock().clear();
    }
}
