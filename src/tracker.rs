//! Per-backend change detection.
//!
//! The tracker remembers, for each declared backend, the serialized text
//! of the projection last persisted. A transition is checked by
//! re-projecting the new state and comparing text, so a change to a field
//! no backend declares never reaches the flusher.

use crate::codec::Codec;
use crate::types::{Backend, KeySet, KeySets, Snapshot};
use std::collections::BTreeMap;

/// What a transition changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Backends whose projection differs from what was last persisted.
    pub dirty: Vec<Backend>,
    /// True if the history keys changed, meriting a new navigable entry.
    pub navigation_significant: bool,
}

impl ChangeSet {
    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }

    pub fn is_dirty(&self, backend: Backend) -> bool {
        self.dirty.contains(&backend)
    }
}

/// Last-persisted projections for one binding.
#[derive(Clone, Debug)]
pub struct ChangeTracker {
    key_sets: KeySets,
    /// History keys that are also navigation keys.
    history_keys: KeySet,
    /// Serialized text last persisted, per backend.
    tracked: BTreeMap<Backend, String>,
    history: Option<String>,
}

impl ChangeTracker {
    pub fn new(key_sets: KeySets, history_keys: &KeySet) -> Self {
        let history_keys = key_sets
            .get(Backend::Navigation)
            .map(|nav| nav.intersection(history_keys))
            .unwrap_or_default();

        Self {
            key_sets,
            history_keys,
            tracked: BTreeMap::new(),
            history: None,
        }
    }

    /// Treat `state` as already persisted everywhere.
    pub fn seed(&mut self, state: &Snapshot) {
        let declared: Vec<(Backend, KeySet)> = self
            .key_sets
            .declared()
            .map(|(b, keys)| (b, keys.clone()))
            .collect();

        for (backend, keys) in declared {
            self.commit(backend, state.project(&keys));
        }
    }

    /// Compare `state` against the last persisted projections.
    pub fn observe(&self, state: &Snapshot) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (backend, keys) in self.key_sets.declared() {
            let current = fingerprint(&state.project(keys));
            let prior = self.tracked.get(&backend).map(String::as_str);
            if prior != Some(current.as_str()) {
                changes.dirty.push(backend);
            }
        }

        if !self.history_keys.is_empty() {
            let current = fingerprint(&state.project(&self.history_keys));
            changes.navigation_significant = self.history.as_deref() != Some(current.as_str());
        }

        changes
    }

    /// Serialized text last persisted to `backend`.
    pub fn prior(&self, backend: Backend) -> Option<&str> {
        self.tracked.get(&backend).map(String::as_str)
    }

    /// Record `projection` as the last persisted value for `backend`.
    pub fn commit(&mut self, backend: Backend, projection: Snapshot) {
        if backend == Backend::Navigation && !self.history_keys.is_empty() {
            self.history = Some(fingerprint(&projection.project(&self.history_keys)));
        }
        self.tracked.insert(backend, fingerprint(&projection));
    }

    pub fn history_keys(&self) -> &KeySet {
        &self.history_keys
    }
}

fn fingerprint(snapshot: &Snapshot) -> String {
    // A string-keyed JSON map always serializes
    Codec::serialize(snapshot).unwrap_or_default()
}
