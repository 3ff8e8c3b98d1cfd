//! In-process substrates.

use super::{KeyValueSubstrate, LocationSubstrate};
use crate::error::SubstrateError;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct StorageState {
    entries: HashMap<String, String>,
    writes: usize,
}

impl StorageState {
    fn used_bytes_with(&self, key: &str, value: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>()
            + key.len()
            + value.len()
    }
}

/// Key-value storage held in memory, with an optional byte quota.
///
/// Every `set_item` call is counted, successful or not, so tests can
/// assert how often the engine touched the substrate.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
    quota: Mutex<Option<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that refuses writes once keys plus values exceed `limit` bytes.
    pub fn with_quota(limit: usize) -> Self {
        let storage = Self::default();
        *storage.quota.lock() = Some(limit);
        storage
    }

    /// Change or lift the byte quota.
    pub fn set_quota(&self, limit: Option<usize>) {
        *self.quota.lock() = limit;
    }

    /// Seed an entry without counting it as a write.
    pub fn seed(&self, key: &str, value: &str) {
        self.state
            .lock()
            .entries
            .insert(key.to_string(), value.to_string());
    }

    /// Number of `set_item` calls so far.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

impl KeyValueSubstrate for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.state.lock().entries.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        let limit = *self.quota.lock();
        let mut state = self.state.lock();
        state.writes += 1;

        if let Some(limit) = limit {
            if state.used_bytes_with(key, value) > limit {
                return Err(SubstrateError::QuotaExceeded {
                    key: key.to_string(),
                    limit,
                });
            }
        }

        state.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

struct LocationState {
    entries: Vec<String>,
    current: usize,
    pushes: usize,
    replaces: usize,
}

/// An in-memory address bar with a back/forward stack.
///
/// `back` and `forward` only move through the stack. Like a browser, the
/// host is responsible for announcing the move, here by calling
/// `SyncContext::notify_navigation`.
pub struct MemoryLocation {
    state: Mutex<LocationState>,
}

impl MemoryLocation {
    pub fn new() -> Self {
        Self::with_search("")
    }

    /// Start at the given query text (a leading `?` is ignored).
    pub fn with_search(search: &str) -> Self {
        Self {
            state: Mutex::new(LocationState {
                entries: vec![strip_question_mark(search).to_string()],
                current: 0,
                pushes: 0,
                replaces: 0,
            }),
        }
    }

    /// Step back one entry. Returns false at the start of history.
    pub fn back(&self) -> bool {
        let mut state = self.state.lock();
        if state.current == 0 {
            return false;
        }
        state.current -= 1;
        true
    }

    /// Step forward one entry. Returns false at the end of history.
    pub fn forward(&self) -> bool {
        let mut state = self.state.lock();
        if state.current + 1 >= state.entries.len() {
            return false;
        }
        state.current += 1;
        true
    }

    /// Simulate the user editing the address without going through the engine.
    pub fn navigate_to(&self, search: &str) {
        let mut state = self.state.lock();
        let next = state.current + 1;
        state.entries.truncate(next);
        state.entries.push(strip_question_mark(search).to_string());
        state.current = next;
    }

    /// Number of history entries.
    pub fn history_len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Number of `push` calls so far.
    pub fn push_count(&self) -> usize {
        self.state.lock().pushes
    }

    /// Number of `replace` calls so far.
    pub fn replace_count(&self) -> usize {
        self.state.lock().replaces
    }

    /// Total writes through `push` and `replace`.
    pub fn write_count(&self) -> usize {
        let state = self.state.lock();
        state.pushes + state.replaces
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSubstrate for MemoryLocation {
    fn search(&self) -> String {
        let state = self.state.lock();
        state.entries[state.current].clone()
    }

    fn push(&self, search: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        let next = state.current + 1;
        state.entries.truncate(next);
        state.entries.push(strip_question_mark(search).to_string());
        state.current = next;
        state.pushes += 1;
        Ok(())
    }

    fn replace(&self, search: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        let current = state.current;
        state.entries[current] = strip_question_mark(search).to_string();
        state.replaces += 1;
        Ok(())
    }
}

fn strip_question_mark(search: &str) -> &str {
    search.strip_prefix('?').unwrap_or(search)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_quota() {
        let storage = MemoryStorage::with_quota(10);

        assert!(storage.set_item("k", "12345").is_ok());
        let err = storage.set_item("other", "123456").unwrap_err();
        assert!(matches!(err, SubstrateError::QuotaExceeded { limit: 10, .. }));

        // Overwriting an existing key only counts its new size
        assert!(storage.set_item("k", "123456789").is_ok());
        assert_eq!(storage.write_count(), 3);
        assert_eq!(storage.get_item("k").as_deref(), Some("123456789"));
    }

    #[test]
    fn test_seed_is_not_a_write() {
        let storage = MemoryStorage::new();
        storage.seed("a", "1");
        assert_eq!(storage.write_count(), 0);
        assert_eq!(storage.get_item("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_location_history() {
        let location = MemoryLocation::with_search("?a=1");
        location.push("a=2").unwrap();
        location.replace("a=3").unwrap();

        assert_eq!(location.search(), "a=3");
        assert_eq!(location.history_len(), 2);

        assert!(location.back());
        assert_eq!(location.search(), "a=1");
        assert!(!location.back());

        assert!(location.forward());
        assert_eq!(location.search(), "a=3");

        // Pushing after going back drops the forward entries
        location.back();
        location.push("b=1").unwrap();
        assert_eq!(location.history_len(), 2);
        assert!(!location.forward());
    }
}
