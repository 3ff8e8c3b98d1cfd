//! Host substrates the backend adapters persist into.
//!
//! A substrate is the raw storage a host provides: a key-value store
//! (durable or session scoped) or an addressable location with a mutable
//! query string. Substrates know nothing about snapshots; they move text.
//!
//! Bundled implementations:
//! - [`MemoryStorage`] / [`MemoryLocation`]: in-process, with write counters
//! - [`FileStorage`]: JSON file for native hosts
//! - `web` (feature `web`, wasm32): browser storage, location and timers

mod file;
mod memory;
#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub mod web;

pub use file::FileStorage;
pub use memory::{MemoryLocation, MemoryStorage};

use crate::error::SubstrateError;

/// Key-value text storage, such as per-origin or per-session storage.
pub trait KeyValueSubstrate: Send + Sync {
    /// Read the entry under `key`.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Write the entry under `key`. May fail when the quota is exhausted.
    fn set_item(&self, key: &str, value: &str) -> Result<(), SubstrateError>;
}

/// An address with a mutable query string and back/forward history.
pub trait LocationSubstrate: Send + Sync {
    /// Raw query text, without the leading `?`.
    fn search(&self) -> String;

    /// Set the query text and record a new history entry.
    fn push(&self, search: &str) -> Result<(), SubstrateError>;

    /// Set the query text, overwriting the current history entry.
    fn replace(&self, search: &str) -> Result<(), SubstrateError>;
}
