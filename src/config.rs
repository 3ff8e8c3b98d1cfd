//! Binding options and context configuration.

use crate::error::{Result, SyncError};
use crate::types::{KeySet, PriorityOrder};
use serde::Deserialize;
use std::time::Duration;

/// Default encoding threshold, in UTF-16 code units.
pub const DEFAULT_ENCODING_THRESHOLD: usize = 100;

/// Default quiet period before a flush.
pub const DEFAULT_FLUSH_DELAY_MS: u64 = 100;

/// Size-triggered binary-safe encoding for the navigation backend.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncodingOptions {
    pub enabled: bool,
    /// Payloads strictly longer than this are encoded.
    pub threshold: usize,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_ENCODING_THRESHOLD,
        }
    }
}

impl EncodingOptions {
    pub fn enabled(threshold: usize) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }
}

/// Per-binding options.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BindOptions {
    /// Read precedence. Backends missing from the list are never read.
    pub priority: PriorityOrder,

    /// Navigation keys whose change records a new history entry.
    pub history: Vec<String>,

    pub binary_encoding: EncodingOptions,

    pub flush_delay_ms: u64,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            priority: PriorityOrder::default(),
            history: Vec::new(),
            binary_encoding: EncodingOptions::default(),
            flush_delay_ms: DEFAULT_FLUSH_DELAY_MS,
        }
    }
}

impl BindOptions {
    /// Parse options from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidOptions(e.to_string()))
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn history_keys(&self) -> KeySet {
        KeySet::of(self.history.iter().cloned())
    }
}

/// Context-wide configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Number of parsed query strings kept in the navigation cache.
    pub query_cache_capacity: usize,

    /// Max buffered events per event subscriber before it is dropped.
    pub event_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            query_cache_capacity: 16,
            event_buffer_size: 256,
        }
    }
}
