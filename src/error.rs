//! Error types for the synchronization engine.

use crate::types::Backend;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store name '{name}' is already bound in the {backend} backend")]
    BindingConflict { name: String, backend: Backend },

    #[error("Invalid bind options: {0}")]
    InvalidOptions(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Substrate error: {0}")]
    Substrate(#[from] SubstrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a host key-value or location substrate.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubstrateError {
    #[error("Quota exceeded writing '{key}' (limit {limit} bytes)")]
    QuotaExceeded { key: String, limit: usize },

    #[error("Substrate unavailable")]
    Unavailable,

    #[error("Substrate rejected the write: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            SyncError::Decode(e.to_string())
        } else {
            SyncError::Serialization(e.to_string())
        }
    }
}

impl From<base64::DecodeError> for SyncError {
    fn from(e: base64::DecodeError) -> Self {
        SyncError::Decode(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for SyncError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
