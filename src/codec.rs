//! Snapshot serialization with size-triggered binary-safe encoding.
//!
//! Snapshots serialize to JSON text with keys in sorted order, so two
//! snapshots holding the same fields always produce identical text. The
//! navigation backend may additionally base64 the text once it grows past
//! the configured threshold; the caller records that with a sibling flag.

use crate::config::EncodingOptions;
use crate::error::{Result, SyncError};
use crate::types::{Backend, Snapshot};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

/// Output of [`Codec::encode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    /// Text to hand to the substrate.
    pub payload: String,
    /// True if the binary-safe transform was applied.
    pub encoded: bool,
}

/// Serializes snapshots for one binding.
#[derive(Clone, Debug, Default)]
pub struct Codec {
    encoding: EncodingOptions,
}

impl Codec {
    pub fn new(encoding: EncodingOptions) -> Self {
        Self { encoding }
    }

    /// Plain JSON text for a snapshot. This is the form change detection compares.
    pub fn serialize(snapshot: &Snapshot) -> Result<String> {
        serde_json::to_string(snapshot).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    /// Serialize for a backend, encoding navigation payloads past the threshold.
    pub fn encode(&self, snapshot: &Snapshot, backend: Backend) -> Result<Encoded> {
        let text = Self::serialize(snapshot)?;
        Ok(self.encode_text(text, backend))
    }

    /// Apply the transform decision to already serialized text.
    pub fn encode_text(&self, text: String, backend: Backend) -> Encoded {
        if backend == Backend::Navigation
            && self.encoding.enabled
            && text_len(&text) > self.encoding.threshold
        {
            Encoded {
                payload: STANDARD.encode(text.as_bytes()),
                encoded: true,
            }
        } else {
            Encoded {
                payload: text,
                encoded: false,
            }
        }
    }

    /// Parse substrate text back into a snapshot.
    pub fn decode(raw: &str, encoded: bool) -> Result<Snapshot> {
        let text = if encoded {
            String::from_utf8(STANDARD.decode(raw.as_bytes())?)?
        } else {
            raw.to_string()
        };

        let value: serde_json::Value = serde_json::from_str(&text)?;
        Snapshot::from_value(value)
            .ok_or_else(|| SyncError::Decode("payload is not a JSON object".to_string()))
    }

    /// Fail-soft decode: corrupted payloads contribute nothing.
    pub fn decode_or_empty(raw: &str, encoded: bool) -> Snapshot {
        match Self::decode(raw, encoded) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, encoded, "Discarding undecodable persisted payload");
                Snapshot::new()
            }
        }
    }
}

/// Length in UTF-16 code units, the unit the address bar measures in.
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}
