//! Durable key-value storage backed by a JSON file.

use super::KeyValueSubstrate;
use crate::error::{Result, SubstrateError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Durable storage for native hosts.
///
/// All entries live in one JSON object on disk. Each change rewrites the
/// file through a temporary sibling and a rename, so a crash leaves either
/// the old or the new contents.
pub struct FileStorage {
    /// Path to the JSON file.
    path: PathBuf,

    /// In-memory copy of the file.
    entries: Mutex<BTreeMap<String, String>>,

    /// Byte limit for keys plus values.
    quota: Option<usize>,
}

impl FileStorage {
    /// Open storage at `path`, creating it lazily on first write.
    ///
    /// An unreadable or corrupted file is treated as empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = if path.exists() {
            let text = fs::read_to_string(&path)?;
            match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupted storage file");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), "Opened file storage");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            quota: None,
        })
    }

    /// Refuse writes once keys plus values exceed `limit` bytes.
    pub fn with_quota(mut self, limit: usize) -> Self {
        self.quota = Some(limit);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> std::result::Result<(), SubstrateError> {
        let text = serde_json::to_string(entries)
            .map_err(|e| SubstrateError::Rejected(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|e| SubstrateError::Rejected(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| SubstrateError::Rejected(e.to_string()))
    }
}

impl KeyValueSubstrate for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> std::result::Result<(), SubstrateError> {
        let mut entries = self.entries.lock();

        if let Some(limit) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > limit {
                return Err(SubstrateError::QuotaExceeded {
                    key: key.to_string(),
                    limit,
                });
            }
        }

        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}
