//! Query string parsing with a shared parse cache.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::form_urlencoded;

/// Decoded query parameters, in their original order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse raw query text (a leading `?` is ignored).
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        Self {
            pairs: form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Set `key`, keeping its position if it already exists.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                self.pairs[idx].1 = value.to_string();
                // Drop later duplicates of the key
                let mut seen = false;
                self.pairs.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Percent-encoded query text, without a leading `?`.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// Parsed query strings keyed by their raw text.
///
/// Many bindings read the same address; each distinct raw text is parsed
/// once. A changed address is a different key, so stale entries are never
/// returned.
pub struct QueryCache {
    entries: Mutex<LruCache<String, Arc<QueryParams>>>,
    parses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            parses: AtomicU64::new(0),
        }
    }

    /// Parsed form of `raw`, parsing only on a cache miss.
    pub fn parsed(&self, raw: &str) -> Arc<QueryParams> {
        let mut entries = self.entries.lock();
        if let Some(params) = entries.get(raw) {
            return Arc::clone(params);
        }

        self.parses.fetch_add(1, Ordering::Relaxed);
        let params = Arc::new(QueryParams::parse(raw));
        entries.put(raw.to_string(), Arc::clone(&params));
        params
    }

    /// Record the parsed form of text this process just wrote.
    pub fn insert(&self, raw: String, params: QueryParams) {
        self.entries.lock().put(raw, Arc::new(params));
    }

    pub fn invalidate(&self) {
        self.entries.lock().clear();
    }

    /// Number of parses performed (cache misses).
    pub fn parse_count(&self) -> u64 {
        self.parses.load(Ordering::Relaxed)
    }
}
