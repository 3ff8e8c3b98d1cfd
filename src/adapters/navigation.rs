//! Adapter for the address-bar query string.

use super::{QueryCache, QueryParams, WriteOutcome};
use crate::codec::Codec;
use crate::error::SubstrateError;
use crate::substrate::LocationSubstrate;
use crate::types::{Backend, HistoryMode, KeySet, PersistedPayload, Snapshot, StoreName};
use std::sync::Arc;
use tracing::{trace, warn};

/// Stores each name as its own query parameter, `name=<payload>`, with
/// `name_encoded=1` alongside when the payload is base64.
pub struct NavigationAdapter {
    location: Option<Arc<dyn LocationSubstrate>>,
    cache: Arc<QueryCache>,
}

impl NavigationAdapter {
    pub fn new(location: Option<Arc<dyn LocationSubstrate>>, cache: Arc<QueryCache>) -> Self {
        Self { location, cache }
    }

    pub fn is_available(&self) -> bool {
        self.location.is_some()
    }

    /// Drop every cached parse, forcing the next read to re-parse.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    fn current_params(&self) -> Option<Arc<QueryParams>> {
        let location = self.location.as_ref()?;
        Some(self.cache.parsed(&location.search()))
    }

    pub fn load(&self, name: &StoreName) -> Option<PersistedPayload> {
        let params = self.current_params()?;
        let raw = params.get(name.as_str())?;
        let encoded = params.contains(&name.encoded_flag_key());

        match Codec::decode(raw, encoded) {
            Ok(data) => Some(PersistedPayload {
                name: name.clone(),
                data,
                encoded,
            }),
            Err(e) => {
                warn!(name = %name, encoded, error = %e, "Ignoring undecodable query parameter");
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
    ///
    /// `prior` is compared against the plain serialization, before any
    /// binary-safe transform.
    pub fn write(
        &self,
        name: &StoreName,
        keys: &KeySet,
        state: &Snapshot,
        prior: Option<&str>,
        codec: &Codec,
        mode: HistoryMode,
    ) -> WriteOutcome {
        let serialized = match Codec::serialize(&state.project(keys)) {
            Ok(text) => text,
            Err(e) => return WriteOutcome::Failed(SubstrateError::Rejected(e.to_string())),
        };

        if prior == Some(serialized.as_str()) {
            trace!(name = %name, "Skipping unchanged query write");
            return WriteOutcome::Unchanged;
        }

        let Some(location) = self.location.as_ref() else {
            return WriteOutcome::Unavailable;
        };

        let encoded = codec.encode_text(serialized.clone(), Backend::Navigation);
        let mut params = (*self.cache.parsed(&location.search())).clone();
        params.set(name.as_str(), &encoded.payload);
        if encoded.encoded {
            params.set(&name.encoded_flag_key(), "1");
        } else {
            params.remove(&name.encoded_flag_key());
        }

        let search = params.to_query_string();
        let result = match mode {
            HistoryMode::Push => location.push(&search),
            HistoryMode::Replace => location.replace(&search),
        };

        match result {
            Ok(()) => {
                // Later reads in this tick see the new text without re-parsing
                self.cache.insert(search, params);
                WriteOutcome::Written {
                    serialized,
                    encoded: encoded.encoded,
                }
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Query string write failed");
                WriteOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncodingOptions;
    use crate::substrate::MemoryLocation;
    use serde_json::json;

    fn setup(search: &str) -> (Arc<MemoryLocation>, NavigationAdapter) {
        let location = Arc::new(MemoryLocation::with_search(search));
        let adapter = NavigationAdapter::new(Some(location.clone()), Arc::new(QueryCache::new(8)));
        (location, adapter)
    }

    fn state(value: serde_json::Value) -> Snapshot {
        Snapshot::from_value(value).unwrap()
    }

    #[test]
    fn test_write_keeps_other_parameters() {
        let (location, adapter) = setup("page=2");
        let keys = KeySet::of(["category"]);

        let outcome = adapter.write(
            &"filters".into(),
            &keys,
            &state(json!({"category": "electronics"})),
            None,
            &Codec::default(),
            HistoryMode::Replace,
        );

        assert!(outcome.is_written());
        let params = QueryParams::parse(&location.search());
        assert_eq!(params.get("page"), Some("2"));
        assert_eq!(params.get("filters"), Some(r#"{"category":"electronics"}"#));
        assert!(!params.contains("filters_encoded"));
        assert_eq!(location.replace_count(), 1);
    }

    #[test]
    fn test_history_mode() {
        let (location, adapter) = setup("");
        let keys = KeySet::of(["page"]);
        let codec = Codec::default();

        adapter.write(&"list".into(), &keys, &state(json!({"page": 1})), None, &codec, HistoryMode::Push);
        adapter.write(&"list".into(), &keys, &state(json!({"page": 2})), None, &codec, HistoryMode::Replace);

        assert_eq!(location.push_count(), 1);
        assert_eq!(location.replace_count(), 1);
        assert_eq!(location.history_len(), 2);
    }

    #[test]
    fn test_encoded_flag_set_and_cleared() {
        let (location, adapter) = setup("");
        let keys = KeySet::of(["q"]);
        let codec = Codec::new(EncodingOptions::enabled(20));
        let name: StoreName = "search".into();

        adapter.write(&name, &keys, &state(json!({"q": "x".repeat(40)})), None, &codec, HistoryMode::Replace);
        let params = QueryParams::parse(&location.search());
        assert_eq!(params.get("search_encoded"), Some("1"));
        assert_eq!(adapter.read(&name, &keys), state(json!({"q": "x".repeat(40)})));

        adapter.write(&name, &keys, &state(json!({"q": "x"})), None, &codec, HistoryMode::Replace);
        let params = QueryParams::parse(&location.search());
        assert!(!params.contains("search_encoded"));
        assert_eq!(params.get("search"), Some(r#"{"q":"x"}"#));
    }

    #[test]
    fn test_write_updates_cache_synchronously() {
        let (_location, adapter) = setup("");
        let keys = KeySet::of(["a"]);

        adapter.write(&"s".into(), &keys, &state(json!({"a": 1})), None, &Codec::default(), HistoryMode::Replace);
        let parses = adapter.cache.parse_count();

        assert_eq!(adapter.read(&"s".into(), &keys), state(json!({"a": 1})));
        assert_eq!(adapter.cache.parse_count(), parses);
    }

    #[test]
    fn test_corrupted_parameter_reads_empty() {
        let (_location, adapter) = setup("s=%7Bnope&t=abc&t_encoded=1");

        assert!(adapter.read(&"s".into(), &KeySet::of(["a"])).is_empty());
        assert!(adapter.read(&"t".into(), &KeySet::of(["a"])).is_empty());
    }

    #[test]
    fn test_unavailable_location() {
        let adapter = NavigationAdapter::new(None, Arc::new(QueryCache::new(1)));
        let outcome = adapter.write(
            &"s".into(),
            &KeySet::of(["a"]),
            &state(json!({"a": 1})),
            None,
            &Codec::default(),
            HistoryMode::Push,
        );

        assert_eq!(outcome, WriteOutcome::Unavailable);
        assert!(adapter.load(&"s".into()).is_none());
    }
}
