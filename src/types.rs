//! Core types for the synchronization engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One of the three persistence substrates a store can be projected onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Address-bar query string.
    Navigation,
    /// Per-origin storage that survives restarts.
    Durable,
    /// Storage cleared when the session ends.
    Session,
}

impl Backend {
    /// All backends, in declaration order.
    pub const ALL: [Backend; 3] = [Backend::Navigation, Backend::Durable, Backend::Session];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Navigation => "navigation",
            Backend::Durable => "durable",
            Backend::Session => "session",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier a store is persisted under. Unique only within one backend.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreName(pub String);

impl StoreName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the sibling query parameter flagging a binary-safe payload.
    pub fn encoded_flag_key(&self) -> String {
        format!("{}_encoded", self.0)
    }
}

impl fmt::Debug for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreName({})", self.0)
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreName {
    fn from(s: &str) -> Self {
        StoreName(s.to_string())
    }
}

impl From<String> for StoreName {
    fn from(s: String) -> Self {
        StoreName(s)
    }
}

/// Set of state fields a backend is responsible for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet(BTreeSet<String>);

impl KeySet {
    /// Build a key set from any list of field names.
    pub fn of<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        KeySet(keys.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Keys present in both sets.
    pub fn intersection(&self, other: &KeySet) -> KeySet {
        KeySet(self.0.intersection(&other.0).cloned().collect())
    }
}

impl<K: Into<String>> FromIterator<K> for KeySet {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        KeySet::of(iter)
    }
}

/// Per-backend key declarations for one binding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeySets {
    pub navigation_keys: Option<KeySet>,
    pub durable_keys: Option<KeySet>,
    pub session_keys: Option<KeySet>,
}

impl KeySets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigation<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.navigation_keys = Some(KeySet::of(keys));
        self
    }

    pub fn durable<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.durable_keys = Some(KeySet::of(keys));
        self
    }

    pub fn session<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.session_keys = Some(KeySet::of(keys));
        self
    }

    /// Keys declared for a backend. An empty declaration counts as none.
    pub fn get(&self, backend: Backend) -> Option<&KeySet> {
        let keys = match backend {
            Backend::Navigation => self.navigation_keys.as_ref(),
            Backend::Durable => self.durable_keys.as_ref(),
            Backend::Session => self.session_keys.as_ref(),
        };
        keys.filter(|k| !k.is_empty())
    }

    /// Backends that declare at least one key, with their key sets.
    pub fn declared(&self) -> impl Iterator<Item = (Backend, &KeySet)> {
        Backend::ALL
            .into_iter()
            .filter_map(move |b| self.get(b).map(|keys| (b, keys)))
    }

    pub fn declares(&self, backend: Backend, key: &str) -> bool {
        self.get(backend).is_some_and(|k| k.contains(key))
    }

    /// Union of all declared keys.
    pub fn all_keys(&self) -> KeySet {
        self.declared()
            .flat_map(|(_, keys)| keys.iter().map(str::to_string))
            .collect()
    }
}

/// Field name to value mapping. Absent fields are "undefined"; `null` is a value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a JSON object. Returns `None` for other JSON values.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Restrict to the given keys, dropping keys that are absent.
    pub fn project(&self, keys: &KeySet) -> Snapshot {
        keys.iter()
            .filter_map(|k| self.0.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }

    /// Overwrite fields with those in `partial`.
    pub fn merge(&mut self, partial: Snapshot) {
        self.0.extend(partial.0);
    }
}

impl FromIterator<(String, Value)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Snapshot(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for Snapshot {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Snapshot(map)
    }
}

/// Unit written to or read from a backend substrate.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedPayload {
    pub name: StoreName,
    pub data: Snapshot,
    /// Only set by the navigation backend when the binary-safe transform was applied.
    pub encoded: bool,
}

/// Read precedence across backends. Writes ignore it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Backend>", into = "Vec<Backend>")]
pub struct PriorityOrder(Vec<Backend>);

impl PriorityOrder {
    /// Build an order, rejecting repeated backends.
    pub fn new(order: Vec<Backend>) -> Result<Self, String> {
        let mut seen = BTreeSet::new();
        for backend in &order {
            if !seen.insert(*backend) {
                return Err(format!("backend '{}' listed more than once", backend));
            }
        }
        Ok(PriorityOrder(order))
    }

    pub fn iter(&self) -> impl Iterator<Item = Backend> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.0.contains(&backend)
    }
}

impl Default for PriorityOrder {
    fn default() -> Self {
        PriorityOrder(vec![Backend::Navigation, Backend::Session, Backend::Durable])
    }
}

impl TryFrom<Vec<Backend>> for PriorityOrder {
    type Error = String;

    fn try_from(order: Vec<Backend>) -> Result<Self, Self::Error> {
        PriorityOrder::new(order)
    }
}

impl From<PriorityOrder> for Vec<Backend> {
    fn from(order: PriorityOrder) -> Self {
        order.0
    }
}

/// How a navigation write affects back/forward history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryMode {
    /// Record a new navigable entry.
    Push,
    /// Overwrite the current entry.
    Replace,
}

impl HistoryMode {
    pub fn from_significance(significant: bool) -> Self {
        if significant {
            HistoryMode::Push
        } else {
            HistoryMode::Replace
        }
    }
}
