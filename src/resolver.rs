//! Initial-state merge across backends.

use crate::adapters::Adapters;
use crate::types::{Backend, KeySets, PriorityOrder, Snapshot, StoreName};
use std::collections::HashMap;
use tracing::trace;

/// Resolve persisted values for every declared key.
///
/// For each key, backends are tried in `order`; the first one that both
/// declares the key and holds a value for it wins, and later backends are
/// not consulted for that key. Keys no backend can supply are absent from
/// the result, leaving the initializer default in place. Each backend is
/// read at most once.
pub fn resolve(
    adapters: &Adapters,
    name: &StoreName,
    key_sets: &KeySets,
    order: &PriorityOrder,
) -> Snapshot {
    let mut readings: HashMap<Backend, Snapshot> = HashMap::new();
    let mut resolved = Snapshot::new();

    for key in key_sets.all_keys().iter() {
        for backend in order.iter() {
            let Some(keys) = key_sets.get(backend) else {
                continue;
            };
            if !keys.contains(key) {
                continue;
            }

            let reading = readings
                .entry(backend)
                .or_insert_with(|| adapters.read(backend, name, keys));

            if let Some(value) = reading.get(key) {
                trace!(name = %name, key, backend = %backend, "Resolved persisted value");
                resolved.insert(key, value.clone());
                break;
            }
        }
    }

    resolved
}
