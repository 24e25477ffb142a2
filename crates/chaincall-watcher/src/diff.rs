//! Change detection between two stores of transformed values.

use chaincall_core::{ArgumentKeyMap, Value};
use indexmap::IndexMap;

use crate::events::Update;

/// Updates for every key of `next` whose value differs from `prev`.
///
/// Comparison is structural on the transformed values. A key missing from
/// `prev` counts as changed; with `everything` set, every key does.
pub fn diff(
    prev: &IndexMap<String, Value>,
    next: &IndexMap<String, Value>,
    key_to_args: &ArgumentKeyMap,
    everything: bool,
) -> Vec<Update> {
    next.iter()
        .filter(|(key, value)| everything || prev.get(key.as_str()) != Some(*value))
        .map(|(key, value)| update(key, value, key_to_args))
        .collect()
}

/// Every key of `store`, as if it had just changed.
pub fn replay(store: &IndexMap<String, Value>, key_to_args: &ArgumentKeyMap) -> Vec<Update> {
    store
        .iter()
        .map(|(key, value)| update(key, value, key_to_args))
        .collect()
}

fn update(key: &str, value: &Value, key_to_args: &ArgumentKeyMap) -> Update {
    Update {
        key: key.to_string(),
        value: value.clone(),
        args: key_to_args.get(key).cloned().unwrap_or_default(),
    }
}
