//! Content-addressed calldata cache.
//!
//! A watcher re-sends the same call set on every poll. Compiling and
//! encoding it once per distinct `(call set, require_success, default
//! target)` saves re-hashing selectors and re-encoding arguments each cycle.
//! The cache is bounded and evicts in insertion order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use alloy_primitives::Address;
use indexmap::IndexMap;

use crate::compiler::CompiledCall;
use crate::types::{CallDescriptor, Value};

/// Entries kept per cache by default.
pub const DEFAULT_CAPACITY: usize = 64;

/// Structural identity of a call set. Transforms are not part of it, they
/// never influence what goes on the wire.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct CallSetKey {
    require_success: bool,
    default_target: Address,
    calls: Vec<(Option<Address>, String, Vec<Value>, Vec<String>)>,
}

impl CallSetKey {
    pub fn new(calls: &[CallDescriptor], require_success: bool, default_target: Address) -> Self {
        Self {
            require_success,
            default_target,
            calls: calls
                .iter()
                .map(|c| {
                    (
                        c.target,
                        c.method.clone(),
                        c.args.clone(),
                        c.returns.iter().map(|r| r.key.clone()).collect(),
                    )
                })
                .collect(),
        }
    }

    fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// A compiled call set and its packed aggregate calldata.
#[derive(Debug)]
pub struct CompiledSet {
    pub calls: Vec<CompiledCall>,
    pub calldata: Vec<u8>,
}

struct Entry {
    key: CallSetKey,
    set: Arc<CompiledSet>,
}

/// Bounded FIFO map from call-set digest to compiled output.
pub struct CalldataCache {
    capacity: usize,
    entries: IndexMap<u64, Entry>,
}

impl CalldataCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
        }
    }

    pub fn get(&self, key: &CallSetKey) -> Option<Arc<CompiledSet>> {
        self.entries
            .get(&key.digest())
            .filter(|e| &e.key == key)
            .map(|e| e.set.clone())
    }

    pub fn insert(&mut self, key: CallSetKey, set: Arc<CompiledSet>) {
        let digest = key.digest();
        if !self.entries.contains_key(&digest) && self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(digest, Entry { key, set });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for CalldataCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> Arc<CompiledSet> {
        Arc::new(CompiledSet {
            calls: vec![],
            calldata: vec![1, 2, 3],
        })
    }

    fn key(n: u64, require_success: bool) -> CallSetKey {
        let calls = vec![CallDescriptor::new("f(uint256)(uint256)").arg(n).returns("X")];
        CallSetKey::new(&calls, require_success, Address::ZERO)
    }

    #[test]
    fn hit_requires_structural_equality() {
        let mut cache = CalldataCache::new(4);
        cache.insert(key(1, false), set());
        assert!(cache.get(&key(1, false)).is_some());
        assert!(cache.get(&key(2, false)).is_none());
        assert!(cache.get(&key(1, true)).is_none());
    }

    #[test]
    fn transforms_do_not_affect_the_key() {
        let plain = vec![CallDescriptor::new("g()(uint256)").returns("G")];
        let transformed =
            vec![CallDescriptor::new("g()(uint256)").returns_with("G", |v| v.clone())];
        assert_eq!(
            CallSetKey::new(&plain, false, Address::ZERO),
            CallSetKey::new(&transformed, false, Address::ZERO)
        );
    }

    #[test]
    fn evicts_oldest_entry_when_full() {
        let mut cache = CalldataCache::new(2);
        cache.insert(key(1, false), set());
        cache.insert(key(2, false), set());
        cache.insert(key(3, false), set());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1, false)).is_none());
        assert!(cache.get(&key(3, false)).is_some());
    }
}
