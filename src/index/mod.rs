//! The primary index: opaque to the executors beyond `OrderedIndex`. A real
//! deployment would plug in an external concurrent B+-tree; `BTreeMapIndex`
//! is the in-process reference implementation used by tests and by modes
//! that don't need a persistent index structure.

use crate::common::TuplePointer;
use crate::error::{Result, SpitfireError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Maps an ordered key space to the `TuplePointer` of each key's current
/// primary version. Executors never interpret the pointer; they hand it to
/// MVTO for visibility checks and to the buffer manager/heap for bytes.
pub trait OrderedIndex<K: Ord + Clone + Send + Sync>: Send + Sync {
    /// Insert `key -> ptr` iff no entry exists yet. Returns the existing
    /// pointer on failure so the caller (the insert executor) can check
    /// whether the existing row is a resurrectable tombstone.
    fn insert_if_absent(&self, key: K, ptr: TuplePointer) -> std::result::Result<(), TuplePointer>;

    fn get(&self, key: &K) -> Option<TuplePointer>;

    /// Repoint an existing key at a new version, returning the pointer it
    /// previously held (for `ctx`'s rollback closure).
    fn update(&self, key: &K, new_ptr: TuplePointer) -> Result<TuplePointer>;

    fn remove(&self, key: &K) -> Result<TuplePointer>;

    /// Ascending scan over `[start, end)`, inclusive/exclusive per `Bound`.
    fn range(&self, start: Bound<K>, end: Bound<K>) -> Vec<(K, TuplePointer)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reference index: a single `RwLock<BTreeMap>`. Adequate for the crate's
/// own tests and for configurations where the index itself isn't the
/// subject under test; production deployments swap in a real concurrent
/// B+-tree behind the same trait.
pub struct BTreeMapIndex<K: Ord + Clone> {
    tree: RwLock<BTreeMap<K, TuplePointer>>,
}

impl<K: Ord + Clone> BTreeMapIndex<K> {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord + Clone> Default for BTreeMapIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone + Send + Sync> OrderedIndex<K> for BTreeMapIndex<K> {
    fn insert_if_absent(&self, key: K, ptr: TuplePointer) -> std::result::Result<(), TuplePointer> {
        let mut tree = self.tree.write();
        match tree.get(&key) {
            Some(existing) => Err(*existing),
            None => {
                tree.insert(key, ptr);
                Ok(())
            }
        }
    }

    fn get(&self, key: &K) -> Option<TuplePointer> {
        self.tree.read().get(key).copied()
    }

    fn update(&self, key: &K, new_ptr: TuplePointer) -> Result<TuplePointer> {
        let mut tree = self.tree.write();
        match tree.insert(key.clone(), new_ptr) {
            Some(previous) => Ok(previous),
            None => Err(SpitfireError::KeyNotFound),
        }
    }

    fn remove(&self, key: &K) -> Result<TuplePointer> {
        self.tree.write().remove(key).ok_or(SpitfireError::KeyNotFound)
    }

    fn range(&self, start: Bound<K>, end: Bound<K>) -> Vec<(K, TuplePointer)> {
        self.tree
            .read()
            .range((start, end))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    fn len(&self) -> usize {
        self.tree.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_if_absent_rejects_duplicate_key() {
        let index = BTreeMapIndex::new();
        index.insert_if_absent(1, TuplePointer::new(1, 0)).unwrap();
        let err = index.insert_if_absent(1, TuplePointer::new(2, 0)).unwrap_err();
        assert_eq!(err, TuplePointer::new(1, 0));
    }

    #[test]
    fn update_returns_previous_pointer() {
        let index = BTreeMapIndex::new();
        index.insert_if_absent(1, TuplePointer::new(1, 0)).unwrap();
        let previous = index.update(&1, TuplePointer::new(2, 0)).unwrap();
        assert_eq!(previous, TuplePointer::new(1, 0));
        assert_eq!(index.get(&1), Some(TuplePointer::new(2, 0)));
    }

    #[test]
    fn range_scan_is_ascending() {
        let index = BTreeMapIndex::new();
        for k in [3, 1, 2] {
            index.insert_if_absent(k, TuplePointer::new(k as u64, 0)).unwrap();
        }
        let scanned: Vec<_> = index
            .range(Bound::Unbounded, Bound::Unbounded)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(scanned, vec![1, 2, 3]);
    }

    #[test]
    fn remove_missing_key_errors() {
        let index: BTreeMapIndex<i32> = BTreeMapIndex::new();
        assert!(index.remove(&1).is_err());
    }
}
