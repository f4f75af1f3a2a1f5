//! The nursery: CascadeKV's in-memory sorted write buffer.
//!
//! All writes land here first. When the buffer reaches its record bound the
//! engine streams it, in key order, into a new level-0 file. Deletions are
//! buffered as tombstones (`None` values) so they can shadow older values in
//! deeper levels until a merge retires them.
//!
//! Recency is positional: the nursery has no per-entry versioning, a later
//! write to the same key simply replaces the earlier entry.

use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug)]
pub struct Nursery {
    map: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Nursery {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Buffers a key-value pair, replacing any existing entry for the key.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.map.insert(key, Some(value));
    }

    /// Buffers a tombstone for the key, replacing any existing entry.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.map.insert(key, None);
    }

    /// Looks up a key in the buffer.
    ///
    /// Returns `Some(Some(v))` for a live value, `Some(None)` for a buffered
    /// tombstone (the key is deleted — deeper levels must not be consulted),
    /// and `None` when the buffer holds nothing for this key.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Option<Vec<u8>>> {
        self.map.get(key)
    }

    /// Ordered iterator over all buffered entries, tombstones included.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> {
        self.map.iter()
    }

    /// Copies the entries whose keys fall within the given bounds.
    ///
    /// Range folds call this once at subscription time; the copy is what
    /// gives a fold its snapshot, bounded by the nursery's record cap.
    #[must_use]
    pub fn range_snapshot(
        &self,
        from: Bound<&[u8]>,
        to: Bound<&[u8]>,
    ) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.map
            .range::<[u8], _>((from, to))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl Default for Nursery {
    fn default() -> Self {
        Self::new()
    }
}
