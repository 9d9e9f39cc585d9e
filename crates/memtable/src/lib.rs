//! # Memtable
//!
//! The in-memory write buffer of the Shoal set store.
//!
//! Every `add` and `delete` lands here first. Because the store records only
//! membership (no value payloads), the memtable is a pair of **disjoint**
//! key sets:
//!
//! - `live`: keys whose most recent mutation was an insert,
//! - `removed`: keys whose most recent mutation was a delete.
//!
//! Inserting a key evicts it from `removed`, and deleting evicts it from
//! `live`, so a key is never in both sets and the last writer always wins.
//! Keys in `removed` become tombstone records when the memtable is flushed
//! to a run; they shadow older live records further down the tree.
//!
//! Both sets are `BTreeSet`s, which keeps flush and range queries on sorted
//! ground for free.
//!
//! ## Example
//! ```rust
//! use memtable::{KeyState, Memtable};
//!
//! let mut m = Memtable::new();
//! m.insert(b"hello".to_vec());
//! assert_eq!(m.state(b"hello"), Some(KeyState::Live));
//!
//! m.remove(b"hello".to_vec());
//! assert_eq!(m.state(b"hello"), Some(KeyState::Removed));
//! ```

use std::collections::BTreeSet;
use std::ops::Bound;

/// What the memtable knows about a key.
///
/// `None` from [`Memtable::state`] means the memtable has no opinion and the
/// caller must consult the on-disk runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// The key's most recent mutation in this memtable was an insert.
    Live,
    /// The key's most recent mutation in this memtable was a delete.
    Removed,
}

/// The memory component: two disjoint sorted key sets.
#[derive(Debug, Default)]
pub struct Memtable {
    live: BTreeSet<Vec<u8>>,
    removed: BTreeSet<Vec<u8>>,
}

impl Memtable {
    /// Creates an empty memtable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` as present, overriding any buffered delete.
    pub fn insert(&mut self, key: Vec<u8>) {
        self.removed.remove(&key);
        self.live.insert(key);
    }

    /// Records `key` as deleted, overriding any buffered insert.
    ///
    /// The key is kept as a pending tombstone even if this memtable never
    /// saw an insert for it: an older run below may still hold the key.
    pub fn remove(&mut self, key: Vec<u8>) {
        self.live.remove(&key);
        self.removed.insert(key);
    }

    /// Returns the buffered state of `key`, or `None` if this memtable has
    /// no entry for it.
    pub fn state(&self, key: &[u8]) -> Option<KeyState> {
        if self.live.contains(key) {
            Some(KeyState::Live)
        } else if self.removed.contains(key) {
            Some(KeyState::Removed)
        } else {
            None
        }
    }

    /// Total number of buffered entries, tombstones included.
    ///
    /// This is the figure the engine compares against its flush threshold.
    pub fn len(&self) -> usize {
        self.live.len() + self.removed.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.removed.is_empty()
    }

    /// Yields every buffered entry as a `(key, tombstone)` pair: all live
    /// keys first, then all removed keys, each group in ascending key order.
    ///
    /// Consumers that need one globally sorted sequence (flush does) sort
    /// the collected pairs themselves; the two groups are disjoint, so the
    /// result has no duplicate keys.
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], bool)> + '_ {
        self.live
            .iter()
            .map(|k| (k.as_slice(), false))
            .chain(self.removed.iter().map(|k| (k.as_slice(), true)))
    }

    /// Yields the buffered `(key, tombstone)` pairs with `lo <= key <= hi`,
    /// live keys first, each group in ascending key order.
    ///
    /// # Panics
    ///
    /// Panics if `lo > hi`; callers validate the range first.
    pub fn range<'a>(
        &'a self,
        lo: &'a [u8],
        hi: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], bool)> + 'a {
        let bounds = (Bound::Included(lo), Bound::Included(hi));
        self.live
            .range::<[u8], _>(bounds)
            .map(|k| (k.as_slice(), false))
            .chain(
                self.removed
                    .range::<[u8], _>(bounds)
                    .map(|k| (k.as_slice(), true)),
            )
    }

    /// Drops every buffered entry, reusing the allocations.
    ///
    /// The engine calls this right after a flush has materialised the
    /// current contents as a run.
    pub fn clear(&mut self) {
        self.live.clear();
        self.removed.clear();
    }
}
