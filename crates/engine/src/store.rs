//! The level array and the public store operations.

use std::path::PathBuf;

use memtable::{KeyState, Memtable};
use sstable::{Element, Run, SearchResult};

use crate::{Error, Result};

/// Tunables for a [`SetStore`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Memtable flush threshold, in buffered records (tombstones count).
    pub first_level_size: usize,
    /// Fan-in per level: a level holding this many runs is merged into one
    /// run on the next level.
    pub max_level_size: usize,
    /// Bit width of each run's membership filter.
    pub filter_bits: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            first_level_size: 4096,
            max_level_size: 4,
            filter_bits: 500_000,
        }
    }
}

/// An LSM-tree set store over byte-string keys.
///
/// Mutations are absorbed by the memtable and spill to disk as immutable
/// sorted runs; levels of runs are compacted by k-way merge as they fill.
/// The store is strictly single-threaded: operations seek the runs' open
/// file handles, so `&mut self` throughout.
pub struct SetStore {
    memtable: Memtable,
    /// `levels[0]` is the newest level; within a level, runs are ordered
    /// oldest first.
    levels: Vec<Vec<Run>>,
    /// Tag for the next run's files; increments once per created run and
    /// never resets, so file names are unique for the store's lifetime.
    next_tag: u64,
    index_dir: PathBuf,
    data_dir: PathBuf,
    options: Options,
}

impl SetStore {
    /// Creates a store rooted at `root`.
    ///
    /// Run files live under `<root>/index` and `<root>/data`; the
    /// directories are created when the first run is written.
    pub fn new(root: impl Into<PathBuf>, options: Options) -> Self {
        let root = root.into();
        Self {
            memtable: Memtable::new(),
            levels: vec![Vec::new()],
            next_tag: 0,
            index_dir: root.join("index"),
            data_dir: root.join("data"),
            options,
        }
    }

    /// Records `key` as a member of the set.
    pub fn add(&mut self, key: Vec<u8>) -> Result<()> {
        self.memtable.insert(key);
        self.maybe_flush()
    }

    /// Records `key` as deleted.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.memtable.remove(key);
        self.maybe_flush()
    }

    /// Returns whether `key` is currently a member of the set.
    ///
    /// The memtable answers first; otherwise each level is consulted in
    /// ascending order, runs newest-first within a level, and the first
    /// live record or tombstone decides.
    pub fn search_key(&mut self, key: &[u8]) -> Result<bool> {
        match self.memtable.state(key) {
            Some(KeyState::Live) => return Ok(true),
            Some(KeyState::Removed) => return Ok(false),
            None => {}
        }

        for level in &mut self.levels {
            for run in level.iter_mut().rev() {
                match run.search_key(key).map_err(Error::Search)? {
                    SearchResult::Found => return Ok(true),
                    SearchResult::Removed => return Ok(false),
                    SearchResult::NotFound => {}
                }
            }
        }

        Ok(false)
    }

    /// Returns every member key in `[lo, hi]`, ascending, without
    /// duplicates.
    ///
    /// Candidate records are gathered newest-source-first (memtable, then
    /// levels top-down, runs newest-first), stably sorted by key, and
    /// reduced: the first record seen for a key is its newest, and it
    /// survives only if it is not a tombstone.
    pub fn search_range(&mut self, lo: &[u8], hi: &[u8]) -> Result<Vec<Vec<u8>>> {
        if lo > hi {
            return Err(Error::InvalidRange);
        }

        let mut elements: Vec<Element> = self
            .memtable
            .range(lo, hi)
            .map(|(key, tombstone)| Element { key: key.to_vec(), tombstone })
            .collect();

        for level in &mut self.levels {
            for run in level.iter_mut().rev() {
                elements.extend(run.search_range(lo, hi).map_err(Error::Search)?);
            }
        }

        elements.sort_by(|a, b| a.key.cmp(&b.key));

        let mut result = Vec::new();
        for (i, element) in elements.iter().enumerate() {
            if !element.tombstone && (i == 0 || elements[i - 1].key != element.key) {
                result.push(element.key.clone());
            }
        }

        Ok(result)
    }

    /// Removes every run in every level, best-effort, and resets the level
    /// array. Unlink failures on individual runs are ignored.
    pub fn clear(&mut self) {
        for level in self.levels.drain(..) {
            for run in level {
                let _ = run.remove();
            }
        }
        self.levels.push(Vec::new());
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.memtable.len() == self.options.first_level_size {
            self.flush_memtable()
                .map_err(|e| Error::FlushMemtable(Box::new(e)))?;
        }
        Ok(())
    }

    /// Materialises the memtable as a new level-0 run, resets it, and runs
    /// the promotion cascade.
    fn flush_memtable(&mut self) -> Result<()> {
        let (index_path, data_path) = self.run_paths(self.next_tag);
        let run = Run::from_memtable(index_path, data_path, &self.memtable, self.options.filter_bits)
            .map_err(Error::CreateSstable)?;
        self.levels[0].push(run);
        self.next_tag += 1;
        self.memtable.clear();
        self.promote_levels()
    }

    /// Walks the levels from the top, merging any level that has filled to
    /// the fan-in limit into a single run on the next level.
    ///
    /// The walk deliberately continues into levels it has just fed, so one
    /// flush can cascade through several merges; no level is left holding
    /// `max_level_size` runs when this returns.
    fn promote_levels(&mut self) -> Result<()> {
        let mut level = 0;
        while level < self.levels.len() {
            if self.levels[level].len() == self.options.max_level_size {
                let (index_path, data_path) = self.run_paths(self.next_tag);
                let filter_bits = self.options.filter_bits;
                let merged =
                    Run::from_merge(index_path, data_path, &mut self.levels[level], filter_bits)
                        .map_err(Error::MergeSstables)?;
                self.next_tag += 1;

                for run in self.levels[level].drain(..) {
                    run.remove().map_err(Error::RemoveSstable)?;
                }

                if self.levels.len() == level + 1 {
                    self.levels.push(Vec::new());
                }
                self.levels[level + 1].push(merged);
            }
            level += 1;
        }
        Ok(())
    }

    fn run_paths(&self, tag: u64) -> (PathBuf, PathBuf) {
        (
            self.index_dir.join(tag.to_string()),
            self.data_dir.join(tag.to_string()),
        )
    }
}
