//! Engine-level errors.
//!
//! Every failure keeps its cause: an I/O fault inside a flush surfaces as
//! `FlushMemtable` → `CreateSstable` → the underlying `sstable::Error` and
//! its `io::Error`. Nothing is retried and nothing rolls back: a run whose
//! construction failed is simply never added to the level array, and its
//! partial files are left for `clear` or the embedder to sweep up.

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// A new run could not be constructed from the memtable.
    #[error("failed to create sstable run")]
    CreateSstable(#[source] sstable::Error),
    /// Flushing the memory component failed; the source carries the step
    /// that broke (run construction or the promotion that follows).
    #[error("failed to flush the memory component")]
    FlushMemtable(#[source] Box<Error>),
    /// Merging a full level into the next one failed.
    #[error("failed to merge sstable runs")]
    MergeSstables(#[source] sstable::Error),
    /// A consumed input run could not be closed and unlinked.
    #[error("failed to remove sstable run")]
    RemoveSstable(#[source] sstable::Error),
    /// A point or range lookup failed while reading a run.
    #[error("sstable search failed")]
    Search(#[source] sstable::Error),
    /// A range query was given `lo > hi`.
    #[error("invalid key range: lower bound exceeds upper bound")]
    InvalidRange,
}
