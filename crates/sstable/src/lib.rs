//! # SSTable — sorted on-disk runs
//!
//! Immutable, on-disk storage for the Shoal set store.
//!
//! When the memtable reaches its flush threshold, its contents become a
//! **run**: a pair of files holding the records and a positional index over
//! them. Runs are write-once: after construction they are only read, and
//! eventually consumed by a merge that replaces them with one run on the
//! next level.
//!
//! ## File layout
//!
//! Each run owns two files sharing one basename (the run's integer tag):
//!
//! ```text
//! index file                        data file
//! ┌──────────────────────────┐      ┌─────────────────────────────┐
//! │ offset  (i64 LE)         │ ───▶ │ key bytes (key_len bytes)   │
//! │ key_len (i64 LE)         │      │ tombstone (u8: 0x00 | 0x01) │
//! ├──────────────────────────┤      ├─────────────────────────────┤
//! │ ... one 16-byte entry    │      │ ... one record per entry,   │
//! │     per record ...       │      │     ascending key order ... │
//! └──────────────────────────┘      └─────────────────────────────┘
//! ```
//!
//! The i-th index entry lives at byte `16 * i`, so any record can be reached
//! with two seeks: one into the index, one into the data file. Records store
//! no length of their own; the index entry is the only thing that knows
//! where a key ends. There is no header, footer, or checksum; element count
//! and filter exist only in memory, for the lifetime of the process.
//!
//! ## Reading discipline
//!
//! Point probes use absolute seeks on both files. Sequential scans (range
//! queries and merges) seek once, then wrap both files in fresh buffered
//! readers that advance in lockstep: a record is always `key_len + 1`
//! bytes wide, which is exactly what its index entry says.

mod element;
mod format;
mod merge;
mod run;

pub use element::Element;
pub use format::{IndexEntry, INDEX_ENTRY_BYTES};
pub use run::{Run, SearchResult};

use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

/// Faults surfaced by run construction and search.
///
/// Every variant carries its I/O cause; nothing is retried or swallowed. A
/// failed construction leaves whatever it had written on disk; the caller
/// decides whether to clean up.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A run file could not be created.
    #[error("failed to create run file {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// An absolute seek on an index or data file failed.
    #[error("file seek failed")]
    Seek(#[source] io::Error),
    /// Reading an index entry or record failed, including a file that ended
    /// in the middle of one.
    #[error("failed to read from run file")]
    Read(#[source] io::Error),
    /// Writing an index entry or record failed.
    #[error("failed to write to run file")]
    Write(#[source] io::Error),
    /// A run's files could not be unlinked.
    #[error("failed to remove run file {path}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A merge was asked to combine zero runs.
    #[error("merge requires at least one input run")]
    EmptyMerge,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
