//! # Engine — the Shoal set store
//!
//! A log-structured merge-tree over string keys that answers one question:
//! is this key in the set? There are no value payloads; `add` records
//! presence, `delete` records absence, and lookups report whichever was
//! written last.
//!
//! ## Shape of the tree
//!
//! ```text
//!            writes                     reads
//!              │                          │
//!              ▼                          ▼
//!        ┌───────────┐    consult first, newest opinion wins
//!        │ memtable  │ ◀──────────────────┐
//!        └─────┬─────┘                    │
//!              │ flush at threshold       │
//!              ▼                          │
//!   level 0: [run] [run]  ◀── newest ─────┤  runs scanned
//!   level 1: [run]                        │  newest → oldest
//!   level 2: [run]        ◀── oldest ─────┘  per level
//! ```
//!
//! A flush turns the memtable into a level-0 run. Whenever a level fills to
//! the fan-in limit, its runs are merged (newest record winning each key)
//! into a single run on the next level, cascading as far as it needs to.
//! Tombstones travel along so that deletions keep shadowing older levels.
//!
//! The engine is single-threaded and embeddable: every operation takes
//! `&mut self`, runs to completion, and performs its file I/O inline.

mod error;
mod store;

pub use error::Error;
pub use store::{Options, SetStore};

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
