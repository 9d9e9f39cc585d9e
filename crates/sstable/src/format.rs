//! Index-entry codec.
//!
//! The index file is a bare concatenation of fixed-width entries:
//!
//! ```text
//! [offset: i64 LE][key_len: i64 LE]   (16 bytes, entry i at byte 16 * i)
//! ```
//!
//! `offset` is the byte position of the record in the data file; `key_len`
//! is the record's key length, which is one byte less than the full record
//! width (the trailing tombstone flag is not counted).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::{Error, Result};

/// Width of one index entry on disk.
pub const INDEX_ENTRY_BYTES: u64 = 16;

/// Positional metadata for one record: where it starts in the data file and
/// how long its key is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: i64,
    pub key_len: i64,
}

impl IndexEntry {
    /// Writes the entry as two little-endian `i64`s.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_i64::<LittleEndian>(self.offset).map_err(Error::Write)?;
        w.write_i64::<LittleEndian>(self.key_len).map_err(Error::Write)?;
        Ok(())
    }

    /// Reads one entry, or `None` if the reader is already at end of file.
    ///
    /// End of input at an entry boundary terminates sequential scans and is
    /// not an error.
    pub fn read_opt<R: Read>(r: &mut R) -> Result<Option<IndexEntry>> {
        let offset = match r.read_i64::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Error::Read(e)),
        };
        let key_len = r.read_i64::<LittleEndian>().map_err(Error::Read)?;
        Ok(Some(IndexEntry { offset, key_len }))
    }

    /// Reads one entry that must exist; end of file is a read fault here.
    pub fn read_from<R: Read>(r: &mut R) -> Result<IndexEntry> {
        match Self::read_opt(r)? {
            Some(entry) => Ok(entry),
            None => Err(Error::Read(io::Error::from(io::ErrorKind::UnexpectedEof))),
        }
    }
}
