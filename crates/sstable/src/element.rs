//! Record codec.
//!
//! A record in the data file is the key's bytes followed by one tombstone
//! flag byte. The key length is never stored here; it comes from the
//! record's index entry.

use std::io::Read;

use crate::format::IndexEntry;
use crate::{Error, Result};

const TOMBSTONE: u8 = 0x01;
const LIVE: u8 = 0x00;

/// One record of a run: a key and whether it marks a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub key: Vec<u8>,
    pub tombstone: bool,
}

impl Element {
    /// A live (non-tombstone) record for `key`.
    pub fn live(key: impl Into<Vec<u8>>) -> Self {
        Element { key: key.into(), tombstone: false }
    }

    /// A tombstone record for `key`.
    pub fn removed(key: impl Into<Vec<u8>>) -> Self {
        Element { key: key.into(), tombstone: true }
    }

    /// Encodes the record as `key_bytes || tombstone_byte`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.key.len() + 1);
        buf.extend_from_slice(&self.key);
        buf.push(if self.tombstone { TOMBSTONE } else { LIVE });
        buf
    }

    /// Decodes one record of `key_len` key bytes plus the flag byte.
    pub fn read_from<R: Read>(r: &mut R, key_len: usize) -> Result<Element> {
        let mut key = vec![0u8; key_len];
        r.read_exact(&mut key).map_err(Error::Read)?;
        let mut flag = [0u8; 1];
        r.read_exact(&mut flag).map_err(Error::Read)?;
        Ok(Element { key, tombstone: flag[0] == TOMBSTONE })
    }

    /// Reads the next record from a pair of sequential cursors, or `None`
    /// once the index stream is exhausted.
    ///
    /// Both readers must already be positioned at the same record; the
    /// fixed index-entry width and the `key_len + 1` record width keep them
    /// in lockstep from there.
    pub fn read_next<I: Read, D: Read>(index: &mut I, data: &mut D) -> Result<Option<Element>> {
        match IndexEntry::read_opt(index)? {
            Some(entry) => Ok(Some(Element::read_from(data, entry.key_len as usize)?)),
            None => Ok(None),
        }
    }
}
