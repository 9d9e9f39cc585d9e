//! Sorted runs: construction, search, and removal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use filter::BloomFilter;
use memtable::Memtable;

use crate::element::Element;
use crate::format::{IndexEntry, INDEX_ENTRY_BYTES};
use crate::merge::MergeEntry;
use crate::{Error, Result};

/// Outcome of a point probe against a single run.
///
/// `Removed` is decisive: the run's tombstone shadows anything older, so the
/// caller must stop descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found,
    Removed,
    NotFound,
}

/// An immutable sorted run: two open files, the record count, and the
/// membership filter.
///
/// Keys within a run are strictly increasing (a merge emits each key once
/// and a flush writes disjoint sets), so binary search over record indices
/// is exact. Both file handles stay open for the life of the run; searches
/// seek them, which is why every query takes `&mut self`.
pub struct Run {
    index_file: File,
    data_file: File,
    index_path: PathBuf,
    data_path: PathBuf,
    len: usize,
    filter: BloomFilter,
}

impl Run {
    /// Materialises a memtable as a new run.
    ///
    /// Live keys become plain records, removed keys become tombstones; the
    /// combined sequence is sorted and streamed out through buffered
    /// writers while every key is added to the filter.
    pub fn from_memtable(
        index_path: impl Into<PathBuf>,
        data_path: impl Into<PathBuf>,
        mem: &Memtable,
        filter_bits: usize,
    ) -> Result<Run> {
        let index_path = index_path.into();
        let data_path = data_path.into();

        let mut elements: Vec<Element> = mem
            .entries()
            .map(|(key, tombstone)| Element { key: key.to_vec(), tombstone })
            .collect();
        // The live and removed sets are disjoint, so keys are unique and an
        // unstable sort cannot reorder duplicates.
        elements.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        let mut index_file = create_file(&index_path)?;
        let mut data_file = create_file(&data_path)?;
        let mut filter = BloomFilter::new(mem.len(), filter_bits);
        let mut offset = 0i64;

        {
            let mut index_w = BufWriter::new(&mut index_file);
            let mut data_w = BufWriter::new(&mut data_file);
            for element in &elements {
                write_element(&mut index_w, &mut data_w, element, &mut offset, &mut filter)?;
            }
            index_w.flush().map_err(Error::Write)?;
            data_w.flush().map_err(Error::Write)?;
        }

        Ok(Run {
            index_file,
            data_file,
            index_path,
            data_path,
            len: elements.len(),
            filter,
        })
    }

    /// Builds a new run by k-way merging `inputs`, which must be ordered
    /// oldest first.
    ///
    /// Each input's position in the slice is its recency rank; on duplicate
    /// keys the heap surfaces the newest record first and the older copies
    /// are discarded. Tombstones are carried through verbatim; a level
    /// further down may still hold the key they shadow.
    pub fn from_merge(
        index_path: impl Into<PathBuf>,
        data_path: impl Into<PathBuf>,
        inputs: &mut [Run],
        filter_bits: usize,
    ) -> Result<Run> {
        if inputs.is_empty() {
            return Err(Error::EmptyMerge);
        }

        let index_path = index_path.into();
        let data_path = data_path.into();

        let expected: usize = inputs.iter().map(|run| run.len).sum();
        let mut filter = BloomFilter::new(expected, filter_bits);

        // Rewind every input, then hand it to a fresh pair of buffered
        // readers; the raw handles must not be touched again until the
        // readers are dropped.
        let mut readers = Vec::with_capacity(inputs.len());
        for run in inputs.iter_mut() {
            run.index_file.seek(SeekFrom::Start(0)).map_err(Error::Seek)?;
            run.data_file.seek(SeekFrom::Start(0)).map_err(Error::Seek)?;
            let Run { index_file, data_file, .. } = run;
            readers.push((BufReader::new(index_file), BufReader::new(data_file)));
        }

        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (source, (index_r, data_r)) in readers.iter_mut().enumerate() {
            if let Some(element) = Element::read_next(index_r, data_r)? {
                heap.push(MergeEntry { element, source });
            }
        }

        let mut index_file = create_file(&index_path)?;
        let mut data_file = create_file(&data_path)?;
        let mut offset = 0i64;
        let mut len = 0usize;

        {
            let mut index_w = BufWriter::new(&mut index_file);
            let mut data_w = BufWriter::new(&mut data_file);
            let mut last_written: Option<Vec<u8>> = None;

            while let Some(MergeEntry { element, source }) = heap.pop() {
                if last_written.as_deref() != Some(element.key.as_slice()) {
                    write_element(&mut index_w, &mut data_w, &element, &mut offset, &mut filter)?;
                    len += 1;
                }

                let (index_r, data_r) = &mut readers[source];
                if let Some(next) = Element::read_next(index_r, data_r)? {
                    heap.push(MergeEntry { element: next, source });
                }

                last_written = Some(element.key);
            }

            index_w.flush().map_err(Error::Write)?;
            data_w.flush().map_err(Error::Write)?;
        }

        Ok(Run {
            index_file,
            data_file,
            index_path,
            data_path,
            len,
            filter,
        })
    }

    /// Probes the run for `key`.
    ///
    /// The filter rejects most keys the run has never seen without touching
    /// disk; otherwise a binary search reads one record per midpoint.
    pub fn search_key(&mut self, key: &[u8]) -> Result<SearchResult> {
        if !self.filter.contains(key) {
            return Ok(SearchResult::NotFound);
        }

        let (mut left, mut right) = (-1i64, self.len as i64);
        while right - left > 1 {
            let mid = (left + right) / 2;
            let probe = self.read_at(mid)?;
            match probe.key.as_slice().cmp(key) {
                Ordering::Equal => {
                    return Ok(if probe.tombstone {
                        SearchResult::Removed
                    } else {
                        SearchResult::Found
                    });
                }
                Ordering::Less => left = mid,
                Ordering::Greater => right = mid,
            }
        }

        Ok(SearchResult::NotFound)
    }

    /// Returns every record with `lo <= key <= hi`, tombstones included, in
    /// ascending key order.
    ///
    /// Two binary searches bound the scan: the first finds the smallest
    /// index with `key >= lo`, the second the largest with `key <= hi`.
    /// The records between them are then streamed through fresh buffered
    /// readers.
    pub fn search_range(&mut self, lo: &[u8], hi: &[u8]) -> Result<Vec<Element>> {
        // Smallest index whose key is >= lo.
        let (mut left, mut right) = (-1i64, self.len as i64);
        while right - left > 1 {
            let mid = (left + right) / 2;
            if self.read_at(mid)?.key.as_slice() < lo {
                left = mid;
            } else {
                right = mid;
            }
        }
        let start = right;

        // Largest index whose key is <= hi.
        let (mut left, mut right) = (-1i64, self.len as i64);
        while right - left > 1 {
            let mid = (left + right) / 2;
            if self.read_at(mid)?.key.as_slice() <= hi {
                left = mid;
            } else {
                right = mid;
            }
        }
        let end = left;

        if start > end {
            return Ok(Vec::new());
        }

        // Position both cursors on the first record of the scan, then
        // switch to buffered sequential reads.
        self.index_file
            .seek(SeekFrom::Start(start as u64 * INDEX_ENTRY_BYTES))
            .map_err(Error::Seek)?;
        let first = IndexEntry::read_from(&mut self.index_file)?;
        self.data_file
            .seek(SeekFrom::Start(first.offset as u64))
            .map_err(Error::Seek)?;
        self.index_file
            .seek(SeekFrom::Start(start as u64 * INDEX_ENTRY_BYTES))
            .map_err(Error::Seek)?;

        let mut index_r = BufReader::new(&mut self.index_file);
        let mut data_r = BufReader::new(&mut self.data_file);

        let mut result = Vec::with_capacity((end - start + 1) as usize);
        for _ in start..=end {
            match Element::read_next(&mut index_r, &mut data_r)? {
                Some(element) => result.push(element),
                None => {
                    return Err(Error::Read(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "index file ended inside a bounded scan",
                    )))
                }
            }
        }

        Ok(result)
    }

    /// Number of records in the run.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the run holds no records.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Closes the run and unlinks both of its files.
    pub fn remove(self) -> Result<()> {
        let Run { index_file, data_file, index_path, data_path, .. } = self;
        drop(index_file);
        drop(data_file);
        fs::remove_file(&index_path)
            .map_err(|source| Error::Remove { path: index_path.clone(), source })?;
        fs::remove_file(&data_path)
            .map_err(|source| Error::Remove { path: data_path, source })?;
        Ok(())
    }

    /// Reads the record at position `index` with two absolute seeks.
    fn read_at(&mut self, index: i64) -> Result<Element> {
        self.index_file
            .seek(SeekFrom::Start(index as u64 * INDEX_ENTRY_BYTES))
            .map_err(Error::Seek)?;
        let entry = IndexEntry::read_from(&mut self.index_file)?;
        self.data_file
            .seek(SeekFrom::Start(entry.offset as u64))
            .map_err(Error::Seek)?;
        Element::read_from(&mut self.data_file, entry.key_len as usize)
    }
}

/// Appends one record to the run under construction: data bytes, index
/// entry, filter membership, running offset.
fn write_element<W1: Write, W2: Write>(
    index_w: &mut W1,
    data_w: &mut W2,
    element: &Element,
    offset: &mut i64,
    filter: &mut BloomFilter,
) -> Result<()> {
    let record = element.encode();
    data_w.write_all(&record).map_err(Error::Write)?;

    let entry = IndexEntry {
        offset: *offset,
        key_len: record.len() as i64 - 1,
    };
    entry.write_to(index_w)?;

    filter.insert(&element.key);
    *offset += record.len() as i64;
    Ok(())
}

/// Creates a run file read-write, making the parent directory on demand.
fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| Error::Create { path: path.to_path_buf(), source })?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|source| Error::Create { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const FILTER_BITS: usize = 4096;

    fn run_from(dir: &Path, tag: u32, live: &[&[u8]], removed: &[&[u8]]) -> Run {
        let mut mem = Memtable::new();
        for key in live {
            mem.insert(key.to_vec());
        }
        for key in removed {
            mem.remove(key.to_vec());
        }
        Run::from_memtable(
            dir.join(format!("{tag}.index")),
            dir.join(format!("{tag}.data")),
            &mem,
            FILTER_BITS,
        )
        .unwrap()
    }

    fn keys(elements: &[Element]) -> Vec<&[u8]> {
        elements.iter().map(|e| e.key.as_slice()).collect()
    }

    // -------------------- Flush construction --------------------

    #[test]
    fn flush_roundtrip_yields_sorted_records() -> Result<()> {
        let dir = tempdir()?;
        let mut run = run_from(dir.path(), 0, &[&b"banana"[..], b"apple"], &[&b"cherry"[..]]);

        let all = run.search_range(b"", b"\xff")?;
        assert_eq!(
            all,
            vec![
                Element::live(&b"apple"[..]),
                Element::live(&b"banana"[..]),
                Element::removed(&b"cherry"[..]),
            ]
        );
        Ok(())
    }

    #[test]
    fn records_are_strictly_increasing() -> Result<()> {
        let dir = tempdir()?;
        let live: Vec<Vec<u8>> = (0..50).map(|i| format!("key{i:03}").into_bytes()).collect();
        let live_refs: Vec<&[u8]> = live.iter().map(|k| k.as_slice()).collect();
        let mut run = run_from(dir.path(), 0, &live_refs, &[]);

        assert_eq!(run.len(), 50);
        let mut prev = run.read_at(0)?.key;
        for i in 1..50 {
            let cur = run.read_at(i)?.key;
            assert!(cur > prev, "records out of order at index {i}");
            prev = cur;
        }
        Ok(())
    }

    #[test]
    fn empty_memtable_builds_empty_run() -> Result<()> {
        let dir = tempdir()?;
        let mut run = run_from(dir.path(), 0, &[], &[]);
        assert!(run.is_empty());
        assert_eq!(run.search_key(b"k")?, SearchResult::NotFound);
        assert!(run.search_range(b"", b"\xff")?.is_empty());
        Ok(())
    }

    // -------------------- Point search --------------------

    #[test]
    fn point_search_distinguishes_live_and_removed() -> Result<()> {
        let dir = tempdir()?;
        let mut run = run_from(dir.path(), 0, &[&b"alpha"[..], b"gamma"], &[&b"beta"[..]]);

        assert_eq!(run.search_key(b"alpha")?, SearchResult::Found);
        assert_eq!(run.search_key(b"beta")?, SearchResult::Removed);
        assert_eq!(run.search_key(b"gamma")?, SearchResult::Found);
        assert_eq!(run.search_key(b"delta")?, SearchResult::NotFound);
        Ok(())
    }

    #[test]
    fn point_search_over_many_records() -> Result<()> {
        let dir = tempdir()?;
        let live: Vec<Vec<u8>> = (0..200).map(|i| format!("k{i:04}").into_bytes()).collect();
        let live_refs: Vec<&[u8]> = live.iter().map(|k| k.as_slice()).collect();
        let mut run = run_from(dir.path(), 0, &live_refs, &[]);

        for key in &live {
            assert_eq!(run.search_key(key)?, SearchResult::Found);
        }
        assert_eq!(run.search_key(b"k9999")?, SearchResult::NotFound);
        assert_eq!(run.search_key(b"")?, SearchResult::NotFound);
        Ok(())
    }

    // -------------------- Range search --------------------

    #[test]
    fn range_bounds_are_inclusive_and_strict() -> Result<()> {
        let dir = tempdir()?;
        let mut run = run_from(dir.path(), 0, &[&b"k10"[..], b"k20", b"k30"], &[]);

        // A key strictly below lo must never leak into the result.
        assert_eq!(keys(&run.search_range(b"k15", b"k25")?), vec![b"k20".as_slice()]);
        // Boundary keys equal to lo / hi are included.
        assert_eq!(
            keys(&run.search_range(b"k10", b"k20")?),
            vec![b"k10".as_slice(), b"k20".as_slice()]
        );
        // Ranges entirely off either end are empty.
        assert!(run.search_range(b"k00", b"k09")?.is_empty());
        assert!(run.search_range(b"k31", b"k99")?.is_empty());
        Ok(())
    }

    #[test]
    fn range_includes_tombstones() -> Result<()> {
        let dir = tempdir()?;
        let mut run = run_from(dir.path(), 0, &[&b"a"[..], b"c"], &[&b"b"[..]]);
        let result = run.search_range(b"a", b"c")?;
        assert_eq!(
            result,
            vec![
                Element::live(&b"a"[..]),
                Element::removed(&b"b"[..]),
                Element::live(&b"c"[..]),
            ]
        );
        Ok(())
    }

    #[test]
    fn range_search_then_point_search_share_cursors() -> Result<()> {
        // Both query paths seek the same two file handles; interleaving
        // them must not corrupt either.
        let dir = tempdir()?;
        let mut run = run_from(dir.path(), 0, &[&b"a"[..], b"b", b"c"], &[]);
        assert_eq!(run.search_range(b"a", b"c")?.len(), 3);
        assert_eq!(run.search_key(b"b")?, SearchResult::Found);
        assert_eq!(run.search_range(b"b", b"c")?.len(), 2);
        Ok(())
    }

    // -------------------- Merge construction --------------------

    #[test]
    fn merge_dedupes_to_the_newest_record() -> Result<()> {
        let dir = tempdir()?;
        let older = run_from(dir.path(), 0, &[&b"a"[..], b"b", b"c", b"d"], &[]);
        let newer = run_from(dir.path(), 1, &[&b"e"[..], b"f", b"g"], &[&b"a"[..]]);

        let mut inputs = vec![older, newer];
        let mut merged = Run::from_merge(
            dir.path().join("2.index"),
            dir.path().join("2.data"),
            &mut inputs,
            FILTER_BITS,
        )?;

        assert_eq!(merged.len(), 7);
        let all = merged.search_range(b"", b"\xff")?;
        assert_eq!(
            keys(&all),
            vec![
                b"a".as_slice(),
                b"b".as_slice(),
                b"c".as_slice(),
                b"d".as_slice(),
                b"e".as_slice(),
                b"f".as_slice(),
                b"g".as_slice(),
            ]
        );
        // The newer run's tombstone for "a" won the tie.
        assert!(all[0].tombstone);
        assert_eq!(merged.search_key(b"a")?, SearchResult::Removed);
        assert_eq!(merged.search_key(b"d")?, SearchResult::Found);
        Ok(())
    }

    #[test]
    fn merge_of_three_runs_takes_the_latest_flag() -> Result<()> {
        let dir = tempdir()?;
        let oldest = run_from(dir.path(), 0, &[&b"x"[..]], &[]);
        let middle = run_from(dir.path(), 1, &[], &[&b"x"[..]]);
        let newest = run_from(dir.path(), 2, &[&b"x"[..]], &[]);

        let mut inputs = vec![oldest, middle, newest];
        let mut merged = Run::from_merge(
            dir.path().join("3.index"),
            dir.path().join("3.data"),
            &mut inputs,
            FILTER_BITS,
        )?;

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.search_key(b"x")?, SearchResult::Found);
        Ok(())
    }

    #[test]
    fn merge_preserves_tombstones_verbatim() -> Result<()> {
        let dir = tempdir()?;
        let a = run_from(dir.path(), 0, &[], &[&b"gone"[..]]);
        let b = run_from(dir.path(), 1, &[&b"kept"[..]], &[]);

        let mut inputs = vec![a, b];
        let mut merged = Run::from_merge(
            dir.path().join("2.index"),
            dir.path().join("2.data"),
            &mut inputs,
            FILTER_BITS,
        )?;

        assert_eq!(merged.search_key(b"gone")?, SearchResult::Removed);
        assert_eq!(merged.search_key(b"kept")?, SearchResult::Found);
        Ok(())
    }

    #[test]
    fn merge_rejects_zero_inputs() {
        let dir = tempdir().unwrap();
        let result = Run::from_merge(
            dir.path().join("0.index"),
            dir.path().join("0.data"),
            &mut [],
            FILTER_BITS,
        );
        assert!(matches!(result, Err(Error::EmptyMerge)));
    }

    #[test]
    fn merge_of_disjoint_runs_concatenates() -> Result<()> {
        let dir = tempdir()?;
        let low = run_from(dir.path(), 0, &[&b"a"[..], b"b"], &[]);
        let high = run_from(dir.path(), 1, &[&b"y"[..], b"z"], &[]);

        let mut inputs = vec![low, high];
        let mut merged = Run::from_merge(
            dir.path().join("2.index"),
            dir.path().join("2.data"),
            &mut inputs,
            FILTER_BITS,
        )?;

        assert_eq!(merged.len(), 4);
        assert_eq!(
            keys(&merged.search_range(b"", b"\xff")?),
            vec![b"a".as_slice(), b"b".as_slice(), b"y".as_slice(), b"z".as_slice()]
        );
        Ok(())
    }

    // -------------------- Removal --------------------

    #[test]
    fn remove_unlinks_both_files() -> Result<()> {
        let dir = tempdir()?;
        let run = run_from(dir.path(), 0, &[&b"k"[..]], &[]);
        let index_path = dir.path().join("0.index");
        let data_path = dir.path().join("0.data");
        assert!(index_path.exists());
        assert!(data_path.exists());

        run.remove()?;
        assert!(!index_path.exists());
        assert!(!data_path.exists());
        Ok(())
    }
}
