//! k-way merge of sorted level files.
//!
//! Produces records in ascending key order. When the same key appears in
//! multiple inputs, only the entry from the **shallowest** source (lowest
//! input index — newest data) is emitted.
//!
//! This is the only producer of deeper-level files: when a level fills its
//! two slots, [`merge_files`] combines them into a single file one level
//! down.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use crate::block::Record;
use crate::error::Result;
use crate::range::Range;
use crate::reader::{AccessMode, BTreeReader, RangeCursor};
use crate::writer::BTreeWriter;

/// The head record of one input, queued for heap-based merge ordering.
struct HeapEntry {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    /// Index into the cursor array; lower = shallower = newer data.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *smallest* key first, so
        // reverse the key comparison. On equal keys the shallower source
        // must win, so reverse the source comparison too.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges multiple sorted cursors into a single sorted record stream.
///
/// Cursors must be ordered shallowest-first; on key ties the entry from the
/// lowest-index cursor survives and the rest are discarded. The iterator is
/// lazy — each input advances one record at a time.
pub struct MergeIterator {
    cursors: Vec<RangeCursor>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// Seeds the heap with the first record of every cursor.
    pub fn new(mut cursors: Vec<RangeCursor>) -> Result<Self> {
        let mut heap = BinaryHeap::new();
        for (i, cursor) in cursors.iter_mut().enumerate() {
            if let Some(r) = cursor.next_record()? {
                heap.push(HeapEntry {
                    key: r.key,
                    value: r.value,
                    source: i,
                });
            }
        }
        Ok(Self { cursors, heap })
    }

    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(r) = self.cursors[source].next_record()? {
            self.heap.push(HeapEntry {
                key: r.key,
                value: r.value,
                source,
            });
        }
        Ok(())
    }

    /// Returns the next record in sorted order (tombstones included), or
    /// `None` when all inputs are exhausted.
    pub fn next_entry(&mut self) -> Result<Option<Record>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };
        self.advance(top.source)?;

        // Discard shadowed duplicates: the heap ordering already placed the
        // shallowest entry for this key on top.
        while let Some(peek) = self.heap.peek() {
            if peek.key != top.key {
                break;
            }
            let dup_source = match self.heap.pop() {
                Some(d) => d.source,
                None => break,
            };
            self.advance(dup_source)?;
        }

        Ok(Some(Record {
            key: top.key,
            value: top.value,
        }))
    }
}

/// Merges `inputs` (ordered shallowest-first) into a single level file at
/// `out`, returning the number of records written.
///
/// When `drop_tombstones` is set — legal only when the output becomes the
/// deepest populated level — tombstones are elided instead of copied: with
/// no deeper source left to shadow, their obligation is discharged.
///
/// The output's bloom filter is sized from the inputs' filter parameters
/// (level files carry no record count).
pub fn merge_files(inputs: &[PathBuf], out: &Path, drop_tombstones: bool) -> Result<u64> {
    let mut expected = 0usize;
    let mut cursors = Vec::with_capacity(inputs.len());
    for path in inputs {
        let reader = BTreeReader::open(path, AccessMode::Sequential)?;
        expected += reader.estimated_records();
        cursors.push(RangeCursor::from_reader(reader, Range::all())?);
    }

    let mut merge = MergeIterator::new(cursors)?;
    let mut writer = BTreeWriter::create(out, expected)?;
    while let Some(r) = merge.next_entry()? {
        if drop_tombstones && r.value.is_none() {
            continue;
        }
        writer.add(r.key, r.value)?;
    }
    let count = writer.record_count();
    writer.finish()?;
    Ok(count)
}
