//! Reads an immutable level file.
//!
//! On open the reader parses the trailer, inflates the bloom filter, and
//! validates the root block. After that it supports three access patterns:
//!
//! - **point lookup** — bloom gate, then a spine descent ending in a binary
//!   search of one leaf;
//! - **sequential leaf iteration** — walk the block region from any offset,
//!   skipping inner blocks transparently, until the zero-length sentinel;
//! - **paginated range fold** — locate the first candidate leaf through the
//!   spine, then iterate leaves applying a fold function, stopping at the
//!   upper bound, at end-of-file, or when a caller-provided record budget
//!   runs out (returning the key to resume from).

use bloom::BloomFilter;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use byteorder::{BigEndian, ReadBytesExt};

use crate::block::{self, Node, Record};
use crate::error::{Error, Result};
use crate::format::{read_trailer, BLOCK_SENTINEL_BYTES, TRAILER_BYTES};
use crate::range::Range;

/// How the underlying file handle is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Point lookups: seeks dominate, keep only a block-sized scratch buffer.
    Random,
    /// Front-to-back scans: large read-ahead buffer.
    Sequential,
}

impl AccessMode {
    fn buffer_capacity(self) -> usize {
        match self {
            AccessMode::Random => 4 * 1024,
            AccessMode::Sequential => 256 * 1024,
        }
    }
}

/// Outcome of a point lookup against a single level file.
///
/// A tombstone is an authoritative answer: the key was deleted and deeper
/// levels must not be consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Vec<u8>),
    Tombstone,
    NotFound,
}

/// Outcome of a (possibly budgeted) range fold over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome<A> {
    /// The scan ran to the end of the range (or of the file).
    Done(A),
    /// The record budget ran out; the second field is the key that would
    /// have been visited next, i.e. the resume point.
    Limited(A, Vec<u8>),
}

/// An open level file.
pub struct BTreeReader {
    path: PathBuf,
    /// Persistent file handle; the `Mutex` gives `lookup` interior
    /// mutability through a shared reference.
    file: Mutex<BufReader<File>>,
    bloom: BloomFilter,
    root_offset: u64,
    /// First byte past the last block (the position of the sentinel).
    blocks_end: u64,
}

impl BTreeReader {
    /// Opens a level file and validates its trailer, bloom filter, and root
    /// block.
    ///
    /// # Errors
    ///
    /// `Error::Io` on any disk failure, `Error::Corrupt` when the trailer
    /// points outside the file, the bloom fails to inflate, or the root
    /// block does not decode.
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut f = File::open(&path).map_err(|e| Error::io("open", &path, e))?;

        let (file_size, bloom_size, root_offset) = {
            let metadata = f.metadata().map_err(|e| Error::io("stat", &path, e))?;
            if metadata.len() < TRAILER_BYTES {
                return Err(Error::corrupt(&path, "file too small to hold a trailer"));
            }
            read_trailer(&mut f).map_err(|e| Error::io("read", &path, e))?
        };

        let overhead = TRAILER_BYTES + BLOCK_SENTINEL_BYTES;
        if (bloom_size as u64) + overhead > file_size {
            return Err(Error::corrupt(
                &path,
                format!("bloom size {} exceeds file size {}", bloom_size, file_size),
            ));
        }
        let bloom_start = file_size - TRAILER_BYTES - bloom_size as u64;
        let blocks_end = bloom_start - BLOCK_SENTINEL_BYTES;

        if root_offset >= blocks_end {
            return Err(Error::corrupt(
                &path,
                format!("root offset {} outside block region", root_offset),
            ));
        }

        // Inflate the bloom filter.
        f.seek(SeekFrom::Start(bloom_start))
            .map_err(|e| Error::io("seek", &path, e))?;
        let mut compressed = vec![0u8; bloom_size as usize];
        f.read_exact(&mut compressed)
            .map_err(|e| Error::io("read", &path, e))?;
        let raw = snap::raw::Decoder::new()
            .decompress_vec(&compressed)
            .map_err(|e| Error::corrupt(&path, format!("bloom decompression failed: {}", e)))?;
        let bloom = BloomFilter::deserialize(&raw)
            .map_err(|e| Error::corrupt(&path, format!("bloom deserialization failed: {}", e)))?;

        let reader = Self {
            path,
            file: Mutex::new(BufReader::with_capacity(mode.buffer_capacity(), f)),
            bloom,
            root_offset,
            blocks_end,
        };

        // Validate the root block up front so a damaged spine is caught at
        // open rather than on the first lookup.
        {
            let mut f = reader.lock_file()?;
            reader.read_block_required(&mut f, reader.root_offset)?;
        }

        Ok(reader)
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How many records this file was built for, recovered from the bloom
    /// filter parameters. Used to size merge-output filters.
    #[must_use]
    pub fn estimated_records(&self) -> usize {
        self.bloom.estimated_items()
    }

    /// Point lookup.
    ///
    /// The bloom filter is consulted first; a negative answer skips the file
    /// without any block reads. Otherwise the spine is descended picking, at
    /// each inner node, the child whose separator is the greatest key `<=`
    /// the probe, and the final leaf is binary-searched.
    pub fn lookup(&self, key: &[u8]) -> Result<Lookup> {
        if !self.bloom.contains(key) {
            return Ok(Lookup::NotFound);
        }

        let mut f = self.lock_file()?;
        let mut offset = self.root_offset;
        loop {
            let (node, _) = self.read_block_required(&mut f, offset)?;
            match node {
                Node::Leaf(records) => {
                    return Ok(
                        match records.binary_search_by(|r| r.key.as_slice().cmp(key)) {
                            Ok(i) => match records[i].value {
                                Some(ref v) => Lookup::Found(v.clone()),
                                None => Lookup::Tombstone,
                            },
                            Err(_) => Lookup::NotFound,
                        },
                    );
                }
                Node::Inner(children) => {
                    // Greatest separator <= key. Separators are the smallest
                    // keys reachable through each child, so a probe below
                    // the first separator cannot be in this file.
                    let idx = children.partition_point(|c| c.first_key.as_slice() <= key);
                    if idx == 0 {
                        return Ok(Lookup::NotFound);
                    }
                    offset = children[idx - 1].offset;
                }
            }
        }
    }

    /// Starts a sequential scan over the leaves, beginning with the block at
    /// offset 0 (leaves occupy a prefix of the file, so that is the first
    /// leaf).
    #[must_use]
    pub fn leaf_scan(self) -> LeafScan {
        LeafScan {
            reader: self,
            next_offset: 0,
        }
    }

    /// Starts a sequential scan at a specific block offset (as returned by
    /// [`locate_leaf`](Self::locate_leaf)).
    #[must_use]
    pub fn leaf_scan_from(self, offset: u64) -> LeafScan {
        LeafScan {
            reader: self,
            next_offset: offset,
        }
    }

    /// Descends the spine to the offset of the leaf that could contain
    /// `key`. The result is a lower bound: the leaf may still hold only
    /// smaller keys, and a scan starting there filters against the range.
    pub fn locate_leaf(&self, key: &[u8]) -> Result<u64> {
        let mut f = self.lock_file()?;
        let mut offset = self.root_offset;
        loop {
            let (node, _) = self.read_block_required(&mut f, offset)?;
            match node {
                Node::Leaf(_) => return Ok(offset),
                Node::Inner(children) => {
                    let idx = children.partition_point(|c| c.first_key.as_slice() <= key);
                    // A probe below the first separator clamps to the first
                    // child: its leaf is where an in-range scan must begin.
                    offset = children[idx.saturating_sub(1)].offset;
                }
            }
        }
    }

    /// Folds `fun` over every record of this file whose key lies within
    /// `range`, in ascending key order. Tombstones are visited like any
    /// other record — shadowing is the caller's concern.
    ///
    /// `limit` caps the number of records visited; when it runs out the fold
    /// returns [`FoldOutcome::Limited`] carrying the key to resume from.
    /// `None` means unbounded.
    pub fn range_fold<A, F>(
        &self,
        mut fun: F,
        mut acc: A,
        range: &Range,
        limit: Option<usize>,
    ) -> Result<FoldOutcome<A>>
    where
        F: FnMut(A, &Record) -> A,
    {
        let mut offset = match &range.from_key {
            Some(k) => self.locate_leaf(k)?,
            None => 0,
        };

        let mut remaining = limit;
        let mut f = self.lock_file()?;
        loop {
            let (node, size) = match self.read_block(&mut f, offset)? {
                Some(found) => found,
                None => return Ok(FoldOutcome::Done(acc)),
            };
            offset += size;

            let records = match node {
                Node::Leaf(records) => records,
                // Inner blocks are skipped transparently wherever they sit.
                Node::Inner(_) => continue,
            };

            for r in records {
                if range.is_before_start(&r.key) {
                    continue;
                }
                if range.is_past_end(&r.key) {
                    return Ok(FoldOutcome::Done(acc));
                }
                if remaining == Some(0) {
                    return Ok(FoldOutcome::Limited(acc, r.key));
                }
                acc = fun(acc, &r);
                if let Some(rem) = remaining.as_mut() {
                    *rem -= 1;
                }
            }
        }
    }

    // ---- Internal helpers ----

    fn lock_file(&self) -> Result<MutexGuard<'_, BufReader<File>>> {
        self.file.lock().map_err(|_| {
            Error::io(
                "lock",
                &self.path,
                std::io::Error::new(std::io::ErrorKind::Other, "reader lock poisoned"),
            )
        })
    }

    /// Reads and decodes the block at `offset`.
    ///
    /// Returns `None` for the zero-length sentinel (or an offset at/past the
    /// end of the block region). The second tuple field is the block's
    /// on-disk size including the length prefix.
    fn read_block(
        &self,
        f: &mut BufReader<File>,
        offset: u64,
    ) -> Result<Option<(Node, u64)>> {
        if offset >= self.blocks_end {
            return Ok(None);
        }

        f.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io("seek", &self.path, e))?;
        let length = f
            .read_u32::<BigEndian>()
            .map_err(|e| Error::io("read", &self.path, e))?;
        if length == 0 {
            return Ok(None);
        }
        if length < 2 {
            return Err(Error::corrupt(
                &self.path,
                format!("block length {} at offset {} too small", length, offset),
            ));
        }
        if offset + 4 + length as u64 > self.blocks_end {
            return Err(Error::corrupt(
                &self.path,
                format!("block at offset {} overruns the block region", offset),
            ));
        }

        let mut body = vec![0u8; length as usize];
        f.read_exact(&mut body)
            .map_err(|e| Error::io("read", &self.path, e))?;
        let node = block::decode(&body)
            .map_err(|detail| Error::corrupt(&self.path, detail))?;
        Ok(Some((node, 4 + length as u64)))
    }

    /// Like [`read_block`](Self::read_block), but where a block is required
    /// (e.g. a child pointer target): the sentinel is corruption.
    fn read_block_required(
        &self,
        f: &mut BufReader<File>,
        offset: u64,
    ) -> Result<(Node, u64)> {
        self.read_block(f, offset)?.ok_or_else(|| {
            Error::corrupt(
                &self.path,
                format!("expected a block at offset {}, found end of region", offset),
            )
        })
    }
}

impl std::fmt::Debug for BTreeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTreeReader")
            .field("path", &self.path)
            .field("root_offset", &self.root_offset)
            .field("blocks_end", &self.blocks_end)
            .finish()
    }
}

/// Sequential cursor over the leaf blocks of one file.
///
/// Inner blocks encountered along the way are skipped, so the scan is
/// correct for any block layout with valid child pointers.
pub struct LeafScan {
    reader: BTreeReader,
    next_offset: u64,
}

impl LeafScan {
    /// Returns the members of the next leaf, or `None` once the zero-length
    /// sentinel (or the end of the block region) is reached.
    pub fn next_leaf(&mut self) -> Result<Option<Vec<Record>>> {
        let mut f = self.reader.lock_file()?;
        loop {
            let (node, size) = match self.reader.read_block(&mut f, self.next_offset)? {
                Some(found) => found,
                None => return Ok(None),
            };
            self.next_offset += size;
            match node {
                Node::Leaf(records) => return Ok(Some(records)),
                Node::Inner(_) => continue,
            }
        }
    }
}

/// A pull cursor yielding the records of one file that fall within a range,
/// in ascending key order. This is the per-file leg of merges and fold
/// fan-outs; it owns its file handle.
pub struct RangeCursor {
    scan: LeafScan,
    pending: std::vec::IntoIter<Record>,
    range: Range,
    done: bool,
}

impl RangeCursor {
    /// Opens `path` in sequential mode and positions the cursor at the first
    /// leaf that could contain the range's lower bound.
    pub fn open<P: AsRef<Path>>(path: P, range: Range) -> Result<Self> {
        let reader = BTreeReader::open(path, AccessMode::Sequential)?;
        Self::from_reader(reader, range)
    }

    /// Builds a cursor over an already-open reader.
    pub fn from_reader(reader: BTreeReader, range: Range) -> Result<Self> {
        let start = match &range.from_key {
            Some(k) => reader.locate_leaf(k)?,
            None => 0,
        };
        Ok(Self {
            scan: reader.leaf_scan_from(start),
            pending: Vec::new().into_iter(),
            range,
            done: false,
        })
    }

    /// Returns the next in-range record (tombstones included), or `None`
    /// when the range or the file is exhausted.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(r) = self.pending.next() {
                if self.range.is_before_start(&r.key) {
                    continue;
                }
                if self.range.is_past_end(&r.key) {
                    self.done = true;
                    return Ok(None);
                }
                return Ok(Some(r));
            }
            match self.scan.next_leaf()? {
                Some(records) => self.pending = records.into_iter(),
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }
}
