//! Builds an immutable level file from a key-ordered record stream.
//!
//! The writer emits leaf blocks as records arrive, so leaves occupy a
//! contiguous prefix of the file in ascending key order. Child pointers are
//! staged in memory and the inner spine is laid down bottom-up once the
//! stream ends, followed by the zero-length block sentinel, the compressed
//! bloom filter, and the trailer.
//!
//! The file is written under a temporary name and atomically renamed into
//! place after fsync; a failed build leaves only the temporary behind for
//! startup cleanup.

use bloom::BloomFilter;
use std::fs::{rename, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::block::{self, ChildPtr, Record};
use crate::error::{Error, Result};
use crate::format::{write_trailer, BLOOM_FPR, INNER_FANOUT, LEAF_FANOUT};

pub struct BTreeWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    /// Offset of the next block to be written.
    offset: u64,
    /// Records accumulating toward the current leaf.
    leaf: Vec<Record>,
    /// `staging[h]` holds pointers awaiting an inner node at height `h + 1`.
    staging: Vec<Vec<ChildPtr>>,
    bloom: BloomFilter,
    count: u64,
    #[cfg(debug_assertions)]
    last_key: Option<Vec<u8>>,
}

impl BTreeWriter {
    /// Starts a new level file at `path`.
    ///
    /// `expected_records` sizes the bloom filter; an overestimate only
    /// lowers the false-positive rate.
    pub fn create(path: &Path, expected_records: usize) -> Result<Self> {
        let final_path = path.to_path_buf();
        let tmp_path = path.with_extension("data.tmp");

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| Error::io("create", &tmp_path, e))?;

        Ok(Self {
            final_path,
            tmp_path,
            file: BufWriter::new(file),
            offset: 0,
            leaf: Vec::with_capacity(LEAF_FANOUT),
            staging: Vec::new(),
            bloom: BloomFilter::new(expected_records.max(1), BLOOM_FPR),
            count: 0,
            #[cfg(debug_assertions)]
            last_key: None,
        })
    }

    /// Appends one record. Keys must arrive in strictly ascending order with
    /// no duplicates; `value == None` writes a tombstone.
    pub fn add(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        #[cfg(debug_assertions)]
        {
            debug_assert!(
                self.last_key.as_deref().map_or(true, |last| last < &key[..]),
                "records must arrive in strictly ascending key order"
            );
            self.last_key = Some(key.clone());
        }

        self.bloom.insert(&key);
        self.count += 1;
        self.leaf.push(Record { key, value });
        if self.leaf.len() >= LEAF_FANOUT {
            self.flush_leaf()?;
        }
        Ok(())
    }

    /// Number of records added so far.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.count
    }

    /// Finishes the file: flushes the partial leaf, writes the inner spine
    /// bottom-up, the sentinel, the compressed bloom, and the trailer, then
    /// fsyncs and renames the temporary into place.
    pub fn finish(mut self) -> Result<()> {
        self.flush_leaf()?;

        if self.staging.is_empty() {
            // A stream with zero records (e.g. a merge where every record
            // cancelled out) still produces a self-contained file: one empty
            // leaf serves as root.
            let bytes = block::encode_leaf(&[]);
            let (offset, size) = self.write_block(&bytes)?;
            self.stage(
                0,
                ChildPtr {
                    first_key: Vec::new(),
                    offset,
                    size,
                },
            );
        }

        // Build the spine bottom-up. Each height is chunked into inner nodes
        // one level up until a single pointer remains: the root.
        let mut height = 0;
        let root = loop {
            let mut ptrs = std::mem::take(&mut self.staging[height]);
            if height + 1 == self.staging.len() && ptrs.len() == 1 {
                break ptrs.remove(0);
            }
            for chunk in ptrs.chunks(INNER_FANOUT) {
                let bytes = block::encode_inner((height + 1) as u16, chunk);
                let (offset, size) = self.write_block(&bytes)?;
                self.stage(
                    height + 1,
                    ChildPtr {
                        first_key: chunk[0].first_key.clone(),
                        offset,
                        size,
                    },
                );
            }
            height += 1;
        };

        // Sentinel: a zero length prefix marks the end of the block region.
        self.file
            .write_all(&0u32.to_be_bytes())
            .map_err(|e| Error::io("write", &self.tmp_path, e))?;

        // Compressed bloom, then the trailer pointing back at it and the root.
        let raw = self.bloom.serialize();
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&raw)
            .map_err(|e| {
                Error::io(
                    "compress bloom",
                    &self.tmp_path,
                    io::Error::new(io::ErrorKind::Other, e),
                )
            })?;
        self.file
            .write_all(&compressed)
            .map_err(|e| Error::io("write", &self.tmp_path, e))?;
        write_trailer(&mut self.file, compressed.len() as u32, root.offset)
            .map_err(|e| Error::io("write", &self.tmp_path, e))?;

        self.file
            .flush()
            .map_err(|e| Error::io("flush", &self.tmp_path, e))?;
        self.file
            .get_ref()
            .sync_all()
            .map_err(|e| Error::io("fsync", &self.tmp_path, e))?;

        rename(&self.tmp_path, &self.final_path)
            .map_err(|e| Error::io("rename", &self.final_path, e))?;

        Ok(())
    }

    /// Drains a sorted record iterator into a new level file at `path`.
    /// Returns the number of records written.
    pub fn write_from_iterator<I>(path: &Path, expected_records: usize, records: I) -> Result<u64>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut writer = Self::create(path, expected_records)?;
        for r in records {
            writer.add(r.key, r.value)?;
        }
        let count = writer.record_count();
        writer.finish()?;
        Ok(count)
    }

    fn flush_leaf(&mut self) -> Result<()> {
        if self.leaf.is_empty() {
            return Ok(());
        }
        let first_key = self.leaf[0].key.clone();
        let bytes = block::encode_leaf(&self.leaf);
        self.leaf.clear();
        let (offset, size) = self.write_block(&bytes)?;
        self.stage(
            0,
            ChildPtr {
                first_key,
                offset,
                size,
            },
        );
        Ok(())
    }

    fn write_block(&mut self, bytes: &[u8]) -> Result<(u64, u32)> {
        let offset = self.offset;
        self.file
            .write_all(bytes)
            .map_err(|e| Error::io("write", &self.tmp_path, e))?;
        self.offset += bytes.len() as u64;
        Ok((offset, bytes.len() as u32))
    }

    fn stage(&mut self, height: usize, ptr: ChildPtr) {
        if self.staging.len() <= height {
            self.staging.resize_with(height + 1, Vec::new);
        }
        self.staging[height].push(ptr);
    }
}
