//! Write path: `put()`, `delete()`, `force_flush()`, and the nursery flush.
//!
//! Every mutation is appended to the nursery log first (fsynced), then
//! applied to the in-memory nursery. When the nursery reaches its record
//! bound it is streamed, in key order, into a new level-0 file and handed
//! to the level hierarchy; saturating level 0 kicks off the background
//! merge cascade.

use std::fs;
use std::io;

use btree::{BTreeWriter, Record};
use wal::{WalRecord, WalWriter};

use crate::error::{Result, TreeError};
use crate::levels::{level_file_name, SLOT_STAGED};
use crate::{Tree, TOP_LEVEL};

impl Tree {
    /// Inserts a key-value pair.
    ///
    /// Durable once the call returns: the record is fsynced into the
    /// nursery log before the in-memory update.
    ///
    /// # Errors
    ///
    /// [`TreeError::Closed`] after `close`; [`TreeError::Io`] on log or
    /// flush failures, and on every write once the tree has degraded after
    /// a twice-failed merge.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.ensure_writable()?;
        self.settle_background()?;

        self.log
            .append(&WalRecord::Put {
                key: key.clone(),
                value: value.clone(),
            })
            .map_err(|e| TreeError::from_wal(e, "append", &self.log_path()))?;
        self.nursery.put(key, value);

        if self.nursery.len() >= self.opts.nursery_max {
            self.flush_nursery()?;
        }
        Ok(())
    }

    /// Deletes a key by buffering a tombstone.
    ///
    /// The tombstone flows through the merge pipeline, shadowing older
    /// values until it reaches the deepest level.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.ensure_writable()?;
        self.settle_background()?;

        self.log
            .append(&WalRecord::Del { key: key.clone() })
            .map_err(|e| TreeError::from_wal(e, "append", &self.log_path()))?;
        self.nursery.delete(key);

        if self.nursery.len() >= self.opts.nursery_max {
            self.flush_nursery()?;
        }
        Ok(())
    }

    /// Flushes the nursery to a level-0 file even if it is not full yet.
    /// A no-op when the nursery is empty.
    pub fn force_flush(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.settle_background()?;
        self.flush_nursery()
    }

    /// Streams the nursery's records, sorted, into a new level-0 file,
    /// attaches it to the hierarchy, and resets both the log and the
    /// buffer.
    ///
    /// The file is staged under the `X` tag and committed by the level's
    /// slot rename; the log is only retired after the file is attached, so
    /// a crash anywhere in between replays into an identical nursery.
    pub(crate) fn flush_nursery(&mut self) -> Result<()> {
        if self.nursery.is_empty() {
            return Ok(());
        }

        let staged = self.dir.join(level_file_name(SLOT_STAGED, TOP_LEVEL));
        let records = self.nursery.iter().map(|(k, v)| Record {
            key: k.clone(),
            value: v.clone(),
        });
        BTreeWriter::write_from_iterator(&staged, self.nursery.len(), records)?;

        self.levels.inject(TOP_LEVEL as usize, &staged)?;

        // Retire the log and start a fresh, empty nursery.
        let log_path = self.log_path();
        fs::remove_file(&log_path).map_err(|e| TreeError::io("unlink", &log_path, e))?;
        self.log = WalWriter::create(&log_path, self.opts.log_sync)
            .map_err(|e| TreeError::from_wal(e, "create", &log_path))?;
        self.nursery.clear();

        Ok(())
    }

    // ---- Internal ----

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.closed {
            return Err(TreeError::Closed);
        }
        if let Some(detail) = &self.degraded {
            return Err(TreeError::io(
                "write",
                &self.dir,
                io::Error::new(io::ErrorKind::Other, detail.clone()),
            ));
        }
        Ok(())
    }

    /// Applies any finished background merges. A merge that has failed
    /// twice surfaces here: the tree degrades to read-only and the failure
    /// is returned (and repeated for every subsequent write).
    pub(crate) fn settle_background(&mut self) -> Result<()> {
        match self.levels.settle_finished() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.degraded = Some(e.to_string());
                Err(e)
            }
        }
    }
}
