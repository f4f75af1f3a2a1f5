//! # Engine - CascadeKV Storage Engine
//!
//! The central orchestrator that ties the [`nursery`], [`wal`], and
//! [`btree`] crates into a complete LSM tree of immutable on-disk B-tree
//! files.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                    TREE                       │
//! │                                               │
//! │ write.rs → log append → nursery insert        │
//! │              |                                │
//! │              |  (nursery full?)               │
//! │              |            yes                 │
//! │              v                                │
//! │       flush → new level-0 file                │
//! │              |                                │
//! │              |  (level holds two files?)      │
//! │              |            yes                 │
//! │              v                                │
//! │   background merge → one level-(N+1) file     │
//! │                                               │
//! │ read.rs → nursery → level 0 → level 1 → …     │
//! │            (first authoritative answer wins)  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                |
//! |--------------|--------------------------------------------------------|
//! | `lib.rs`     | `Tree` struct, open/close, accessors, `Debug`, `Drop`  |
//! | [`recovery`] | Nursery-log replay on open                             |
//! | [`write`]    | `put()`, `delete()`, `force_flush()`, nursery flush    |
//! | [`read`]     | `lookup()`, `sync_range()`, `fold_range()`, `async_range()` |
//! | [`levels`]   | Slot bookkeeping, background merges, lookup descent    |
//! | [`fold`]     | Online k-way fold merge, async worker, chunk protocol  |
//!
//! ## Levels
//!
//! ```text
//! ┌────────────────────────────┐  ← freshest, checked first
//! │ NURSERY (in memory)        │
//! ├────────────────────────────┤  ← from nursery flushes
//! │ level 0: A-0 / B-0         │
//! ├────────────────────────────┤  ← from merges of level 0
//! │ level 1: A-1 / B-1         │
//! ├────────────────────────────┤
//! │ …                          │
//! └────────────────────────────┘
//! ```
//!
//! ## Crash Safety
//!
//! Every write is fsynced into `nursery.data` **before** the in-memory
//! update. Level files are written to a temporary, fsynced, and renamed
//! into place; a merge unlinks its inputs only after the output's rename.
//! The log is retired only after its flush target is attached. On open,
//! leftover temporaries and uninstalled merge outputs are removed and the
//! log is replayed.
//!
//! ## Concurrency
//!
//! One mutator at a time, realized as an exclusive-owner guard: every
//! mutating operation takes `&mut Tree`. Merges run on background threads;
//! their results are applied under the mutator — opportunistically on the
//! next write, or synchronously when a saturated level's slots are needed.
//! Asynchronous folds run on their own workers over immutable files and a
//! nursery snapshot, so they never synchronize with the mutator after
//! subscription.

mod error;
mod fold;
mod levels;
mod read;
mod recovery;
mod write;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nursery::Nursery;
use wal::WalWriter;

pub use btree::Range;
pub use error::{Result, TreeError};
pub use fold::{AsyncRange, FoldMessage};

use levels::Levels;

/// The shallowest level; nursery flushes land here.
pub const TOP_LEVEL: u32 = 0;
/// Records buffered in the nursery before it flushes to level 0.
pub const NURSERY_MAX: usize = 256;
/// Records per chunk of an asynchronous range fold.
pub const ASYNC_CHUNK_SIZE: usize = 100;
/// How long a fold consumer waits for the next chunk before timing out.
pub const FOLD_TIMEOUT: Duration = Duration::from_secs(3);
/// Name of the nursery's crash log inside the tree directory.
pub const NURSERY_FILENAME: &str = "nursery.data";

/// Tunables for one tree instance. `Default` matches the crate constants.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Nursery record bound; reaching it triggers a flush.
    pub nursery_max: usize,
    /// If `true`, every log append is followed by `fsync`.
    pub log_sync: bool,
    /// Chunk size for asynchronous folds.
    pub chunk_size: usize,
    /// Per-chunk receive deadline for fold consumers.
    pub fold_timeout: Duration,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            nursery_max: NURSERY_MAX,
            log_sync: true,
            chunk_size: ASYNC_CHUNK_SIZE,
            fold_timeout: FOLD_TIMEOUT,
        }
    }
}

/// An open tree: one directory of level files plus the live nursery.
///
/// # Write Path
///
/// 1. Append the record to `nursery.data` (fsync).
/// 2. Apply the mutation to the in-memory nursery.
/// 3. At `nursery_max` records, stream the nursery into a new level-0
///    file, retire the log, and start a fresh nursery.
/// 4. A level holding two files is merged in the background into a single
///    file one level deeper; tombstones are elided once they reach the
///    deepest level.
///
/// # Read Path
///
/// 1. Check the nursery (freshest data, includes tombstones).
/// 2. Descend levels newest-first; the first value or tombstone wins.
pub struct Tree {
    pub(crate) dir: PathBuf,
    pub(crate) nursery: Nursery,
    pub(crate) log: WalWriter,
    pub(crate) levels: Levels,
    pub(crate) opts: TreeOptions,
    pub(crate) closed: bool,
    /// Set when a merge has failed twice; holds the failure detail that
    /// every subsequent write reports.
    pub(crate) degraded: Option<String>,
    /// Cancellation flags of in-flight async folds.
    pub(crate) folds: Vec<Arc<AtomicBool>>,
}

impl Tree {
    /// Opens (or creates) the tree in `dir` with default options.
    ///
    /// # Errors
    ///
    /// [`TreeError::Io`] on disk failures, [`TreeError::Corrupt`] when a
    /// level file or the nursery log does not parse.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with(dir, TreeOptions::default())
    }

    /// Opens (or creates) the tree in `dir`.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create the directory if it does not exist.
    /// 2. Remove leftover temporaries and uninstalled merge outputs.
    /// 3. Rebuild the level hierarchy from the filenames, deepest first,
    ///    re-scheduling the merge of any level found with two files.
    /// 4. Replay `nursery.data` into a fresh nursery.
    /// 5. If the replayed nursery is already full, flush it immediately.
    pub fn open_with<P: AsRef<Path>>(dir: P, opts: TreeOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| TreeError::io("create directory", &dir, e))?;

        let levels = Levels::open(&dir)?;

        let log_path = dir.join(NURSERY_FILENAME);
        let nursery = recovery::replay_nursery_log(&log_path)?;
        let log = WalWriter::create(&log_path, opts.log_sync)
            .map_err(|e| TreeError::from_wal(e, "create", &log_path))?;

        let mut tree = Self {
            dir,
            nursery,
            log,
            levels,
            opts,
            closed: false,
            degraded: None,
            folds: Vec::new(),
        };

        if tree.nursery.len() >= tree.opts.nursery_max {
            tree.flush_nursery()?;
        }

        Ok(tree)
    }

    /// Closes the tree: cancels in-flight folds, flushes the nursery into
    /// level 0, retires the log, and settles every background merge.
    ///
    /// After a clean close no `nursery.data` remains and every operation
    /// returns [`TreeError::Closed`]. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        // Refuse new operations immediately, even if a step below fails.
        self.closed = true;

        for flag in self.folds.drain(..) {
            flag.store(true, Ordering::Relaxed);
        }

        self.flush_nursery()?;

        let log_path = self.log_path();
        match fs::remove_file(&log_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TreeError::io("unlink", &log_path, e)),
        }

        self.levels.close()?;
        Ok(())
    }

    /// The tree's directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The options this tree was opened with.
    #[must_use]
    pub fn options(&self) -> &TreeOptions {
        &self.opts
    }

    /// Number of records currently buffered in the nursery.
    #[must_use]
    pub fn nursery_len(&self) -> usize {
        self.nursery.len()
    }

    /// Number of levels currently holding at least one file.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.depth()
    }

    /// Total number of level files on disk.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.levels.file_count()
    }

    /// `true` once a twice-failed merge has put the tree into read-only
    /// degraded mode.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub(crate) fn log_path(&self) -> PathBuf {
        self.dir.join(NURSERY_FILENAME)
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("dir", &self.dir)
            .field("nursery_len", &self.nursery.len())
            .field("depth", &self.levels.depth())
            .field("file_count", &self.levels.file_count())
            .field("closed", &self.closed)
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// Best-effort close on drop.
///
/// Errors are ignored because `Drop` cannot propagate them — buffered data
/// is still safe in `nursery.data` and will be replayed on the next open.
impl Drop for Tree {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests;
