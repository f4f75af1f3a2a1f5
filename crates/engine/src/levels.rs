//! The level hierarchy: slot bookkeeping, background merges, lookup descent.
//!
//! A level owns up to two files. Slot `A` holds the older file, slot `B`
//! the newer; when both are taken, a background worker merges them into a
//! staged `X` file one level deeper. The merged output is committed by
//! renaming it into a slot of the next level — only after that rename are
//! the two inputs unlinked, so a crash at any point leaves a readable tree.
//!
//! Merge results are *applied* only on the owning thread: opportunistically
//! when a mutating operation next runs, or synchronously when a saturated
//! level's slots are needed again (the single-writer analogue of mailbox
//! backpressure).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use btree::{AccessMode, BTreeReader, Lookup, Range, RangeCursor};

use crate::error::{Result, TreeError};

/// Slot tag for the older file of a level.
pub(crate) const SLOT_OLDER: &str = "A";
/// Slot tag for the newer file of a level.
pub(crate) const SLOT_NEWER: &str = "B";
/// Slot tag for a merge output not yet installed into its level.
pub(crate) const SLOT_STAGED: &str = "X";

/// Formats a level file name, e.g. `A-3.data`.
pub(crate) fn level_file_name(slot: &str, level: u32) -> String {
    format!("{}-{}.data", slot, level)
}

/// Parses `<slot>-<N>.data` where `<slot>` is non-empty and digit-free and
/// `N` is the level number (the pattern `^[^\d]+-(\d+)\.data$`).
pub(crate) fn parse_level_file_name(name: &str) -> Option<(&str, u32)> {
    let stem = name.strip_suffix(".data")?;
    let (slot, digits) = stem.rsplit_once('-')?;
    if slot.is_empty() || slot.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let level = digits.parse().ok()?;
    Some((slot, level))
}

struct LevelFile {
    path: PathBuf,
    reader: BTreeReader,
}

struct MergeJob {
    handle: JoinHandle<btree::Result<u64>>,
    /// The staged output path (`X-<N+1>.data`).
    out: PathBuf,
    /// Whether this job is already the retry of a failed merge.
    retried: bool,
}

struct Level {
    /// Files newest-first: `[B, A]` when both slots are taken.
    files: Vec<LevelFile>,
    job: Option<MergeJob>,
}

impl Level {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            job: None,
        }
    }
}

/// All levels of one tree, indexed by depth (level 0 first).
pub(crate) struct Levels {
    dir: PathBuf,
    levels: Vec<Level>,
}

impl Levels {
    /// Reconstructs the hierarchy from the directory contents.
    ///
    /// Leftover writer temporaries (`*.tmp`) and uninstalled merge outputs
    /// (`X-<N>.data`) are removed — their inputs are still present, so no
    /// data is lost. Levels are populated deepest-first so every level's
    /// deeper neighbour exists before its own files attach, and a level
    /// found with both slots taken has its merge re-scheduled.
    pub(crate) fn open(dir: &Path) -> Result<Self> {
        let mut slots: BTreeMap<u32, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();

        let entries =
            fs::read_dir(dir).map_err(|e| TreeError::io("read directory", dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| TreeError::io("read directory", dir, e))?;
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };

            if name.ends_with(".tmp") {
                let _ = fs::remove_file(&path);
                continue;
            }

            let (slot, level) = match parse_level_file_name(&name) {
                Some(parsed) => parsed,
                None => continue,
            };
            match slot {
                SLOT_OLDER => slots.entry(level).or_default().0 = Some(path),
                SLOT_NEWER => slots.entry(level).or_default().1 = Some(path),
                SLOT_STAGED => {
                    let _ = fs::remove_file(&path);
                }
                _ => {}
            }
        }

        // A crash between a merge's two input unlinks can leave a level
        // with only slot B; rename it to A so slot names keep encoding
        // write order (A strictly older than B).
        for (&no, (older, newer)) in slots.iter_mut() {
            if older.is_none() {
                if let Some(b_path) = newer.take() {
                    let a_path = dir.join(level_file_name(SLOT_OLDER, no));
                    fs::rename(&b_path, &a_path)
                        .map_err(|e| TreeError::io("rename", &a_path, e))?;
                    *older = Some(a_path);
                }
            }
        }

        let depth = slots
            .keys()
            .next_back()
            .map_or(0, |max| *max as usize + 1);
        let mut levels: Vec<Level> = (0..depth).map(|_| Level::new()).collect();

        for (&no, (older, newer)) in slots.iter().rev() {
            // Newest first: slot B, then slot A.
            for path in [newer, older].into_iter().flatten() {
                let reader = BTreeReader::open(path, AccessMode::Random)?;
                levels[no as usize].files.push(LevelFile {
                    path: path.clone(),
                    reader,
                });
            }
        }

        let mut set = Self {
            dir: dir.to_path_buf(),
            levels,
        };
        for no in 0..set.levels.len() {
            if set.levels[no].files.len() == 2 {
                set.spawn_merge(no, false);
            }
        }
        Ok(set)
    }

    /// Attaches a finished file (at `src`) to the given level, renaming it
    /// into the free slot. Filling the second slot schedules a background
    /// merge into the next level.
    pub(crate) fn inject(&mut self, no: usize, src: &Path) -> Result<()> {
        self.ensure_level(no);

        if self.levels[no].files.len() == 2 {
            // Both slots taken: the in-flight merge must settle before a
            // third file can land here.
            self.settle_level(no)?;
            if self.levels[no].files.len() == 2 {
                // A previous merge failure left the level saturated.
                return Err(TreeError::io(
                    "inject",
                    &self.dir,
                    io::Error::new(io::ErrorKind::Other, "level still saturated"),
                ));
            }
        }

        let slot = if self.levels[no].files.is_empty() {
            SLOT_OLDER
        } else {
            SLOT_NEWER
        };
        let dst = self.dir.join(level_file_name(slot, no as u32));
        fs::rename(src, &dst).map_err(|e| TreeError::io("rename", &dst, e))?;

        let reader = BTreeReader::open(&dst, AccessMode::Random)?;
        self.levels[no].files.insert(0, LevelFile { path: dst, reader });

        if self.levels[no].files.len() == 2 {
            self.spawn_merge(no, false);
        }
        Ok(())
    }

    /// Descends the hierarchy newest-first and stops at the first
    /// authoritative answer. A tombstone stops the descent: the key is
    /// reported absent without consulting deeper levels.
    pub(crate) fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        for level in &self.levels {
            for file in &level.files {
                match file.reader.lookup(key)? {
                    Lookup::Found(v) => return Ok(Some(v)),
                    Lookup::Tombstone => return Ok(None),
                    Lookup::NotFound => {}
                }
            }
        }
        Ok(None)
    }

    /// Opens a fresh sequential cursor over every level file, shallowest
    /// first. The position of a cursor in the returned vector is its
    /// shallowness rank for the fold merge; the cursors own their file
    /// handles, so the fold is undisturbed by later merges unlinking files.
    pub(crate) fn fold_sources(&self, range: &Range) -> Result<Vec<RangeCursor>> {
        let mut cursors = Vec::new();
        for level in &self.levels {
            for file in &level.files {
                cursors.push(RangeCursor::open(&file.path, range.clone())?);
            }
        }
        Ok(cursors)
    }

    /// Applies the results of any background merges that have finished,
    /// without blocking on ones still running.
    pub(crate) fn settle_finished(&mut self) -> Result<()> {
        let mut no = 0;
        while no < self.levels.len() {
            let finished = self.levels[no]
                .job
                .as_ref()
                .map_or(false, |j| j.handle.is_finished());
            if finished {
                self.settle_level(no)?;
            }
            no += 1;
        }
        Ok(())
    }

    /// Waits for every in-flight merge (including ones that cascade from
    /// settling shallower levels) and applies its result.
    pub(crate) fn settle_all(&mut self) -> Result<()> {
        let mut no = 0;
        while no < self.levels.len() {
            self.settle_level(no)?;
            no += 1;
        }
        Ok(())
    }

    /// Closes the hierarchy: settles all merges and drops the readers.
    pub(crate) fn close(&mut self) -> Result<()> {
        self.settle_all()?;
        self.levels.clear();
        Ok(())
    }

    /// Number of levels currently holding at least one file.
    pub(crate) fn depth(&self) -> usize {
        self.levels.iter().filter(|l| !l.files.is_empty()).count()
    }

    /// Total number of level files.
    pub(crate) fn file_count(&self) -> usize {
        self.levels.iter().map(|l| l.files.len()).sum()
    }

    // ---- Internal ----

    fn ensure_level(&mut self, no: usize) {
        while self.levels.len() <= no {
            self.levels.push(Level::new());
        }
    }

    /// Blocks until the level's in-flight merge (if any) completes, then
    /// commits it: the output is installed one level deeper and the two
    /// inputs are retired. A failed merge is retried once; the second
    /// failure propagates (the tree then degrades to read-only).
    fn settle_level(&mut self, no: usize) -> Result<()> {
        loop {
            let job = match self.levels[no].job.take() {
                Some(j) => j,
                None => return Ok(()),
            };

            match job.handle.join() {
                Ok(Ok(_count)) => {
                    // Commit order matters: rename the output into the next
                    // level first, unlink the inputs only afterwards — and
                    // the older input (slot A) before the newer. A crash in
                    // between then leaves at worst the newer input, whose
                    // surviving records match the merged output; a stale
                    // older file would instead shadow it with old values.
                    self.inject(no + 1, &job.out)?;

                    let old = std::mem::take(&mut self.levels[no].files);
                    for file in old.into_iter().rev() {
                        let LevelFile { path, reader } = file;
                        // Release the handle before unlinking.
                        drop(reader);
                        fs::remove_file(&path)
                            .map_err(|e| TreeError::io("unlink", &path, e))?;
                    }
                    return Ok(());
                }
                Ok(Err(e)) => {
                    if job.retried {
                        return Err(e.into());
                    }
                    let _ = fs::remove_file(&job.out);
                    self.spawn_merge(no, true);
                }
                Err(_) => {
                    if job.retried {
                        return Err(TreeError::io(
                            "merge",
                            &self.dir,
                            io::Error::new(io::ErrorKind::Other, "merge worker panicked"),
                        ));
                    }
                    let _ = fs::remove_file(&job.out);
                    self.spawn_merge(no, true);
                }
            }
        }
    }

    fn spawn_merge(&mut self, no: usize, retried: bool) {
        debug_assert_eq!(self.levels[no].files.len(), 2);
        // Shallowest first: slot B (newer) is files[0].
        let inputs = vec![
            self.levels[no].files[0].path.clone(),
            self.levels[no].files[1].path.clone(),
        ];
        let out = self
            .dir
            .join(level_file_name(SLOT_STAGED, (no + 1) as u32));

        // Tombstones may be dropped only when the output becomes the deepest
        // populated level. Deeper levels cannot gain files while this merge
        // runs (only this merge's own completion could feed them), so the
        // check holds at spawn time.
        let drop_tombstones = self
            .levels
            .iter()
            .skip(no + 1)
            .all(|l| l.files.is_empty());

        let worker_out = out.clone();
        let handle =
            thread::spawn(move || btree::merge_files(&inputs, &worker_out, drop_tombstones));
        self.levels[no].job = Some(MergeJob {
            handle,
            out,
            retried,
        });
    }
}

impl std::fmt::Debug for Levels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Levels")
            .field("dir", &self.dir)
            .field("depth", &self.depth())
            .field("file_count", &self.file_count())
            .finish()
    }
}
