//! Read path: point lookups and the three range-fold drivers.
//!
//! Lookups consult the nursery first (freshest data, tombstones included),
//! then descend the levels newest-first, stopping at the first
//! authoritative answer.
//!
//! Range scans snapshot their sources at subscription time and merge them
//! online by key, shallowest source winning ties; see [`crate::fold`].

use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};
use std::thread;

use btree::Range;

use crate::error::{Result, TreeError};
use crate::fold::{run_fold_worker, AsyncRange, FoldMerge, FoldSource};
use crate::Tree;

impl Tree {
    /// Looks up a key, returning `Ok(Some(value))` when it is live.
    ///
    /// A tombstone anywhere on the descent answers `Ok(None)` without
    /// consulting deeper levels.
    ///
    /// # Errors
    ///
    /// [`TreeError::Closed`] after `close`; [`TreeError::Io`] /
    /// [`TreeError::Corrupt`] if a level file read fails.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(TreeError::Closed);
        }
        match self.nursery.get(key) {
            Some(Some(v)) => Ok(Some(v.clone())),
            Some(None) => Ok(None),
            None => self.levels.lookup(key),
        }
    }

    /// Materializes every live pair in `range`, in ascending key order.
    /// `range.limit` caps the result count.
    pub fn sync_range(&self, range: &Range) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.fold_range(
            |mut acc: Vec<(Vec<u8>, Vec<u8>)>, k, v| {
                acc.push((k.to_vec(), v.to_vec()));
                acc
            },
            Vec::new(),
            range,
        )
    }

    /// Folds `fun` over every live pair in `range`, in ascending key
    /// order, blocking until the scan completes.
    pub fn fold_range<A, F>(&self, mut fun: F, mut acc: A, range: &Range) -> Result<A>
    where
        F: FnMut(A, &[u8], &[u8]) -> A,
    {
        if self.closed {
            return Err(TreeError::Closed);
        }
        let mut merge = self.fold_merge(range)?;
        let mut remaining = range.limit;
        while let Some((key, value)) = merge.next_live()? {
            if remaining == Some(0) {
                break;
            }
            acc = fun(acc, &key, &value);
            if let Some(r) = remaining.as_mut() {
                *r -= 1;
            }
        }
        Ok(acc)
    }

    /// Starts an asynchronous, chunked scan of `range` on a worker thread
    /// and returns the consumer handle.
    ///
    /// The scan is a snapshot: writes issued after this call do not appear
    /// in the stream. Chunks of `chunk_size` records are separated by
    /// resume markers; `close` cancels the stream.
    pub fn async_range(&mut self, range: &Range) -> Result<AsyncRange> {
        if self.closed {
            return Err(TreeError::Closed);
        }
        let merge = self.fold_merge(range)?;

        let cancel = Arc::new(AtomicBool::new(false));
        // Forget flags whose workers have already terminated.
        self.folds.retain(|f| Arc::strong_count(f) > 1);
        self.folds.push(cancel.clone());

        let chunk_size = self.opts.chunk_size.max(1);
        let (tx, rx) = mpsc::sync_channel(chunk_size + 2);
        let budget = range.limit;
        thread::spawn(move || run_fold_worker(merge, tx, cancel, chunk_size, budget));

        Ok(AsyncRange {
            rx,
            timeout: self.opts.fold_timeout,
            resume_key: None,
            done: false,
        })
    }

    /// Subscribes a fold to its sources: the nursery snapshot at rank 0,
    /// then a fresh cursor per level file, shallowest first.
    fn fold_merge(&self, range: &Range) -> Result<FoldMerge> {
        // An interval that can hold no key skips the sources entirely
        // (BTreeMap::range rejects crossed bounds).
        if range.is_degenerate() {
            return Ok(FoldMerge::new(Vec::new())?);
        }
        let snapshot = self
            .nursery
            .range_snapshot(range.start_bound(), range.end_bound());
        let mut sources = vec![FoldSource::Buffer(snapshot.into_iter())];
        for cursor in self.levels.fold_sources(range)? {
            sources.push(FoldSource::File(cursor));
        }
        Ok(FoldMerge::new(sources)?)
    }
}
