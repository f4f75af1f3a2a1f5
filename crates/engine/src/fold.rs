//! The range-fold protocol: an ordered scan across the nursery and every
//! level, merged online and delivered to the consumer as a discriminated
//! stream.
//!
//! Each source carries a shallowness rank (nursery = 0, then every level
//! file top-down). The merge emits keys in ascending order; on ties the
//! shallowest source wins and tombstone winners are swallowed, so consumers
//! only ever see live records.
//!
//! The asynchronous driver runs the merge on a worker thread feeding a
//! bounded channel (backpressure for free). After every full chunk it
//! interleaves a [`FoldMessage::Limit`] carrying the next key, so a consumer
//! may either keep reading — the handle resumes transparently — or drop the
//! stream and re-issue the range from that key.
//!
//! The snapshot is taken at subscription: the nursery's in-range entries are
//! copied up front (bounded by the nursery cap) and the file cursors hold
//! their own handles on files that are immutable once published.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::Duration;

use btree::RangeCursor;

use crate::error::{Result, TreeError};

/// One message of the fold stream.
#[derive(Debug)]
pub enum FoldMessage {
    /// A live record, in range order. Never emitted for tombstones.
    Result(Vec<u8>, Vec<u8>),
    /// A full chunk has been emitted; the payload is the key the scan
    /// resumes from (inclusive).
    Limit(Vec<u8>),
    /// End of the scan.
    Done,
    /// The tree closed while the fold was running.
    Cancelled,
    /// The scan hit an I/O or corruption error.
    Failed(TreeError),
}

/// One tagged input of a fold: the nursery snapshot or a level-file cursor.
pub(crate) enum FoldSource {
    Buffer(std::vec::IntoIter<(Vec<u8>, Option<Vec<u8>>)>),
    File(RangeCursor),
}

impl FoldSource {
    fn next_record(&mut self) -> btree::Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        match self {
            FoldSource::Buffer(iter) => Ok(iter.next()),
            FoldSource::File(cursor) => {
                Ok(cursor.next_record()?.map(|r| (r.key, r.value)))
            }
        }
    }
}

struct HeapEntry {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    /// Shallowness rank; lower = newer data, wins ties.
    rank: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.rank == other.rank
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
        // Max-heap: reverse for smallest key first, then shallowest rank.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.rank.cmp(&self.rank))
    }
}

/// Online k-way merge over the tagged sources of one fold.
pub(crate) struct FoldMerge {
    sources: Vec<FoldSource>,
    heap: BinaryHeap<HeapEntry>,
}

impl FoldMerge {
    /// Seeds the heap with the head of every source. Sources must be
    /// ordered shallowest-first (their index is their rank).
    pub(crate) fn new(mut sources: Vec<FoldSource>) -> btree::Result<Self> {
        let mut heap = BinaryHeap::new();
        for (rank, source) in sources.iter_mut().enumerate() {
            if let Some((key, value)) = source.next_record()? {
                heap.push(HeapEntry { key, value, rank });
            }
        }
        Ok(Self { sources, heap })
    }

    fn advance(&mut self, rank: usize) -> btree::Result<()> {
        if let Some((key, value)) = self.sources[rank].next_record()? {
            self.heap.push(HeapEntry { key, value, rank });
        }
        Ok(())
    }

    /// Returns the next *live* record: shadowed duplicates are discarded
    /// and tombstone winners are swallowed.
    pub(crate) fn next_live(&mut self) -> btree::Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            let top = match self.heap.pop() {
                Some(e) => e,
                None => return Ok(None),
            };
            self.advance(top.rank)?;

            while let Some(peek) = self.heap.peek() {
                if peek.key != top.key {
                    break;
                }
                let dup_rank = match self.heap.pop() {
                    Some(d) => d.rank,
                    None => break,
                };
                self.advance(dup_rank)?;
            }

            match top.value {
                Some(v) => return Ok(Some((top.key, v))),
                // The winning entry is a tombstone: the key is dead.
                None => continue,
            }
        }
    }
}

/// Worker loop of an asynchronous fold. Emits `Result`s interleaved with
/// `Limit`s at chunk boundaries, then `Done`; bails out with `Cancelled`
/// when the tree closes, or `Failed` on a read error. A consumer that went
/// away (send error) just ends the worker.
pub(crate) fn run_fold_worker(
    mut merge: FoldMerge,
    tx: SyncSender<FoldMessage>,
    cancel: Arc<AtomicBool>,
    chunk_size: usize,
    mut budget: Option<usize>,
) {
    let mut emitted_in_chunk = 0usize;
    loop {
        if cancel.load(AtomicOrdering::Relaxed) {
            let _ = tx.send(FoldMessage::Cancelled);
            return;
        }

        let next = match merge.next_live() {
            Ok(n) => n,
            Err(e) => {
                let _ = tx.send(FoldMessage::Failed(e.into()));
                return;
            }
        };

        let (key, value) = match next {
            Some(kv) => kv,
            None => {
                let _ = tx.send(FoldMessage::Done);
                return;
            }
        };

        if budget == Some(0) {
            let _ = tx.send(FoldMessage::Done);
            return;
        }

        if emitted_in_chunk == chunk_size {
            if tx.send(FoldMessage::Limit(key.clone())).is_err() {
                return;
            }
            emitted_in_chunk = 0;
        }

        if tx.send(FoldMessage::Result(key, value)).is_err() {
            return;
        }
        emitted_in_chunk += 1;
        if let Some(b) = budget.as_mut() {
            *b -= 1;
        }
    }
}

/// The consumer handle of an asynchronous range fold.
///
/// Produced by [`Tree::async_range`](crate::Tree::async_range). Pulls one
/// record at a time; chunk boundaries are resumed transparently, and the
/// most recent resume point stays available through
/// [`resume_key`](Self::resume_key) for callers that drop the stream and
/// re-issue the range themselves.
pub struct AsyncRange {
    pub(crate) rx: Receiver<FoldMessage>,
    pub(crate) timeout: Duration,
    pub(crate) resume_key: Option<Vec<u8>>,
    pub(crate) done: bool,
}

impl AsyncRange {
    /// Returns the next live record, `Ok(None)` at the end of the scan.
    ///
    /// # Errors
    ///
    /// [`TreeError::Timeout`] when no message arrives within the configured
    /// deadline, [`TreeError::Cancelled`] when the tree closed underneath
    /// the fold, or the underlying read error.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.rx.recv_timeout(self.timeout) {
                Ok(FoldMessage::Result(key, value)) => return Ok(Some((key, value))),
                Ok(FoldMessage::Limit(next_key)) => {
                    // Chunk boundary: remember the resume point and read on.
                    self.resume_key = Some(next_key);
                }
                Ok(FoldMessage::Done) => {
                    self.done = true;
                    return Ok(None);
                }
                Ok(FoldMessage::Cancelled) => {
                    self.done = true;
                    return Err(TreeError::Cancelled);
                }
                Ok(FoldMessage::Failed(e)) => {
                    self.done = true;
                    return Err(e);
                }
                Err(RecvTimeoutError::Timeout) => return Err(TreeError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    // Worker died without a final message.
                    self.done = true;
                    return Err(TreeError::Cancelled);
                }
            }
        }
    }

    /// Collects every remaining record.
    pub fn collect_remaining(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        while let Some(kv) = self.next()? {
            out.push(kv);
        }
        Ok(out)
    }

    /// The key the scan would resume from after the most recent full chunk,
    /// if any chunk boundary has been crossed.
    #[must_use]
    pub fn resume_key(&self) -> Option<&[u8]> {
        self.resume_key.as_deref()
    }
}

impl std::fmt::Debug for AsyncRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRange")
            .field("timeout", &self.timeout)
            .field("done", &self.done)
            .finish()
    }
}
