//! # BTree - Immutable Level Files
//!
//! On-disk storage files for the CascadeKV storage engine.
//!
//! When the in-memory nursery reaches its record bound the engine streams it
//! to disk as a level file. Level files are *write-once, read-many* — once
//! renamed into place they are never modified, only superseded by a merge
//! and unlinked.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ LEAF BLOCKS (ascending key order, starting at offset 0)       │
//! │                                                               │
//! │ length (u32) | level=0 (u16) | records...                     │
//! │   record: key_len (u32) | key | vtag (u8)                     │
//! │           | val_len (u32) | value                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INNER BLOCKS (B-tree spine, bottom-up, ending with the root)  │
//! │                                                               │
//! │ length (u32) | level>=1 (u16) | children...                   │
//! │   child: key_len (u32) | separator key                        │
//! │          | child_offset (u64) | child_size (u32)              │
//! ├───────────────────────────────────────────────────────────────┤
//! │ SENTINEL: length = 0 (u32) — "no further block"               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM SECTION (snappy-compressed serialized BloomFilter)      │
//! ├───────────────────────────────────────────────────────────────┤
//! │ TRAILER (always last 12 bytes)                                │
//! │                                                               │
//! │ bloom_size (u32) | root_offset (u64)                          │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. `vtag` 0 is a live value, 1 a tombstone
//! (encoded with `val_len == 0`). Separator keys record the *first* key
//! reachable through each child, so child selection during descent uses the
//! half-open intervals `[K_i, K_i+1)` with the last child unbounded above.
//!
//! Sequential scans read blocks front to back and stop at the zero-length
//! sentinel; inner blocks are skipped wherever they appear, so readers do
//! not depend on the leaves-first layout the writer produces.

mod block;
mod error;
mod format;
mod merge;
mod range;
mod reader;
mod writer;

pub use block::{ChildPtr, Node, Record, TAG_TOMBSTONE, TAG_VALUE};
pub use error::{Error, Result};
pub use format::{BLOOM_FPR, INNER_FANOUT, LEAF_FANOUT, TRAILER_BYTES};
pub use merge::{merge_files, MergeIterator};
pub use range::Range;
pub use reader::{AccessMode, BTreeReader, FoldOutcome, LeafScan, Lookup, RangeCursor};
pub use writer::BTreeWriter;

#[cfg(test)]
mod tests;
