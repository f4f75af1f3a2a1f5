//! Cold-start recovery: nursery-log replay.
//!
//! The level hierarchy rebuilds itself from filenames (see
//! [`crate::levels`]); what remains of a previous incarnation is the
//! nursery log. Replaying it in order reconstructs the exact buffer that
//! existed at the crash — later records for the same key overwrite earlier
//! ones, just as the live writes did.

use std::path::Path;

use nursery::Nursery;
use wal::{WalReader, WalRecord};

use crate::error::{Result, TreeError};

/// Replays `nursery.data` (if present) into a fresh nursery.
///
/// A missing file is a fresh start. A truncated tail record is tolerated
/// (crash mid-append); a CRC mismatch or unknown op code is surfaced as
/// corruption.
pub(crate) fn replay_nursery_log(path: &Path) -> Result<Nursery> {
    let mut nursery = Nursery::new();
    if !path.exists() {
        return Ok(nursery);
    }

    let mut reader =
        WalReader::open(path).map_err(|e| TreeError::from_wal(e, "open", path))?;
    reader
        .replay(|record| match record {
            WalRecord::Put { key, value } => nursery.put(key, value),
            WalRecord::Del { key } => nursery.delete(key),
        })
        .map_err(|e| TreeError::from_wal(e, "replay", path))?;

    Ok(nursery)
}
