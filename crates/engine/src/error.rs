//! The tree-level error taxonomy.
//!
//! `NotFound` is deliberately absent: a lookup miss is an ordinary result
//! (`Ok(None)`), not an error.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    /// A disk operation failed. Always surfaced, never retried silently
    /// (the one exception is a background merge, which is retried once
    /// before the failure lands here).
    #[error("{op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// On-disk state does not match the expected format. Surfaced and never
    /// auto-repaired.
    #[error("corrupt file {}: {detail}", .path.display())]
    Corrupt { path: PathBuf, detail: String },

    /// The tree has been closed; no further operations are accepted.
    #[error("tree is closed")]
    Closed,

    /// A fold consumer did not receive the next chunk within its deadline.
    #[error("range fold timed out")]
    Timeout,

    /// A fold was aborted because the tree closed underneath it.
    #[error("range fold cancelled")]
    Cancelled,
}

impl TreeError {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        TreeError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Maps a nursery-log error onto the tree taxonomy.
    pub(crate) fn from_wal(err: wal::WalError, op: &'static str, path: &Path) -> Self {
        match err {
            wal::WalError::Io(source) => TreeError::io(op, path, source),
            wal::WalError::Corrupt => TreeError::Corrupt {
                path: path.to_path_buf(),
                detail: "corrupt log record".to_string(),
            },
        }
    }
}

impl From<btree::Error> for TreeError {
    fn from(err: btree::Error) -> Self {
        match err {
            btree::Error::Io { op, path, source } => TreeError::Io { op, path, source },
            btree::Error::Corrupt { path, detail } => TreeError::Corrupt { path, detail },
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
