//! Typed errors for level-file operations.
//!
//! The engine must be able to tell an I/O failure from on-disk corruption
//! (corruption is surfaced and never auto-repaired), so the two are distinct
//! variants rather than one stringly error.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A disk operation failed.
    #[error("{op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file's contents do not match the level-file format.
    #[error("corrupt level file {}: {detail}", .path.display())]
    Corrupt { path: PathBuf, detail: String },
}

impl Error {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Error::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, detail: impl Into<String>) -> Self {
        Error::Corrupt {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
