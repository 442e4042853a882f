//! # Write Lock Errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Write lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("write lock {path} held by {owner} after {attempts} attempts")]
    Contended {
        path: PathBuf,
        owner: String,
        attempts: u32,
    },

    #[error("write lock I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write lock {0} is not held by this handle")]
    NotHeld(PathBuf),

    #[error("unknown lock backend: {0}")]
    UnknownBackend(String),
}

impl LockError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LockError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when another writer holds the lock.
    pub fn is_contended(&self) -> bool {
        matches!(self, LockError::Contended { .. })
    }
}
