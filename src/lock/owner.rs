//! Contents of the lock marker file

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the writer holding a lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    /// Distinguishes handles within one process.
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            token: Uuid::new_v4(),
            acquired_at: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Owner recorded in `path`. None if missing or unparsable.
    pub fn read(path: &Path) -> Option<Self> {
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn describe(&self) -> String {
        format!("pid {} since {}", self.pid, self.acquired_at.to_rfc3339())
    }
}
