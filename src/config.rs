//! Database configuration
//!
//! Loaded from a JSON file or built in code; every field has a default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DatabaseError, DbResult};
use crate::lock::{LockBackendKind, LockOptions};

/// Tunables for opening and writing a database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Consistent-open attempts before reporting corruption (default: 100)
    #[serde(default = "default_open_retry_budget")]
    pub open_retry_budget: u32,

    /// Lock attempts after the first (default: 5)
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Initial lock backoff, doubled per retry (default: 20)
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,

    /// "hardlink" or "rename" (default: "hardlink")
    #[serde(default = "default_lock_backend")]
    pub lock_backend: String,

    /// Staged document operations that trigger an automatic commit (default: 10000)
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Write the audit trail (default: true)
    #[serde(default = "default_audit_enabled")]
    pub audit_enabled: bool,

    /// Audit file name under the database root (default: "audit.log")
    #[serde(default = "default_audit_file")]
    pub audit_file: String,

    /// "fsync" or "none" (default: "fsync")
    #[serde(default = "default_sync_mode")]
    pub sync_mode: String,
}

fn default_open_retry_budget() -> u32 {
    100
}

fn default_lock_retries() -> u32 {
    5
}

fn default_lock_retry_delay_ms() -> u64 {
    20
}

fn default_lock_backend() -> String {
    "hardlink".to_string()
}

fn default_flush_threshold() -> usize {
    10_000
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_file() -> String {
    "audit.log".to_string()
}

fn default_sync_mode() -> String {
    "fsync".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            open_retry_budget: default_open_retry_budget(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
            lock_backend: default_lock_backend(),
            flush_threshold: default_flush_threshold(),
            audit_enabled: default_audit_enabled(),
            audit_file: default_audit_file(),
            sync_mode: default_sync_mode(),
        }
    }
}

impl DatabaseConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DatabaseError::config_io(format!("Failed to read config: {}", path.display()), e)
        })?;
        let config: DatabaseConfig = serde_json::from_str(&text).map_err(|e| {
            DatabaseError::config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.open_retry_budget == 0 {
            return Err(DatabaseError::config("open_retry_budget must be > 0"));
        }
        if self.flush_threshold == 0 {
            return Err(DatabaseError::config("flush_threshold must be > 0"));
        }
        if self.audit_enabled && self.audit_file.trim().is_empty() {
            return Err(DatabaseError::config("audit_file must not be empty"));
        }
        self.lock_backend_kind()?;
        match self.sync_mode.as_str() {
            "fsync" | "none" => {}
            other => {
                return Err(DatabaseError::config(format!(
                    "sync_mode must be \"fsync\" or \"none\", got {:?}",
                    other
                )))
            }
        }
        Ok(())
    }

    pub fn lock_backend_kind(&self) -> DbResult<LockBackendKind> {
        self.lock_backend
            .parse()
            .map_err(|e: crate::lock::LockError| DatabaseError::config(e.to_string()))
    }

    pub fn lock_options(&self) -> DbResult<LockOptions> {
        Ok(LockOptions {
            backend: self.lock_backend_kind()?,
            retries: self.lock_retries,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        })
    }

    /// Whether table writes are fsynced.
    pub fn sync(&self) -> bool {
        self.sync_mode != "none"
    }
}
