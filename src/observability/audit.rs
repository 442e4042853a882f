//! Protocol audit log
//!
//! Every consistent-open attempt, every table apply and every recovery step
//! of a writable database is appended here as one JSON line. The file is
//! append-only; unless syncing is turned off, each record is synced before
//! `append` returns.
//!
//! Audit logging is observability: an audit write failure is logged and
//! otherwise ignored, it never fails the operation being audited.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::logger::Logger;

/// Audited protocol step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Consistent open of every table was attempted.
    OpenAttempt,

    /// A table's highest stored revision was observed.
    RevisionObserved,

    /// A table apply started.
    ApplyStart,

    /// A table apply advanced the table.
    ApplySuccess,

    /// A table apply failed.
    ApplyFailed,

    /// Skip-past recovery started.
    RecoveryStart,

    /// Every table was restamped past the failed revision.
    RecoverySuccess,

    /// Recovery failed; storage is unrecoverable.
    RecoveryFailed,

    /// Commit found nothing to write.
    CommitSkipped,

    /// Partially applied revision repaired on open.
    Repair,

    LockAcquired,

    LockReleased,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OpenAttempt => "OPEN_ATTEMPT",
            AuditAction::RevisionObserved => "REVISION_OBSERVED",
            AuditAction::ApplyStart => "APPLY_START",
            AuditAction::ApplySuccess => "APPLY_SUCCESS",
            AuditAction::ApplyFailed => "APPLY_FAILED",
            AuditAction::RecoveryStart => "RECOVERY_START",
            AuditAction::RecoverySuccess => "RECOVERY_SUCCESS",
            AuditAction::RecoveryFailed => "RECOVERY_FAILED",
            AuditAction::CommitSkipped => "COMMIT_SKIPPED",
            AuditAction::Repair => "REPAIR",
            AuditAction::LockAcquired => "LOCK_ACQUIRED",
            AuditAction::LockReleased => "LOCK_RELEASED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failed,
    /// Step started; its result is a later record.
    Pending,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failed => "FAILED",
            AuditOutcome::Pending => "PENDING",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,

    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    pub action: AuditAction,

    pub outcome: AuditOutcome,

    /// Table directory name, for per-table steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            outcome,
            table: None,
            revision: None,
            error: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Serialize to one JSON line (without the newline).
    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(io::Error::from)
    }
}

/// Append-only audit sink.
pub trait AuditLog: Send + Sync {
    /// Append a record. The record is durable once this returns.
    fn append(&self, record: &AuditRecord) -> io::Result<()>;

    fn sync(&self) -> io::Result<()>;
}

fn lock_poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "audit log mutex poisoned")
}

/// File-backed audit log: one JSON record per line, fsync per record
/// unless built `with_sync(false)`.
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    sync: bool,
}

impl FileAuditLog {
    /// Open or create an audit log file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            sync: true,
        })
    }

    /// Whether each append is fsynced. Follows the database `sync_mode`.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn syncs(&self) -> bool {
        self.sync
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> io::Result<MutexGuard<'_, BufWriter<File>>> {
        self.writer.lock().map_err(|_| lock_poisoned())
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let json = record.to_json()?;
        let mut writer = self.writer()?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        if self.sync {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        self.writer()?.get_ref().sync_all()
    }
}

/// In-memory audit log for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<AuditRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.guard().clone()
    }

    /// Records with the given action, in append order.
    pub fn with_action(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.guard()
            .iter()
            .filter(|r| r.action == action)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        self.guard().push(record.clone());
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Cloneable handle to an optional audit sink.
///
/// Append errors are logged at WARN and dropped.
#[derive(Clone, Default)]
pub struct AuditTrail {
    sink: Option<Arc<dyn AuditLog>>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditLog>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A trail that records nothing.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn record(&self, record: AuditRecord) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.append(&record) {
            Logger::warn(
                "AUDIT_WRITE_FAILED",
                &[("action", record.action.as_str()), ("error", &e.to_string())],
            );
        }
    }
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditTrail")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
