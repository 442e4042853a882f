//! Writable database handle
//!
//! # Open sequence (strict order)
//!
//! 1. Validate the configuration
//! 2. Create the directory if the mode allows it
//! 3. Acquire the write lock
//! 4. Refuse a directory carrying the `recovery_failed` marker
//! 5. Open, create or overwrite the tables per `OpenMode`
//! 6. Restamp past any revision a previous writer left half applied

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::batch::{
    ChangeBatch, CommitOutcome, DatabaseStats, DocId, Document, Posting, StoredDocument,
};
use crate::config::DatabaseConfig;
use crate::errors::{DatabaseError, DbResult};
use crate::lock::WriteLock;
use crate::manager::{FaultPlan, ManagerOptions, TableManager};
use crate::observability::{
    AuditAction, AuditOutcome, AuditRecord, AuditTrail, FileAuditLog, Logger, MetricsRegistry,
};

use super::lookup;
use super::mode::OpenMode;

/// Left in the database directory by a writer whose recovery failed.
pub const RECOVERY_FAILED_MARKER: &str = "recovery_failed";

/// The single writer of a database.
///
/// Holds the write lock for its whole lifetime. Reads through this handle
/// see committed plus staged state.
pub struct WritableDatabase {
    path: PathBuf,
    config: DatabaseConfig,
    batch: ChangeBatch,
    lock: WriteLock,
}

impl WritableDatabase {
    /// Opens or creates the database at `path` with default settings.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> DbResult<Self> {
        Self::open_with_config(path, mode, DatabaseConfig::default())
    }

    pub fn open_with_config(
        path: impl AsRef<Path>,
        mode: OpenMode,
        config: DatabaseConfig,
    ) -> DbResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        if !path.is_dir() {
            if !mode.may_create() {
                return Err(DatabaseError::opening(format!(
                    "no database at {}",
                    path.display()
                )));
            }
            fs::create_dir_all(&path).map_err(|e| {
                DatabaseError::create(format!("Failed to create {}", path.display()))
                    .with_details(e.to_string())
            })?;
        }

        let lock = WriteLock::acquire(&path, &config.lock_options()?)?;

        // Checked under the lock: a writer that failed recovery may have
        // released it while this one was backing off.
        if Self::is_marked_unrecoverable(&path) {
            return Err(DatabaseError::unrecoverable(format!(
                "{} holds a {} marker; repair the database before writing",
                path.display(),
                RECOVERY_FAILED_MARKER
            )));
        }

        let audit = Self::open_audit(&path, &config);
        audit.record(AuditRecord::new(AuditAction::LockAcquired, AuditOutcome::Success));

        let mut manager =
            TableManager::new(&path, ManagerOptions::from(&config)).with_audit(audit);
        manager
            .metrics()
            .add_lock_retries(u64::from(lock.attempts().saturating_sub(1)));

        Self::open_tables(&mut manager, &path, mode)?;
        manager.repair_partial_revision()?;

        let mode_name = mode.as_str();
        let path_str = path.display().to_string();
        Logger::info(
            "WRITER_OPENED",
            &[("mode", mode_name), ("path", path_str.as_str())],
        );

        Ok(Self {
            path,
            config,
            batch: ChangeBatch::new(manager)?,
            lock,
        })
    }

    /// The audit trail for this writer. An audit file that cannot be opened
    /// is logged and auditing is turned off for the session.
    fn open_audit(path: &Path, config: &DatabaseConfig) -> AuditTrail {
        if !config.audit_enabled {
            return AuditTrail::disabled();
        }
        let audit_path = path.join(&config.audit_file);
        match FileAuditLog::open(&audit_path) {
            Ok(log) => AuditTrail::new(Arc::new(log.with_sync(config.sync()))),
            Err(e) => {
                let path_str = audit_path.display().to_string();
                let reason = e.to_string();
                Logger::warn(
                    "AUDIT_OPEN_FAILED",
                    &[("path", path_str.as_str()), ("reason", reason.as_str())],
                );
                AuditTrail::disabled()
            }
        }
    }

    fn open_tables(manager: &mut TableManager, path: &Path, mode: OpenMode) -> DbResult<()> {
        let exists = TableManager::tables_exist(path);
        match mode {
            OpenMode::Open => {
                if !exists {
                    return Err(DatabaseError::opening(format!(
                        "no database at {}",
                        path.display()
                    )));
                }
                manager.open_tables_consistent()?;
            }
            OpenMode::Create => {
                if exists {
                    return Err(DatabaseError::create(format!(
                        "database already exists at {}",
                        path.display()
                    )));
                }
                manager.create_tables()?;
            }
            OpenMode::CreateOrOpen => {
                if exists {
                    manager.open_tables_consistent().map_err(|e| {
                        DatabaseError::create(format!(
                            "{} holds tables that are not consistent",
                            path.display()
                        ))
                        .with_details(e.to_string())
                    })?;
                } else {
                    manager.create_tables()?;
                }
            }
            OpenMode::CreateOrOverwrite => {
                TableManager::remove_tables(path)?;
                manager.create_tables()?;
            }
        }
        Ok(())
    }

    /// Whether a failed recovery left `path` unusable for writers.
    pub fn is_marked_unrecoverable(path: &Path) -> bool {
        path.join(RECOVERY_FAILED_MARKER).exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Stages `doc` and returns its new id.
    pub fn add_document(&mut self, doc: &Document) -> DbResult<DocId> {
        let docid = self.batch.stage_add(doc)?;
        self.maybe_flush()?;
        Ok(docid)
    }

    pub fn replace_document(&mut self, docid: DocId, doc: &Document) -> DbResult<()> {
        self.batch.stage_replace(docid, doc)?;
        self.maybe_flush()
    }

    pub fn delete_document(&mut self, docid: DocId) -> DbResult<()> {
        self.batch.stage_delete(docid)?;
        self.maybe_flush()
    }

    fn maybe_flush(&mut self) -> DbResult<()> {
        if self.batch.pending_operations() >= self.config.flush_threshold {
            self.commit()?;
        }
        Ok(())
    }

    /// Writes every staged operation as one new revision.
    pub fn commit(&mut self) -> DbResult<CommitOutcome> {
        let result = self.batch.commit();
        if let Err(err) = &result {
            if self.batch.is_poisoned() {
                self.mark_unrecoverable(err);
            }
        }
        result
    }

    fn mark_unrecoverable(&self, err: &DatabaseError) {
        let path = self.path.join(RECOVERY_FAILED_MARKER);
        let body = serde_json::json!({
            "error": err.to_string(),
            "pid": std::process::id(),
            "at": Utc::now().to_rfc3339(),
        });

        let written = serde_json::to_vec(&body)
            .map_err(io::Error::from)
            .and_then(|bytes| {
                let mut file = File::create(&path)?;
                file.write_all(&bytes)?;
                file.sync_all()
            });
        if let Err(e) = written {
            let path_str = path.display().to_string();
            let reason = e.to_string();
            Logger::error(
                "RECOVERY_MARKER_WRITE_FAILED",
                &[("path", path_str.as_str()), ("reason", reason.as_str())],
            );
        }
    }

    /// Discards every staged operation.
    pub fn cancel(&mut self) -> DbResult<()> {
        self.batch.cancel()
    }

    /// Revision of the last commit; None once recovery has failed.
    pub fn revision(&self) -> Option<u64> {
        self.batch.revision()
    }

    pub fn is_modified(&self) -> bool {
        self.batch.is_modified()
    }

    pub fn pending_operations(&self) -> usize {
        self.batch.pending_operations()
    }

    pub fn is_poisoned(&self) -> bool {
        self.batch.is_poisoned()
    }

    pub fn stats(&self) -> DatabaseStats {
        self.batch.stats()
    }

    pub fn doc_count(&self) -> u32 {
        self.batch.stats().doc_count
    }

    pub fn last_docid(&self) -> DocId {
        self.batch.stats().last_docid
    }

    pub fn document(&mut self, docid: DocId) -> DbResult<StoredDocument> {
        lookup::document(self.batch.manager_mut(), docid)
    }

    pub fn value(&mut self, docid: DocId, slot: u32) -> DbResult<Option<Vec<u8>>> {
        lookup::value(self.batch.manager_mut(), docid, slot)
    }

    pub fn term_exists(&mut self, term: &str) -> DbResult<bool> {
        Ok(lookup::term_freq(self.batch.manager_mut(), term)? > 0)
    }

    pub fn term_freq(&mut self, term: &str) -> DbResult<u32> {
        lookup::term_freq(self.batch.manager_mut(), term)
    }

    pub fn postings(&mut self, term: &str) -> DbResult<Vec<Posting>> {
        lookup::postings(self.batch.manager_mut(), term)
    }

    pub fn positions(&mut self, docid: DocId, term: &str) -> DbResult<Vec<u32>> {
        lookup::positions(self.batch.manager_mut(), docid, term)
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        self.batch.manager().metrics()
    }

    /// One-shot failures for exercising recovery.
    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        self.batch.manager_mut().faults_mut()
    }

    /// Commits pending changes and releases the write lock.
    pub fn close(mut self) -> DbResult<()> {
        if !self.batch.is_poisoned() {
            self.commit()?;
        }
        self.lock.release()?;
        self.batch.manager().audit().record(AuditRecord::new(
            AuditAction::LockReleased,
            AuditOutcome::Success,
        ));
        Ok(())
    }
}

impl Drop for WritableDatabase {
    fn drop(&mut self) {
        if self.batch.is_poisoned() || !self.batch.is_modified() {
            return;
        }
        if let Err(e) = self.commit() {
            let reason = e.to_string();
            Logger::warn("WRITER_DROP_COMMIT_FAILED", &[("reason", reason.as_str())]);
        }
    }
}
