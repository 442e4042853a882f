//! Cross-table consistency protocol
//!
//! `TableManager` owns one `VersionedTable` per `TableKind` under a database
//! root and keeps them at a single shared revision:
//!
//! - Readers open Records first and bind every sibling to its revision,
//!   retrying with Records' new revision if a writer moved it underneath.
//! - A writer applies tables in `TableKind::APPLY_ORDER`; the next revision
//!   always comes from Postings, which is applied first.
//! - Restamping writes every table's opened content under a fresh revision,
//!   which is how a half-applied revision is abandoned.

mod fault;

pub use fault::FaultPlan;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::crash_point::{maybe_crash, points};
use crate::errors::{DatabaseError, DbResult};
use crate::observability::{
    log_event_with_fields, AuditAction, AuditOutcome, AuditRecord, AuditTrail, Event,
    MetricsRegistry,
};
use crate::table::{Key, TableError, TableKind, Tag, VersionedTable};

/// Manager tunables
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub open_retry_budget: u32,
    pub sync: bool,
    /// Cache tags read from disk until the next apply
    pub cache_reads: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            open_retry_budget: 100,
            sync: true,
            cache_reads: true,
        }
    }
}

impl From<&DatabaseConfig> for ManagerOptions {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            open_retry_budget: config.open_retry_budget,
            sync: config.sync(),
            cache_reads: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Closed,
    /// Every table is open at this revision.
    Consistent(u64),
    /// An open or apply failed part way; handles must be reopened.
    Inconsistent,
}

pub struct TableManager {
    root: PathBuf,
    tables: Vec<VersionedTable>,
    state: ManagerState,
    options: ManagerOptions,
    audit: AuditTrail,
    metrics: Arc<MetricsRegistry>,
    faults: FaultPlan,
}

impl TableManager {
    /// Handles for every table under `root`. Nothing is opened.
    pub fn new(root: impl AsRef<Path>, options: ManagerOptions) -> Self {
        let root = root.as_ref().to_path_buf();
        let tables = TableKind::APPLY_ORDER
            .iter()
            .map(|kind| {
                VersionedTable::new(*kind, root.join(kind.dir_name()), options.sync)
                    .with_read_cache(options.cache_reads)
            })
            .collect();

        Self {
            root,
            tables,
            state: ManagerState::Closed,
            options,
            audit: AuditTrail::disabled(),
            metrics: Arc::new(MetricsRegistry::new()),
            faults: FaultPlan::new(),
        }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether any table has been provisioned under `root`.
    pub fn tables_exist(root: &Path) -> bool {
        TableKind::APPLY_ORDER
            .iter()
            .any(|kind| VersionedTable::exists(&root.join(kind.dir_name())))
    }

    /// Deletes every table directory under `root`.
    pub fn remove_tables(root: &Path) -> DbResult<()> {
        for kind in TableKind::APPLY_ORDER {
            let dir = root.join(kind.dir_name());
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(DatabaseError::create_from(
                        format!("Failed to remove {} table", kind),
                        TableError::io_error(format!("remove {}", dir.display()), e)
                            .for_table(kind),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Provisions every table at revision 0 and opens them there.
    pub fn create_tables(&mut self) -> DbResult<()> {
        for kind in TableKind::APPLY_ORDER {
            let table =
                VersionedTable::create(kind, self.root.join(kind.dir_name()), self.options.sync)
                    .map_err(|e| {
                        DatabaseError::create_from(format!("Failed to create {} table", kind), e)
                    })?;
            self.tables[kind.index()] = table.with_read_cache(self.options.cache_reads);
        }
        self.open_tables(0)?;

        let root = self.root.display().to_string();
        log_event_with_fields(Event::DatabaseCreated, &[("path", root.as_str())]);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Revision every table is open at, if consistent.
    pub fn current_revision(&self) -> Option<u64> {
        match self.state {
            ManagerState::Consistent(revision) => Some(revision),
            _ => None,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    pub fn table(&self, kind: TableKind) -> &VersionedTable {
        &self.tables[kind.index()]
    }

    pub fn table_mut(&mut self, kind: TableKind) -> &mut VersionedTable {
        &mut self.tables[kind.index()]
    }

    /// Staged-then-committed lookup in one table.
    pub fn get(&mut self, kind: TableKind, key: &[u8]) -> DbResult<Option<Tag>> {
        Ok(self.tables[kind.index()].get(key)?)
    }

    pub fn set(&mut self, kind: TableKind, key: impl Into<Key>, tag: Tag) {
        self.tables[kind.index()].set(key, tag);
    }

    pub fn delete(&mut self, kind: TableKind, key: impl Into<Key>) {
        self.tables[kind.index()].delete(key);
    }

    /// Whether any table has staged changes.
    pub fn is_modified(&self) -> bool {
        self.tables.iter().any(|table| table.is_modified())
    }

    /// Discards staged changes in every table.
    pub fn cancel(&mut self) {
        for table in &mut self.tables {
            table.cancel();
        }
    }

    pub fn close(&mut self) {
        for table in &mut self.tables {
            table.close();
        }
        self.state = ManagerState::Closed;
    }

    /// Opens every table at `revision`, Records first. On failure all
    /// handles are closed.
    pub fn open_tables(&mut self, revision: u64) -> DbResult<()> {
        let tables = &mut self.tables;
        let result = std::iter::once(TableKind::Records)
            .chain(
                TableKind::APPLY_ORDER
                    .into_iter()
                    .filter(|kind| *kind != TableKind::Records),
            )
            .try_for_each(|kind| tables[kind.index()].open(revision));

        match result {
            Ok(()) => {
                self.state = ManagerState::Consistent(revision);
                Ok(())
            }
            Err(e) => {
                for table in &mut self.tables {
                    table.close();
                }
                self.state = ManagerState::Inconsistent;
                Err(e.into())
            }
        }
    }

    /// Opens every table at Records' revision, following Records forward if
    /// a writer advances it mid-open.
    pub fn open_tables_consistent(&mut self) -> DbResult<u64> {
        let budget = self.options.open_retry_budget.max(1);
        let mut revision = self.records_latest()?;
        let mut attempts = 0u32;

        let start = revision.to_string();
        log_event_with_fields(Event::OpenBegin, &[("revision", start.as_str())]);

        loop {
            attempts += 1;
            let err = match self.open_tables(revision) {
                Ok(()) => {
                    self.audit.record(
                        AuditRecord::new(AuditAction::OpenAttempt, AuditOutcome::Success)
                            .with_revision(revision),
                    );
                    if attempts > 1 {
                        self.metrics.add_open_retries(u64::from(attempts - 1));
                    }
                    let rev = revision.to_string();
                    let tries = attempts.to_string();
                    log_event_with_fields(
                        Event::OpenConsistent,
                        &[("attempts", tries.as_str()), ("revision", rev.as_str())],
                    );
                    return Ok(revision);
                }
                Err(e) => e,
            };

            self.audit.record(
                AuditRecord::new(AuditAction::OpenAttempt, AuditOutcome::Failed)
                    .with_revision(revision)
                    .with_error(err.to_string()),
            );

            let latest = self.records_latest()?;
            if latest == revision {
                return Err(self.open_corrupt(
                    format!("tables are not consistent at revision {}", revision),
                    &err,
                ));
            }
            if attempts >= budget {
                return Err(self.open_corrupt(
                    format!("no consistent revision after {} attempts", attempts),
                    &err,
                ));
            }

            let from = revision.to_string();
            let to = latest.to_string();
            log_event_with_fields(
                Event::OpenRetry,
                &[("from", from.as_str()), ("reason", err.message()), ("to", to.as_str())],
            );
            revision = latest;
        }
    }

    fn open_corrupt(&self, message: String, last: &DatabaseError) -> DatabaseError {
        let root = self.root.display().to_string();
        log_event_with_fields(
            Event::OpenCorrupt,
            &[("path", root.as_str()), ("reason", message.as_str())],
        );
        DatabaseError::corrupt(message).with_details(last.to_string())
    }

    fn records_latest(&self) -> DbResult<u64> {
        Ok(self.tables[TableKind::Records.index()].latest_revision_number()?)
    }

    /// One past the highest revision Postings has ever recorded.
    pub fn next_revision_number(&self) -> DbResult<u64> {
        let latest = self.tables[TableKind::Postings.index()].latest_revision_number()?;
        Ok(latest + 1)
    }

    /// Highest stored revision of every table, in apply order.
    pub fn latest_revisions(&self) -> DbResult<Vec<(TableKind, u64)>> {
        let mut revisions = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let latest = table.latest_revision_number()?;
            self.audit.record(
                AuditRecord::new(AuditAction::RevisionObserved, AuditOutcome::Success)
                    .with_table(table.kind().dir_name())
                    .with_revision(latest),
            );
            revisions.push((table.kind(), latest));
        }
        Ok(revisions)
    }

    /// Applies one table's staged changes as `new_revision`.
    pub fn apply_table(&mut self, kind: TableKind, new_revision: u64) -> DbResult<()> {
        let inject = self.faults.take_apply(kind);
        let table = &mut self.tables[kind.index()];
        if inject {
            table.arm_apply_failure();
        }
        let pending = table.pending_changes() as u64;

        self.audit.record(
            AuditRecord::new(AuditAction::ApplyStart, AuditOutcome::Pending)
                .with_table(kind.dir_name())
                .with_revision(new_revision),
        );

        match table.apply(new_revision) {
            Ok(()) => {
                self.metrics.add_entries_applied(pending);
                self.audit.record(
                    AuditRecord::new(AuditAction::ApplySuccess, AuditOutcome::Success)
                        .with_table(kind.dir_name())
                        .with_revision(new_revision),
                );
                let rev = new_revision.to_string();
                let entries = pending.to_string();
                log_event_with_fields(
                    Event::TableApplied,
                    &[
                        ("entries", entries.as_str()),
                        ("revision", rev.as_str()),
                        ("table", kind.dir_name()),
                    ],
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.increment_apply_failures();
                self.state = ManagerState::Inconsistent;
                let reason = e.to_string();
                self.audit.record(
                    AuditRecord::new(AuditAction::ApplyFailed, AuditOutcome::Failed)
                        .with_table(kind.dir_name())
                        .with_revision(new_revision)
                        .with_error(reason.as_str()),
                );
                let rev = new_revision.to_string();
                log_event_with_fields(
                    Event::ApplyFailed,
                    &[
                        ("reason", reason.as_str()),
                        ("revision", rev.as_str()),
                        ("table", kind.dir_name()),
                    ],
                );
                Err(e.into())
            }
        }
    }

    /// Records that every table now stands at `revision`.
    pub(crate) fn mark_consistent(&mut self, revision: u64) {
        self.state = ManagerState::Consistent(revision);
    }

    /// Stamps every table's opened content as `new_revision`.
    pub fn force_set_revision(&mut self, new_revision: u64) -> DbResult<()> {
        if self.faults.take_restamp() {
            self.tables[TableKind::Postings.index()].arm_apply_failure();
        }

        for kind in TableKind::APPLY_ORDER {
            if let Err(e) = self.tables[kind.index()].force_set_revision(new_revision) {
                self.state = ManagerState::Inconsistent;
                return Err(e.into());
            }
        }
        self.state = ManagerState::Consistent(new_revision);
        Ok(())
    }

    /// Restamps past a revision a previous writer left half applied.
    ///
    /// Returns the new revision if a repair was needed.
    pub fn repair_partial_revision(&mut self) -> DbResult<Option<u64>> {
        let current = self
            .current_revision()
            .ok_or_else(|| DatabaseError::opening("tables are not open at a consistent revision"))?;

        let ahead: Vec<String> = self
            .latest_revisions()?
            .into_iter()
            .filter(|(_, latest)| *latest > current)
            .map(|(kind, latest)| format!("{}={}", kind, latest))
            .collect();
        if ahead.is_empty() {
            return Ok(None);
        }

        let rev = current.to_string();
        let tables = ahead.join(",");
        log_event_with_fields(
            Event::RepairNeeded,
            &[("revision", rev.as_str()), ("tables", tables.as_str())],
        );
        maybe_crash(points::REPAIR_BEFORE_RESTAMP);

        let new_revision = self.next_revision_number()?;
        if let Err(e) = self.force_set_revision(new_revision) {
            self.audit.record(
                AuditRecord::new(AuditAction::Repair, AuditOutcome::Failed)
                    .with_revision(new_revision)
                    .with_error(e.to_string()),
            );
            return Err(e);
        }

        self.metrics.increment_repairs();
        self.audit.record(
            AuditRecord::new(AuditAction::Repair, AuditOutcome::Success)
                .with_revision(new_revision),
        );
        let new_rev = new_revision.to_string();
        log_event_with_fields(Event::RepairComplete, &[("revision", new_rev.as_str())]);
        Ok(Some(new_revision))
    }
}
