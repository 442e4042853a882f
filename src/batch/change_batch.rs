//! Document-level staging and the atomic commit sequence
//!
//! # Commit sequence (strict order)
//!
//! 1. Nothing staged: log it, return `NoChanges`, touch nothing on disk
//! 2. `old = current revision`, `new = Postings latest + 1`
//! 3. Apply Postings, Positions, Terms, Values, Records as `new`
//! 4. Any apply fails:
//!    - discard every staged change
//!    - reopen every table at `old`
//!    - restamp every table as `new + 1`
//!    - return the apply error
//!
//! If the rewind or restamp fails the batch is poisoned and every later call
//! returns `FLINT_UNRECOVERABLE_STORAGE`.

use crate::crash_point::{maybe_crash, points};
use crate::errors::{DatabaseError, DatabaseErrorCode, DbResult};
use crate::manager::TableManager;
use crate::observability::{
    log_event_with_fields, AuditAction, AuditOutcome, AuditRecord, Event, ObservationScope,
};
use crate::table::TableKind;

use super::codec::{
    docid_key, position_key, DocId, PositionList, PostingList, TermEntry, TermList, ValueSet,
};
use super::document::Document;
use super::stats::{DatabaseStats, STATS_KEY};

/// Result of a successful `commit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was staged; no revision was written.
    NoChanges,
    Committed { revision: u64 },
}

/// Result of recovering from a failed apply
#[derive(Debug)]
pub enum RecoveryOutcome {
    /// Every table now stands at `revision`, past the failed one.
    Recovered { revision: u64 },
    /// Storage could not be brought back to a consistent revision.
    Failed(DatabaseError),
}

/// Stages document operations against a writable `TableManager` and commits
/// them as one revision.
pub struct ChangeBatch {
    manager: TableManager,
    stats: DatabaseStats,
    pending_ops: usize,
    poisoned: bool,
}

/// Committed statistics, or the empty statistics of a fresh database.
pub(crate) fn read_stats(manager: &mut TableManager) -> DbResult<DatabaseStats> {
    match manager.get(TableKind::Records, STATS_KEY)? {
        Some(tag) => Ok(DatabaseStats::decode(&tag)?),
        None => Ok(DatabaseStats::default()),
    }
}

impl ChangeBatch {
    /// Wraps a manager whose tables are open at a consistent revision.
    pub fn new(mut manager: TableManager) -> DbResult<Self> {
        if manager.current_revision().is_none() {
            return Err(DatabaseError::opening(
                "tables must be open at a consistent revision",
            ));
        }
        let stats = read_stats(&mut manager)?;
        Ok(Self {
            manager,
            stats,
            pending_ops: 0,
            poisoned: false,
        })
    }

    pub fn manager(&self) -> &TableManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut TableManager {
        &mut self.manager
    }

    /// Statistics including staged operations.
    pub fn stats(&self) -> DatabaseStats {
        self.stats
    }

    /// Document operations staged since the last commit or cancel.
    pub fn pending_operations(&self) -> usize {
        self.pending_ops
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_modified(&self) -> bool {
        self.manager.is_modified()
    }

    /// Revision of the last commit (or of the open, before any commit).
    pub fn revision(&self) -> Option<u64> {
        self.manager.current_revision()
    }

    fn ensure_usable(&self) -> DbResult<()> {
        if self.poisoned {
            return Err(DatabaseError::unrecoverable(
                "a previous commit could not be recovered; database must be repaired externally",
            ));
        }
        Ok(())
    }

    /// Whether `docid` exists in the committed plus staged state.
    pub fn exists(&mut self, docid: DocId) -> DbResult<bool> {
        if docid == 0 {
            return Ok(false);
        }
        Ok(self.manager.get(TableKind::Records, &docid_key(docid))?.is_some())
    }

    /// Stages `doc` under the next unused document id.
    pub fn stage_add(&mut self, doc: &Document) -> DbResult<DocId> {
        self.ensure_usable()?;
        let docid = self
            .stats
            .last_docid
            .checked_add(1)
            .ok_or_else(|| DatabaseError::invalid_argument("document id space exhausted"))?;

        self.write_document(docid, doc)?;
        self.stats.last_docid = docid;
        self.stats.doc_count += 1;
        self.stats.total_length += doc.length();
        self.finish_op();
        Ok(docid)
    }

    /// Stages `doc` under `docid`, replacing any document already there.
    pub fn stage_replace(&mut self, docid: DocId, doc: &Document) -> DbResult<()> {
        self.ensure_usable()?;
        if docid == 0 {
            return Err(DatabaseError::invalid_argument("document id 0 is reserved"));
        }

        if self.exists(docid)? {
            let old_length = self.remove_document(docid)?;
            self.stats.total_length = self.stats.total_length.saturating_sub(old_length);
            self.stats.doc_count = self.stats.doc_count.saturating_sub(1);
        }

        self.write_document(docid, doc)?;
        self.stats.doc_count += 1;
        self.stats.total_length += doc.length();
        self.stats.last_docid = self.stats.last_docid.max(docid);
        self.finish_op();
        Ok(())
    }

    /// Stages removal of `docid` from every table.
    pub fn stage_delete(&mut self, docid: DocId) -> DbResult<()> {
        self.ensure_usable()?;
        if !self.exists(docid)? {
            return Err(DatabaseError::doc_not_found(docid));
        }

        let old_length = self.remove_document(docid)?;
        self.stats.total_length = self.stats.total_length.saturating_sub(old_length);
        self.stats.doc_count = self.stats.doc_count.saturating_sub(1);
        self.finish_op();
        Ok(())
    }

    fn finish_op(&mut self) {
        self.manager
            .set(TableKind::Records, STATS_KEY.to_vec(), self.stats.encode());
        self.pending_ops += 1;
    }

    fn write_document(&mut self, docid: DocId, doc: &Document) -> DbResult<()> {
        let key = docid_key(docid);

        for (term, info) in doc.terms() {
            let tag = self
                .manager
                .table_mut(TableKind::Postings)
                .get_or_create(term.as_bytes())?;
            let mut list = PostingList::decode(tag)?;
            list.insert(docid, info.wdf);
            *tag = list.encode();

            if !info.positions.is_empty() {
                let positions = PositionList::from_sorted(info.positions.iter().copied());
                self.manager
                    .set(TableKind::Positions, position_key(docid, term), positions.encode());
            }
        }

        let terms = TermList {
            entries: doc
                .terms()
                .iter()
                .map(|(term, info)| TermEntry {
                    term: term.clone(),
                    wdf: info.wdf,
                })
                .collect(),
            doc_length: doc.length(),
        };
        self.manager
            .set(TableKind::Terms, key.clone(), terms.encode());

        if doc.values().is_empty() {
            self.manager.delete(TableKind::Values, key.clone());
        } else {
            let values = ValueSet(doc.values().clone());
            self.manager
                .set(TableKind::Values, key.clone(), values.encode());
        }

        self.manager
            .set(TableKind::Records, key, doc.data().to_vec());
        Ok(())
    }

    /// Stages removal of every trace of `docid`. Returns its length.
    fn remove_document(&mut self, docid: DocId) -> DbResult<u64> {
        let key = docid_key(docid);
        let terms = match self.manager.get(TableKind::Terms, &key)? {
            Some(tag) => TermList::decode(&tag)?,
            None => return Err(DatabaseError::doc_not_found(docid)),
        };

        for entry in &terms.entries {
            let postings = self.manager.table_mut(TableKind::Postings);
            let tag = postings.get_or_create(entry.term.as_bytes())?;
            let mut list = PostingList::decode(tag)?;
            list.remove(docid);
            if list.is_empty() {
                postings.delete(entry.term.as_bytes().to_vec());
            } else {
                *tag = list.encode();
            }

            self.manager
                .delete(TableKind::Positions, position_key(docid, &entry.term));
        }

        self.manager.delete(TableKind::Terms, key.clone());
        self.manager.delete(TableKind::Values, key.clone());
        self.manager.delete(TableKind::Records, key);
        Ok(terms.doc_length)
    }

    /// Writes every staged change as one new revision.
    ///
    /// On an apply failure the staged changes are lost, every table is
    /// restamped past the failed revision and the apply error is returned.
    pub fn commit(&mut self) -> DbResult<CommitOutcome> {
        self.ensure_usable()?;

        if !self.manager.is_modified() {
            self.pending_ops = 0;
            self.manager.metrics().increment_noop_commits();
            self.manager.audit().record(AuditRecord::new(
                AuditAction::CommitSkipped,
                AuditOutcome::Success,
            ));
            log_event_with_fields(Event::CommitNoop, &[("reason", "no modifications")]);
            return Ok(CommitOutcome::NoChanges);
        }

        let old_revision = self.manager.current_revision().ok_or_else(|| {
            DatabaseError::opening("tables are not open at a consistent revision")
        })?;
        let new_revision = self.manager.next_revision_number()?;

        let rev = new_revision.to_string();
        let ops = self.pending_ops.to_string();
        let scope =
            ObservationScope::with_fields("COMMIT", &[("operations", ops.as_str()), ("revision", rev.as_str())]);

        match self.apply_all(new_revision) {
            Ok(()) => {
                self.manager.mark_consistent(new_revision);
                self.manager.metrics().increment_commits();
                self.pending_ops = 0;
                scope.complete();
                Ok(CommitOutcome::Committed {
                    revision: new_revision,
                })
            }
            Err(original) => {
                scope.fail(original.message());
                match self.recover(old_revision, new_revision, &original) {
                    RecoveryOutcome::Recovered { .. } => Err(original),
                    RecoveryOutcome::Failed(err) => {
                        self.poisoned = true;
                        Err(err)
                    }
                }
            }
        }
    }

    fn apply_all(&mut self, new_revision: u64) -> DbResult<()> {
        for kind in TableKind::APPLY_ORDER {
            if kind == TableKind::Records {
                maybe_crash(points::COMMIT_BEFORE_RECORDS);
            }
            self.manager.apply_table(kind, new_revision)?;
            if kind == TableKind::Postings {
                maybe_crash(points::COMMIT_AFTER_POSTINGS);
            }
        }
        maybe_crash(points::COMMIT_AFTER_RECORDS);
        Ok(())
    }

    /// Skip past `failed_revision` so it is never visible or reused.
    fn recover(
        &mut self,
        old_revision: u64,
        failed_revision: u64,
        original: &DatabaseError,
    ) -> RecoveryOutcome {
        let failed = failed_revision.to_string();
        log_event_with_fields(
            Event::ApplyFailed,
            &[
                ("reason", "attempted modifications failed; wiping partial modifications"),
                ("revision", failed.as_str()),
            ],
        );
        self.manager.audit().record(
            AuditRecord::new(AuditAction::RecoveryStart, AuditOutcome::Pending)
                .with_revision(failed_revision)
                .with_error(original.to_string()),
        );

        let scope = ObservationScope::with_fields("RECOVERY", &[("revision", failed.as_str())]);
        match self.rewind_and_restamp(old_revision, failed_revision) {
            Ok(revision) => {
                self.manager.metrics().increment_recoveries();
                self.manager.audit().record(
                    AuditRecord::new(AuditAction::RecoverySuccess, AuditOutcome::Success)
                        .with_revision(revision),
                );
                let rev = revision.to_string();
                log_event_with_fields(
                    Event::RecoveryRestamped,
                    &[("revision", rev.as_str()), ("skipped", failed.as_str())],
                );
                scope.complete();
                RecoveryOutcome::Recovered { revision }
            }
            Err(cause) => {
                self.manager.metrics().increment_recovery_failures();
                self.manager.audit().record(
                    AuditRecord::new(AuditAction::RecoveryFailed, AuditOutcome::Failed)
                        .with_revision(failed_revision)
                        .with_error(cause.to_string()),
                );
                log_event_with_fields(
                    Event::RecoveryFailed,
                    &[("reason", cause.message()), ("revision", failed.as_str())],
                );
                scope.fail_fatal(cause.message());
                RecoveryOutcome::Failed(DatabaseError::unrecoverable_after(original, cause))
            }
        }
    }

    fn rewind_and_restamp(&mut self, old_revision: u64, failed_revision: u64) -> DbResult<u64> {
        self.manager.cancel();
        self.pending_ops = 0;

        self.manager.open_tables(old_revision)?;
        maybe_crash(points::RECOVERY_AFTER_REWIND);
        let old = old_revision.to_string();
        log_event_with_fields(Event::RecoveryRewound, &[("revision", old.as_str())]);

        let new_revision = failed_revision + 1;
        self.manager.force_set_revision(new_revision)?;
        maybe_crash(points::RECOVERY_AFTER_RESTAMP);

        self.stats = read_stats(&mut self.manager)?;
        Ok(new_revision)
    }

    /// Discards every staged operation.
    pub fn cancel(&mut self) -> DbResult<()> {
        self.ensure_usable()?;
        self.manager.cancel();
        self.pending_ops = 0;
        self.stats = read_stats(&mut self.manager)?;
        Ok(())
    }

    /// Whether this error left the batch unusable.
    pub fn is_unrecoverable(err: &DatabaseError) -> bool {
        err.code() == DatabaseErrorCode::FlintUnrecoverableStorage
    }
}
