//! Read-only database handle

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::{DatabaseStats, DocId, Posting, StoredDocument};
use crate::config::DatabaseConfig;
use crate::errors::{DatabaseError, DbResult};
use crate::manager::{ManagerOptions, TableManager};
use crate::observability::MetricsRegistry;

use super::lookup;

/// A reader bound to one consistent revision.
///
/// Any number of readers may be open alongside a writer. A reader keeps
/// seeing its revision until `reopen`; if a writer overwrites that revision
/// underneath it, reads fail with `FLINT_DATABASE_MODIFIED`.
pub struct Database {
    path: PathBuf,
    manager: TableManager,
    revision: u64,
    stats: DatabaseStats,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("revision", &self.revision)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the database at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with_config(path, &DatabaseConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: &DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        if !TableManager::tables_exist(&path) {
            return Err(DatabaseError::opening(format!(
                "no database at {}",
                path.display()
            )));
        }

        let options = ManagerOptions {
            cache_reads: false,
            ..ManagerOptions::from(config)
        };
        let mut manager = TableManager::new(&path, options);
        let revision = manager.open_tables_consistent()?;
        let stats = lookup::stats(&mut manager)?;

        Ok(Self {
            path,
            manager,
            revision,
            stats,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revision this handle reads.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Moves to the latest consistent revision. Returns whether it changed.
    pub fn reopen(&mut self) -> DbResult<bool> {
        let revision = self.manager.open_tables_consistent()?;
        self.stats = lookup::stats(&mut self.manager)?;
        let moved = revision != self.revision;
        self.revision = revision;
        Ok(moved)
    }

    pub fn stats(&self) -> DatabaseStats {
        self.stats
    }

    pub fn doc_count(&self) -> u32 {
        self.stats.doc_count
    }

    pub fn last_docid(&self) -> DocId {
        self.stats.last_docid
    }

    pub fn total_length(&self) -> u64 {
        self.stats.total_length
    }

    pub fn average_length(&self) -> f64 {
        self.stats.average_length()
    }

    pub fn document(&mut self, docid: DocId) -> DbResult<StoredDocument> {
        lookup::document(&mut self.manager, docid)
    }

    pub fn value(&mut self, docid: DocId, slot: u32) -> DbResult<Option<Vec<u8>>> {
        lookup::value(&mut self.manager, docid, slot)
    }

    pub fn term_exists(&mut self, term: &str) -> DbResult<bool> {
        Ok(lookup::term_freq(&mut self.manager, term)? > 0)
    }

    /// Number of documents containing `term`.
    pub fn term_freq(&mut self, term: &str) -> DbResult<u32> {
        lookup::term_freq(&mut self.manager, term)
    }

    pub fn postings(&mut self, term: &str) -> DbResult<Vec<Posting>> {
        lookup::postings(&mut self.manager, term)
    }

    pub fn positions(&mut self, docid: DocId, term: &str) -> DbResult<Vec<u32>> {
        lookup::positions(&mut self.manager, docid, term)
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        self.manager.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ChangeBatch, Document};
    use crate::errors::DatabaseErrorCode;
    use crate::table::TableKind;
    use tempfile::tempdir;

    fn populate(root: &Path) {
        let mut manager = TableManager::new(root, ManagerOptions::default());
        manager.create_tables().unwrap();
        let mut batch = ChangeBatch::new(manager).unwrap();

        let mut doc = Document::with_data("first");
        doc.add_posting("foo", 1, 1);
        doc.add_posting("foo", 4, 1);
        doc.add_term("bar", 1);
        doc.add_value(0, "A");
        batch.stage_add(&doc).unwrap();
        batch.commit().unwrap();
    }

    #[test]
    fn test_open_missing_database() {
        let dir = tempdir().unwrap();
        let err = Database::open(dir.path().join("nothing")).unwrap_err();
        assert_eq!(err.code(), DatabaseErrorCode::FlintOpeningError);
    }

    #[test]
    fn test_reads_committed_document() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let mut db = Database::open(dir.path()).unwrap();
        assert_eq!(db.revision(), 1);
        assert_eq!(db.doc_count(), 1);
        assert_eq!(db.last_docid(), 1);
        assert_eq!(db.total_length(), 3);
        assert_eq!(db.average_length(), 3.0);

        let doc = db.document(1).unwrap();
        assert_eq!(doc.data, b"first");
        assert_eq!(doc.wdf("foo"), Some(2));
        assert_eq!(doc.value(0), Some(&b"A"[..]));

        assert!(db.term_exists("foo").unwrap());
        assert!(!db.term_exists("baz").unwrap());
        assert_eq!(db.term_freq("bar").unwrap(), 1);
        assert_eq!(db.positions(1, "foo").unwrap(), vec![1, 4]);
        assert!(db.positions(1, "bar").unwrap().is_empty());
        assert_eq!(db.value(1, 3).unwrap(), None);
    }

    #[test]
    fn test_repeated_reads_are_not_cached() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let mut db = Database::open(dir.path()).unwrap();
        for _ in 0..3 {
            db.document(1).unwrap();
            assert!(db.term_exists("foo").unwrap());
            assert!(!db.term_exists("missing").unwrap());
            db.postings("bar").unwrap();
        }

        for kind in TableKind::APPLY_ORDER {
            assert_eq!(db.manager.table(kind).cached_reads(), 0, "{}", kind);
        }
    }

    #[test]
    fn test_missing_document() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let mut db = Database::open(dir.path()).unwrap();
        assert_eq!(
            db.document(2).unwrap_err().code(),
            DatabaseErrorCode::FlintDocNotFound
        );
        assert_eq!(
            db.value(0, 0).unwrap_err().code(),
            DatabaseErrorCode::FlintDocNotFound
        );
    }

    #[test]
    fn test_reopen_reports_movement() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let mut db = Database::open(dir.path()).unwrap();
        assert!(!db.reopen().unwrap());

        let mut manager = TableManager::new(dir.path(), ManagerOptions::default());
        manager.open_tables_consistent().unwrap();
        let mut batch = ChangeBatch::new(manager).unwrap();
        batch.stage_add(&Document::with_data("second")).unwrap();
        batch.commit().unwrap();

        assert_eq!(db.doc_count(), 1);
        assert!(db.reopen().unwrap());
        assert_eq!(db.revision(), 2);
        assert_eq!(db.doc_count(), 2);
    }
}
