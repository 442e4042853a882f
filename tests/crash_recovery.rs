//! Crash safety of the commit protocol.
//!
//! Each scenario re-runs this binary as a child with a crash point armed.
//! The child aborts mid-protocol, leaving the directory exactly as a killed
//! writer would; the parent then checks what readers and the next writer see.

mod common;

use common::{child_dir, doc, remove_stale_lock, run_crash_child, table_revisions, test_config, writer};
use flintdb::crash_point::points;
use flintdb::{Database, DatabaseErrorCode, OpenMode, TableKind, WritableDatabase};
use tempfile::TempDir;

// =============================================================================
// Child processes (no-ops unless launched by a scenario)
// =============================================================================

#[test]
fn crash_child_commit() {
    let Some(dir) = child_dir() else { return };
    let mut db = writer(&dir);
    db.add_document(&doc("lost", "B")).unwrap();
    let _ = db.commit();
}

#[test]
fn crash_child_failed_commit() {
    let Some(dir) = child_dir() else { return };
    let mut db = writer(&dir);
    db.add_document(&doc("lost", "B")).unwrap();
    db.faults_mut().inject_apply_failure(TableKind::Values);
    let _ = db.commit();
}

#[test]
fn crash_child_open() {
    let Some(dir) = child_dir() else { return };
    let _db = writer(&dir);
}

// =============================================================================
// Helpers
// =============================================================================

/// One committed document at revision 1.
fn seeded() -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut db = writer(dir.path());
    db.add_document(&doc("foo", "A")).unwrap();
    db.commit().unwrap();
    db.close().unwrap();
    dir
}

fn crash(child: &str, point: &str, dir: &TempDir) {
    let output = run_crash_child(child, point, dir.path());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "{} did not crash at {}", child, point);
    assert!(stderr.contains(point), "unexpected child stderr: {}", stderr);
    remove_stale_lock(dir.path());
}

fn assert_only_first_document(dir: &TempDir) {
    let mut reader = Database::open(dir.path()).unwrap();
    assert_eq!(reader.doc_count(), 1);
    assert!(reader.term_exists("foo").unwrap());
    assert!(!reader.term_exists("lost").unwrap());
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn crash_before_records_is_invisible_and_repaired() {
    for point in [points::COMMIT_AFTER_POSTINGS, points::COMMIT_BEFORE_RECORDS] {
        let dir = seeded();
        crash("crash_child_commit", point, &dir);

        let revisions = table_revisions(dir.path());
        assert_eq!(revisions[TableKind::Postings.index()], 2, "{}", point);
        assert_eq!(revisions[TableKind::Records.index()], 1, "{}", point);

        let reader = Database::open(dir.path()).unwrap();
        assert_eq!(reader.revision(), 1, "{}", point);
        assert_only_first_document(&dir);

        let mut db = writer(dir.path());
        assert_eq!(db.revision(), Some(3), "{}", point);
        assert_eq!(db.metrics().snapshot().repairs, 1);
        assert_eq!(table_revisions(dir.path()), vec![3; 5], "{}", point);

        assert_eq!(db.add_document(&doc("bar", "C")).unwrap(), 2);
        db.commit().unwrap();
        assert_eq!(db.revision(), Some(4));
        db.close().unwrap();
    }
}

#[test]
fn crash_after_records_keeps_the_commit() {
    let dir = seeded();
    crash("crash_child_commit", points::COMMIT_AFTER_RECORDS, &dir);

    assert_eq!(table_revisions(dir.path()), vec![2; 5]);
    let mut reader = Database::open(dir.path()).unwrap();
    assert_eq!(reader.revision(), 2);
    assert_eq!(reader.doc_count(), 2);
    assert!(reader.term_exists("lost").unwrap());

    let db = writer(dir.path());
    assert_eq!(db.revision(), Some(2));
    assert_eq!(db.metrics().snapshot().repairs, 0);
}

#[test]
fn crash_between_rewind_and_restamp_is_repaired() {
    let dir = seeded();
    crash("crash_child_failed_commit", points::RECOVERY_AFTER_REWIND, &dir);

    assert_eq!(table_revisions(dir.path()), vec![2, 2, 2, 1, 1]);
    assert_eq!(Database::open(dir.path()).unwrap().revision(), 1);
    assert_only_first_document(&dir);

    let db = writer(dir.path());
    assert_eq!(db.revision(), Some(3));
    assert_eq!(db.doc_count(), 1);
}

#[test]
fn crash_after_restamp_needs_no_repair() {
    let dir = seeded();
    crash("crash_child_failed_commit", points::RECOVERY_AFTER_RESTAMP, &dir);

    assert_eq!(table_revisions(dir.path()), vec![3; 5]);
    assert_only_first_document(&dir);

    let db = writer(dir.path());
    assert_eq!(db.revision(), Some(3));
    assert_eq!(db.metrics().snapshot().repairs, 0);
}

#[test]
fn crash_during_slot_write_leaves_prior_revision() {
    for point in [points::TABLE_AFTER_DATA_WRITE, points::SLOT_BEFORE_RENAME] {
        let dir = seeded();
        crash("crash_child_commit", point, &dir);

        // Postings was the first table written; its slot never landed.
        assert_eq!(table_revisions(dir.path()), vec![1; 5], "{}", point);
        assert_only_first_document(&dir);

        let mut db = writer(dir.path());
        db.add_document(&doc("bar", "C")).unwrap();
        db.commit().unwrap();
        assert_eq!(db.revision(), Some(2), "{}", point);
        db.close().unwrap();

        let mut reader = Database::open(dir.path()).unwrap();
        assert_eq!(reader.doc_count(), 2);
        assert_eq!(reader.postings("bar").unwrap().len(), 1);
    }
}

#[test]
fn crash_before_repair_is_repaired_by_the_next_writer() {
    let dir = seeded();
    crash("crash_child_commit", points::COMMIT_BEFORE_RECORDS, &dir);
    crash("crash_child_open", points::REPAIR_BEFORE_RESTAMP, &dir);

    assert_eq!(table_revisions(dir.path())[TableKind::Records.index()], 1);
    let db = writer(dir.path());
    assert_eq!(db.revision(), Some(3));
}

#[test]
fn stale_lock_blocks_writers_until_removed() {
    let dir = seeded();
    let output = run_crash_child("crash_child_open", points::LOCK_AFTER_ACQUIRE, dir.path());
    assert!(!output.status.success());

    let err = WritableDatabase::open_with_config(dir.path(), OpenMode::Open, test_config())
        .err()
        .unwrap();
    assert_eq!(err.code(), DatabaseErrorCode::FlintLockError);

    // Readers never take the lock.
    assert_only_first_document(&dir);

    remove_stale_lock(dir.path());
    let db = writer(dir.path());
    assert_eq!(db.revision(), Some(1));
}
