//! Shared helpers for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use flintdb::crash_point::CRASH_POINT_ENV;
use flintdb::lock::LOCK_FILE;
use flintdb::manager::{ManagerOptions, TableManager};
use flintdb::{DatabaseConfig, Document, OpenMode, WritableDatabase};

/// Set in a child process to the database directory it should write to.
pub const CHILD_DIR_ENV: &str = "FLINTDB_TEST_CHILD_DIR";

/// Fast settings: no fsync, no lock retries.
pub fn test_config() -> DatabaseConfig {
    DatabaseConfig {
        sync_mode: "none".to_string(),
        lock_retries: 0,
        lock_retry_delay_ms: 1,
        ..DatabaseConfig::default()
    }
}

pub fn writer(dir: &Path) -> WritableDatabase {
    WritableDatabase::open_with_config(dir, OpenMode::CreateOrOpen, test_config())
        .unwrap_or_else(|e| panic!("writer open failed: {}", e))
}

/// A document holding `term` at position 1 and `value` in slot 0.
pub fn doc(term: &str, value: &str) -> Document {
    let mut doc = Document::with_data(format!("{}:{}", term, value));
    doc.add_posting(term, 1, 1);
    doc.add_value(0, value);
    doc
}

/// Highest stored revision of every table, in apply order.
pub fn table_revisions(dir: &Path) -> Vec<u64> {
    TableManager::new(dir, ManagerOptions::default())
        .latest_revisions()
        .unwrap()
        .into_iter()
        .map(|(_, revision)| revision)
        .collect()
}

/// Audit actions in file order.
pub fn audit_actions(dir: &Path) -> Vec<serde_json::Value> {
    let text = fs::read_to_string(dir.join("audit.log")).unwrap_or_default();
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// The child test's database directory, if this process is a crash child.
pub fn child_dir() -> Option<PathBuf> {
    std::env::var_os(CHILD_DIR_ENV).map(PathBuf::from)
}

/// Re-runs this test binary, executing only `test_name` with `crash_point`
/// armed against `dir`.
pub fn run_crash_child(test_name: &str, crash_point: &str, dir: &Path) -> Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args(["--exact", test_name, "--nocapture", "--test-threads=1"])
        .env(CRASH_POINT_ENV, crash_point)
        .env(CHILD_DIR_ENV, dir)
        .output()
        .unwrap()
}

/// Clears the marker a killed writer leaves behind.
pub fn remove_stale_lock(dir: &Path) {
    let _ = fs::remove_file(dir.join(LOCK_FILE));
}
