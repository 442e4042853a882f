//! Crash point injection for durability testing
//!
//! Setting `FLINTDB_CRASH_POINT=<name>` makes the process abort the moment
//! execution reaches that named point: no cleanup, no unwinding, no lock
//! release. A test harness then reopens the directory and checks that the
//! tables come back consistent.
//!
//! # Usage
//!
//! ```ignore
//! use flintdb::crash_point::{maybe_crash, points};
//!
//! maybe_crash(points::COMMIT_BEFORE_RECORDS);
//! ```
//!
//! ```bash
//! FLINTDB_CRASH_POINT=commit_before_records ./indexer
//! ```

use std::sync::OnceLock;

/// Environment variable naming the armed crash point
pub const CRASH_POINT_ENV: &str = "FLINTDB_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if `FLINTDB_CRASH_POINT` equals `name`.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Aborts the process if the named crash point is armed.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Table
    pub const TABLE_AFTER_DATA_WRITE: &str = "table_after_data_write";
    pub const SLOT_BEFORE_RENAME: &str = "slot_before_rename";
    pub const TABLE_AFTER_SLOT_WRITE: &str = "table_after_slot_write";

    // Commit sequence
    pub const COMMIT_AFTER_POSTINGS: &str = "commit_after_postings";
    pub const COMMIT_BEFORE_RECORDS: &str = "commit_before_records";
    pub const COMMIT_AFTER_RECORDS: &str = "commit_after_records";

    // Recovery
    pub const RECOVERY_AFTER_REWIND: &str = "recovery_after_rewind";
    pub const RECOVERY_AFTER_RESTAMP: &str = "recovery_after_restamp";
    pub const REPAIR_BEFORE_RESTAMP: &str = "repair_before_restamp";

    // Lock
    pub const LOCK_AFTER_ACQUIRE: &str = "lock_after_acquire";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            TABLE_AFTER_DATA_WRITE,
            SLOT_BEFORE_RENAME,
            TABLE_AFTER_SLOT_WRITE,
            COMMIT_AFTER_POSTINGS,
            COMMIT_BEFORE_RECORDS,
            COMMIT_AFTER_RECORDS,
            RECOVERY_AFTER_REWIND,
            RECOVERY_AFTER_RESTAMP,
            REPAIR_BEFORE_RESTAMP,
            LOCK_AFTER_ACQUIRE,
        ]
    }
}
