//! Observable protocol events
//!
//! Every step of the open/commit/recovery protocol that is worth a log line
//! has a typed event here.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Database lifecycle
    /// Tables created at revision 0
    DatabaseCreated,
    /// Consistent open attempt begins
    OpenBegin,
    /// A sibling table refused the records revision; retrying
    OpenRetry,
    /// All tables opened at one revision
    OpenConsistent,
    /// No consistent revision within the retry budget (FATAL)
    OpenCorrupt,

    // Commit
    /// Commit with nothing staged
    CommitNoop,
    /// One table advanced to the new revision
    TableApplied,
    /// A table failed to apply; recovery follows
    ApplyFailed,

    // Recovery
    /// Handles rewound to the last good revision
    RecoveryRewound,
    /// Every table restamped past the poisoned revision
    RecoveryRestamped,
    /// Recovery itself failed (FATAL)
    RecoveryFailed,
    /// Writer found a partially applied revision on open
    RepairNeeded,
    /// Partial revision restamped on open
    RepairComplete,

    // Write lock
    /// Lock marker created
    LockAcquired,
    /// Lock held by someone else; backing off
    LockContended,
    /// Lock marker removed
    LockReleased,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::DatabaseCreated => "DATABASE_CREATED",
            Event::OpenBegin => "OPEN_BEGIN",
            Event::OpenRetry => "OPEN_RETRY",
            Event::OpenConsistent => "OPEN_CONSISTENT",
            Event::OpenCorrupt => "OPEN_CORRUPT",

            Event::CommitNoop => "COMMIT_NO_MODIFICATIONS",
            Event::TableApplied => "TABLE_APPLIED",
            Event::ApplyFailed => "APPLY_FAILED",

            Event::RecoveryRewound => "RECOVERY_REWOUND",
            Event::RecoveryRestamped => "RECOVERY_RESTAMPED",
            Event::RecoveryFailed => "RECOVERY_FAILED",
            Event::RepairNeeded => "REPAIR_NEEDED",
            Event::RepairComplete => "REPAIR_COMPLETE",

            Event::LockAcquired => "LOCK_ACQUIRED",
            Event::LockContended => "LOCK_CONTENDED",
            Event::LockReleased => "LOCK_RELEASED",
        }
    }

    /// Returns true if this event means the database can't be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::OpenCorrupt | Event::RecoveryFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_are_upper_snake_case() {
        let events = [
            Event::DatabaseCreated,
            Event::OpenBegin,
            Event::OpenRetry,
            Event::OpenConsistent,
            Event::OpenCorrupt,
            Event::CommitNoop,
            Event::TableApplied,
            Event::ApplyFailed,
            Event::RecoveryRewound,
            Event::RecoveryRestamped,
            Event::RecoveryFailed,
            Event::RepairNeeded,
            Event::RepairComplete,
            Event::LockAcquired,
            Event::LockContended,
            Event::LockReleased,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::OpenCorrupt.is_fatal());
        assert!(Event::RecoveryFailed.is_fatal());
        assert!(!Event::ApplyFailed.is_fatal());
    }
}
