//! Commit protocol counters
//!
//! - Counters only
//! - Monotonic, reset only when the registry is created
//! - Lock-free atomic increments

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one writable database handle
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Commits that advanced the revision
    commits: AtomicU64,
    /// Commits with nothing staged
    noop_commits: AtomicU64,
    /// Table entries written by apply
    entries_applied: AtomicU64,
    /// Table applies that failed
    apply_failures: AtomicU64,
    /// Successful skip-past recoveries
    recoveries: AtomicU64,
    /// Recoveries that left storage unrecoverable
    recovery_failures: AtomicU64,
    /// Partial revisions restamped on open
    repairs: AtomicU64,
    /// Consistent-open attempts beyond the first
    open_retries: AtomicU64,
    /// Lock acquisition attempts beyond the first
    lock_retries: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_noop_commits(&self) {
        self.noop_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_entries_applied(&self, entries: u64) {
        self.entries_applied.fetch_add(entries, Ordering::Relaxed);
    }

    pub fn increment_apply_failures(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recoveries(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recovery_failures(&self) {
        self.recovery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_repairs(&self) {
        self.repairs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_open_retries(&self, retries: u64) {
        self.open_retries.fetch_add(retries, Ordering::Relaxed);
    }

    pub fn add_lock_retries(&self, retries: u64) {
        self.lock_retries.fetch_add(retries, Ordering::Relaxed);
    }

    /// Current values as one JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"commits":{},"noop_commits":{},"entries_applied":{},"apply_failures":{},"recoveries":{},"recovery_failures":{},"repairs":{},"open_retries":{},"lock_retries":{}}}"#,
            s.commits,
            s.noop_commits,
            s.entries_applied,
            s.apply_failures,
            s.recoveries,
            s.recovery_failures,
            s.repairs,
            s.open_retries,
            s.lock_retries,
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commits: self.commits.load(Ordering::Relaxed),
            noop_commits: self.noop_commits.load(Ordering::Relaxed),
            entries_applied: self.entries_applied.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            recovery_failures: self.recovery_failures.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
            open_retries: self.open_retries.load(Ordering::Relaxed),
            lock_retries: self.lock_retries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub commits: u64,
    pub noop_commits: u64,
    pub entries_applied: u64,
    pub apply_failures: u64,
    pub recoveries: u64,
    pub recovery_failures: u64,
    pub repairs: u64,
    pub open_retries: u64,
    pub lock_retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_commits();
        registry.increment_commits();
        registry.increment_noop_commits();
        registry.add_entries_applied(12);
        registry.increment_apply_failures();
        registry.increment_recoveries();
        registry.increment_repairs();
        registry.add_open_retries(3);
        registry.add_lock_retries(2);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.commits, 2);
        assert_eq!(snapshot.noop_commits, 1);
        assert_eq!(snapshot.entries_applied, 12);
        assert_eq!(snapshot.apply_failures, 1);
        assert_eq!(snapshot.recoveries, 1);
        assert_eq!(snapshot.recovery_failures, 0);
        assert_eq!(snapshot.repairs, 1);
        assert_eq!(snapshot.open_retries, 3);
        assert_eq!(snapshot.lock_retries, 2);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_entries_applied(40);
        registry.increment_commits();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["entries_applied"], 40);
        assert_eq!(parsed["commits"], 1);
        assert_eq!(parsed["recovery_failures"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_commits();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().commits, 1000);
    }
}
