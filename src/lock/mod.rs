//! Single-writer lock for a database directory
//!
//! A writer owns the directory while the `flintlock` marker file exists and
//! records its token. Acquisition retries a bounded number of times with
//! exponential backoff plus jitter, then fails with `LockError::Contended`.
//!
//! Release removes the marker, and runs on drop. A process killed while
//! holding the lock leaves a stale marker behind that must be removed by hand.

mod backend;
mod errors;
mod owner;

pub use backend::{HardlinkBackend, LockBackend, LockBackendKind, RenameBackend, PENDING_FILE};
pub use errors::{LockError, LockResult};
pub use owner::LockOwner;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::crash_point::{maybe_crash, points};
use crate::observability::{log_event_with_fields, Event};

/// Lock marker file name under the database root
pub const LOCK_FILE: &str = "flintlock";

/// Acquisition policy
#[derive(Debug, Clone)]
pub struct LockOptions {
    pub backend: LockBackendKind,
    /// Attempts after the first
    pub retries: u32,
    /// Base delay, doubled each retry
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            backend: LockBackendKind::Hardlink,
            retries: 5,
            retry_delay: Duration::from_millis(20),
        }
    }
}

impl LockOptions {
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.retry_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_cap = self.retry_delay.as_millis() as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Held write lock. Released on drop.
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
    owner: LockOwner,
    attempts: u32,
    held: bool,
}

impl WriteLock {
    /// Acquires the lock on `dir`, which must exist.
    pub fn acquire(dir: &Path, options: &LockOptions) -> LockResult<Self> {
        let path = dir.join(LOCK_FILE);
        let owner = LockOwner::current();
        let contents = owner
            .to_bytes()
            .map_err(|e| LockError::io(&path, io::Error::from(e)))?;
        let tag = owner.token.simple().to_string();
        let backend = options.backend.backend();
        let path_str = path.display().to_string();

        let mut attempt = 0;
        loop {
            let created = backend
                .try_create(&path, &contents, &tag)
                .map_err(|e| LockError::io(&path, e))?;

            if created {
                let attempts = (attempt + 1).to_string();
                log_event_with_fields(
                    Event::LockAcquired,
                    &[
                        ("attempts", attempts.as_str()),
                        ("backend", options.backend.as_str()),
                        ("path", path_str.as_str()),
                    ],
                );
                maybe_crash(points::LOCK_AFTER_ACQUIRE);
                return Ok(Self {
                    path,
                    owner,
                    attempts: attempt + 1,
                    held: true,
                });
            }

            if attempt >= options.retries {
                let holder = LockOwner::read(&path)
                    .map(|o| o.describe())
                    .unwrap_or_else(|| "an unknown writer".to_string());
                return Err(LockError::Contended {
                    path,
                    owner: holder,
                    attempts: attempt + 1,
                });
            }

            let delay = options.delay_for(attempt);
            let delay_ms = delay.as_millis().to_string();
            log_event_with_fields(
                Event::LockContended,
                &[("delay_ms", delay_ms.as_str()), ("path", path_str.as_str())],
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Attempts it took to acquire, including the successful one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Removes the marker if it still carries this handle's token.
    pub fn release(&mut self) -> LockResult<()> {
        if !self.held {
            return Err(LockError::NotHeld(self.path.clone()));
        }
        self.held = false;

        match LockOwner::read(&self.path) {
            Some(current) if current.token == self.owner.token => {}
            _ => return Err(LockError::NotHeld(self.path.clone())),
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(LockError::io(&self.path, e)),
        }

        let path_str = self.path.display().to_string();
        log_event_with_fields(Event::LockReleased, &[("path", path_str.as_str())]);
        Ok(())
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if self.held {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn quick(backend: LockBackendKind) -> LockOptions {
        LockOptions {
            backend,
            retries: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let mut lock = WriteLock::acquire(dir.path(), &quick(LockBackendKind::Hardlink)).unwrap();

        assert!(lock.is_held());
        assert_eq!(lock.attempts(), 1);
        assert!(dir.path().join(LOCK_FILE).exists());

        lock.release().unwrap();
        assert!(!dir.path().join(LOCK_FILE).exists());
        assert!(matches!(lock.release(), Err(LockError::NotHeld(_))));
    }

    #[test]
    fn test_second_writer_is_refused() {
        for backend in [LockBackendKind::Hardlink, LockBackendKind::Rename] {
            let dir = tempdir().unwrap();
            let _first = WriteLock::acquire(dir.path(), &quick(backend)).unwrap();

            let err = WriteLock::acquire(dir.path(), &quick(backend)).unwrap_err();
            match err {
                LockError::Contended { attempts, owner, .. } => {
                    assert_eq!(attempts, 3);
                    assert!(owner.contains("pid"));
                }
                other => panic!("expected contention, got {}", other),
            }
        }
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempdir().unwrap();
        {
            let _lock = WriteLock::acquire(dir.path(), &quick(LockBackendKind::Rename)).unwrap();
        }
        assert!(!dir.path().join(LOCK_FILE).exists());
        WriteLock::acquire(dir.path(), &quick(LockBackendKind::Rename)).unwrap();
    }

    #[test]
    fn test_release_leaves_foreign_marker() {
        let dir = tempdir().unwrap();
        let mut lock = WriteLock::acquire(dir.path(), &quick(LockBackendKind::Hardlink)).unwrap();

        let intruder = LockOwner::current();
        fs::write(dir.path().join(LOCK_FILE), intruder.to_bytes().unwrap()).unwrap();

        assert!(matches!(lock.release(), Err(LockError::NotHeld(_))));
        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_backoff_grows() {
        let options = LockOptions {
            retry_delay: Duration::from_millis(10),
            ..LockOptions::default()
        };
        let first = options.delay_for(0);
        let third = options.delay_for(2);
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(20));
        assert!(third >= Duration::from_millis(40) && third <= Duration::from_millis(50));
    }
}
