//! Lock marker backends
//!
//! Both backends publish a fully written owner file under the lock name in a
//! single atomic step, so the marker is never observed half written:
//!
//! - `hardlink`: write a private temp file, then `link(2)` it to the lock
//!   name. `link` fails if the name exists.
//! - `rename`: claim a shared staging name with `O_EXCL`, write it, check the
//!   lock is absent, then `rename(2)` it into place. Only the staging holder
//!   may rename, so the check cannot race with another writer.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use super::errors::LockError;

/// Staging file used by the rename backend
pub const PENDING_FILE: &str = "flintlock.pending";

/// One atomic attempt at creating the lock marker.
pub trait LockBackend {
    /// Creates `lock_path` holding `contents`. `Ok(false)` if it already
    /// exists (or another writer is mid-acquire).
    fn try_create(&self, lock_path: &Path, contents: &[u8], tag: &str) -> io::Result<bool>;
}

fn write_synced(file: &mut File, contents: &[u8]) -> io::Result<()> {
    file.write_all(contents)?;
    file.sync_all()
}

fn remove_quietly(path: &Path) {
    let _ = fs::remove_file(path);
}

/// `link(2)`-based marker creation.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardlinkBackend;

impl LockBackend for HardlinkBackend {
    fn try_create(&self, lock_path: &Path, contents: &[u8], tag: &str) -> io::Result<bool> {
        let temp = lock_path.with_extension(format!("{}.tmp", tag));
        let mut file = OpenOptions::new().write(true).create_new(true).open(&temp)?;
        let outcome = write_synced(&mut file, contents).and_then(|_| fs::hard_link(&temp, lock_path));
        drop(file);
        remove_quietly(&temp);

        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// `rename(2)`-based marker creation for filesystems without hard links.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameBackend;

impl LockBackend for RenameBackend {
    fn try_create(&self, lock_path: &Path, contents: &[u8], _tag: &str) -> io::Result<bool> {
        let pending = lock_path.with_file_name(PENDING_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&pending) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e),
        };

        let outcome = write_synced(&mut file, contents).and_then(|_| {
            if lock_path.exists() {
                Ok(false)
            } else {
                fs::rename(&pending, lock_path).map(|_| true)
            }
        });
        drop(file);

        match outcome {
            Ok(true) => Ok(true),
            other => {
                remove_quietly(&pending);
                other
            }
        }
    }
}

/// Configured backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockBackendKind {
    #[default]
    Hardlink,
    Rename,
}

impl LockBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockBackendKind::Hardlink => "hardlink",
            LockBackendKind::Rename => "rename",
        }
    }

    pub(crate) fn backend(&self) -> &'static dyn LockBackend {
        match self {
            LockBackendKind::Hardlink => &HardlinkBackend,
            LockBackendKind::Rename => &RenameBackend,
        }
    }
}

impl FromStr for LockBackendKind {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hardlink" => Ok(LockBackendKind::Hardlink),
            "rename" => Ok(LockBackendKind::Rename),
            other => Err(LockError::UnknownBackend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(backend: &dyn LockBackend) {
        let dir = tempdir().unwrap();
        let lock = dir.path().join("flintlock");

        assert!(backend.try_create(&lock, b"first", "a").unwrap());
        assert!(!backend.try_create(&lock, b"second", "b").unwrap());
        assert_eq!(fs::read(&lock).unwrap(), b"first");

        fs::remove_file(&lock).unwrap();
        assert!(backend.try_create(&lock, b"third", "c").unwrap());
        assert_eq!(fs::read(&lock).unwrap(), b"third");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name != "flintlock")
            .collect();
        assert!(leftovers.is_empty(), "stray files: {:?}", leftovers);
    }

    #[test]
    fn test_hardlink_backend_excludes() {
        exercise(&HardlinkBackend);
    }

    #[test]
    fn test_rename_backend_excludes() {
        exercise(&RenameBackend);
    }

    #[test]
    fn test_rename_backend_yields_to_pending_writer() {
        let dir = tempdir().unwrap();
        let lock = dir.path().join("flintlock");
        fs::write(dir.path().join(PENDING_FILE), b"").unwrap();

        assert!(!RenameBackend.try_create(&lock, b"x", "t").unwrap());
        assert!(!lock.exists());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("hardlink".parse::<LockBackendKind>().unwrap(), LockBackendKind::Hardlink);
        assert_eq!("rename".parse::<LockBackendKind>().unwrap(), LockBackendKind::Rename);
        assert!("flock".parse::<LockBackendKind>().is_err());
    }
}
