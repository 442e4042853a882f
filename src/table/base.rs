//! Revision slots (`base.A` / `base.B`)
//!
//! Each table keeps two slots. A slot names one revision and how many bytes
//! of `table.dat` belong to it. Writers always overwrite the slot that does
//! not hold the revision they have open, so the previous revision stays
//! readable until the following commit.
//!
//! Slots are written with the temp file + fsync + rename + directory fsync
//! pattern, so a slot is either the old content or the new content. A slot
//! that fails to parse or to verify its checksum is treated as absent.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::checksum::compute_checksum_parts;
use super::errors::{TableError, TableResult};
use crate::crash_point::{maybe_crash, points};
use crate::observability::Logger;

/// Current slot format
pub const FORMAT_VERSION: u8 = 1;

/// Which of the two slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotName {
    A,
    B,
}

impl SlotName {
    pub fn file_name(&self) -> &'static str {
        match self {
            SlotName::A => "base.A",
            SlotName::B => "base.B",
        }
    }

    pub fn other(&self) -> SlotName {
        match self {
            SlotName::A => SlotName::B,
            SlotName::B => SlotName::A,
        }
    }
}

/// Contents of one revision slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionSlot {
    /// Revision this slot describes
    pub revision: u64,
    /// Bytes of `table.dat` that belong to this revision
    pub data_length: u64,
    /// Number of entry records within `data_length`
    pub entry_count: u64,
    /// Slot format version
    pub format_version: u8,
    /// CRC32 over the fields above
    pub checksum: u32,
}

impl RevisionSlot {
    pub fn new(revision: u64, data_length: u64, entry_count: u64) -> Self {
        let mut slot = Self {
            revision,
            data_length,
            entry_count,
            format_version: FORMAT_VERSION,
            checksum: 0,
        };
        slot.checksum = slot.compute_checksum();
        slot
    }

    fn compute_checksum(&self) -> u32 {
        compute_checksum_parts(&[
            &self.revision.to_le_bytes(),
            &self.data_length.to_le_bytes(),
            &self.entry_count.to_le_bytes(),
            &[self.format_version],
        ])
    }

    /// Whether the stored checksum and format version are valid.
    pub fn is_valid(&self) -> bool {
        self.format_version == FORMAT_VERSION && self.checksum == self.compute_checksum()
    }

    /// Reads a slot file. Missing, unparsable or checksum-failing slots are `None`.
    pub fn read(path: &Path) -> TableResult<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TableError::open_failed(
                    format!("Failed to read revision slot: {}", path.display()),
                    e,
                ))
            }
        };

        let slot: RevisionSlot = match serde_json::from_str(&content) {
            Ok(slot) => slot,
            Err(e) => {
                let path_str = path.display().to_string();
                let reason = e.to_string();
                Logger::warn(
                    "REVISION_SLOT_UNREADABLE",
                    &[("path", &path_str), ("reason", &reason)],
                );
                return Ok(None);
            }
        };

        if !slot.is_valid() {
            let path_str = path.display().to_string();
            Logger::warn(
                "REVISION_SLOT_UNREADABLE",
                &[("path", &path_str), ("reason", "checksum mismatch")],
            );
            return Ok(None);
        }

        Ok(Some(slot))
    }

    /// Writes the slot atomically via temp file and rename.
    pub fn write_atomic(&self, dir: &Path, name: SlotName, sync: bool) -> io::Result<()> {
        let final_path = dir.join(name.file_name());
        let temp_path = dir.join(format!("{}.tmp", name.file_name()));

        let content = serde_json::to_string(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        if sync {
            file.sync_all()?;
        }
        drop(file);

        maybe_crash(points::SLOT_BEFORE_RENAME);

        fs::rename(&temp_path, &final_path)?;

        if sync {
            File::open(dir)?.sync_all()?;
        }

        Ok(())
    }
}

/// Both slots of one table as read from disk.
#[derive(Debug, Clone, Default)]
pub struct SlotPair {
    pub a: Option<RevisionSlot>,
    pub b: Option<RevisionSlot>,
}

impl SlotPair {
    pub fn read(dir: &Path) -> TableResult<Self> {
        Ok(Self {
            a: RevisionSlot::read(&slot_path(dir, SlotName::A))?,
            b: RevisionSlot::read(&slot_path(dir, SlotName::B))?,
        })
    }

    fn get(&self, name: SlotName) -> Option<&RevisionSlot> {
        match name {
            SlotName::A => self.a.as_ref(),
            SlotName::B => self.b.as_ref(),
        }
    }

    /// Finds the slot holding `revision`.
    pub fn find(&self, revision: u64) -> Option<(SlotName, &RevisionSlot)> {
        [SlotName::A, SlotName::B]
            .into_iter()
            .filter_map(|name| self.get(name).map(|slot| (name, slot)))
            .find(|(_, slot)| slot.revision == revision)
    }

    /// The slot with the highest revision.
    pub fn latest(&self) -> Option<(SlotName, &RevisionSlot)> {
        [SlotName::A, SlotName::B]
            .into_iter()
            .filter_map(|name| self.get(name).map(|slot| (name, slot)))
            .max_by_key(|(_, slot)| slot.revision)
    }

    /// Revisions held by valid slots, ascending.
    pub fn revisions(&self) -> Vec<u64> {
        let mut revisions: Vec<u64> = [self.a.as_ref(), self.b.as_ref()]
            .into_iter()
            .flatten()
            .map(|slot| slot.revision)
            .collect();
        revisions.sort_unstable();
        revisions
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_none() && self.b.is_none()
    }
}

/// Path of a slot file inside a table directory.
pub fn slot_path(dir: &Path, name: SlotName) -> PathBuf {
    dir.join(name.file_name())
}
