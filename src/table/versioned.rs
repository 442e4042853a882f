//! Versioned key → tag table
//!
//! A table is a directory holding `table.dat` (append-only checksummed
//! entry records) and two revision slots. Opening binds the table to one
//! revision: the entries within that revision's `data_length` are scanned
//! and indexed by key. Writes are staged in a [`DiffSet`] and only reach
//! disk in [`VersionedTable::apply`], which appends the staged entries,
//! fsyncs them, then writes the slot that does not hold the open revision.
//! The slot write is this table's commit point: if anything fails before
//! it, the on-disk state is still the prior revision.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::base::{slot_path, RevisionSlot, SlotName, SlotPair};
use super::diff::{DiffSet, Key, Lookup, Tag};
use super::errors::{TableError, TableResult};
use super::kind::TableKind;
use super::record::{EntryRecord, MAX_ENTRY_SIZE, MIN_ENTRY_SIZE};
use crate::crash_point::{maybe_crash, points};

/// Name of the entry log inside a table directory
pub const DATA_FILE: &str = "table.dat";

/// State of a table bound to one on-disk revision.
struct OpenRevision {
    revision: u64,
    slot: SlotName,
    data_length: u64,
    entry_count: u64,
    /// key → offset of its latest live entry
    index: BTreeMap<Key, u64>,
    file: File,
}

/// One on-disk table that can be opened at a revision, staged and applied.
pub struct VersionedTable {
    kind: TableKind,
    dir: PathBuf,
    sync: bool,
    open: Option<OpenRevision>,
    diff: DiffSet,
    cache_reads: bool,
    fail_next_apply: bool,
}

impl VersionedTable {
    /// Handle for an existing table directory. Nothing is read until `open`.
    pub fn new(kind: TableKind, dir: impl AsRef<Path>, sync: bool) -> Self {
        Self {
            kind,
            dir: dir.as_ref().to_path_buf(),
            sync,
            open: None,
            diff: DiffSet::new(),
            cache_reads: true,
            fail_next_apply: false,
        }
    }

    /// Turns the read-through cache on or off. Read-only handles run without it.
    pub fn with_read_cache(mut self, enabled: bool) -> Self {
        self.cache_reads = enabled;
        self
    }

    /// Provisions an empty table at revision 0, replacing any previous files.
    pub fn create(kind: TableKind, dir: impl AsRef<Path>, sync: bool) -> TableResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            TableError::io_error(
                format!("Failed to create table directory: {}", dir.display()),
                e,
            )
            .for_table(kind)
        })?;

        for name in [SlotName::A, SlotName::B] {
            match fs::remove_file(slot_path(dir, name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(TableError::io_error("Failed to remove old revision slot", e)
                        .for_table(kind))
                }
            }
        }

        let data = File::create(dir.join(DATA_FILE)).map_err(|e| {
            TableError::io_error("Failed to create table data file", e).for_table(kind)
        })?;
        if sync {
            data.sync_all().map_err(|e| {
                TableError::io_error("Failed to fsync table data file", e).for_table(kind)
            })?;
        }

        RevisionSlot::new(0, 0, 0)
            .write_atomic(dir, SlotName::A, sync)
            .map_err(|e| {
                TableError::io_error("Failed to write initial revision slot", e).for_table(kind)
            })?;

        Ok(Self::new(kind, dir, sync))
    }

    /// Whether a table has been provisioned in `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(DATA_FILE).exists()
            || slot_path(dir, SlotName::A).exists()
            || slot_path(dir, SlotName::B).exists()
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Revision this handle is bound to, if open.
    pub fn revision(&self) -> Option<u64> {
        self.open.as_ref().map(|open| open.revision)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Number of live keys in the open revision (staged changes excluded).
    pub fn committed_len(&self) -> usize {
        self.open.as_ref().map(|open| open.index.len()).unwrap_or(0)
    }

    /// Live keys of the open revision in byte order.
    pub fn committed_keys(&self) -> impl Iterator<Item = &Key> {
        self.open.iter().flat_map(|open| open.index.keys())
    }

    /// Binds the table to `revision`, discarding any staged changes.
    pub fn open(&mut self, revision: u64) -> TableResult<()> {
        self.diff.clear();
        self.open = None;

        let slots = SlotPair::read(&self.dir).map_err(|e| e.for_table(self.kind))?;
        let (slot_name, slot) = slots.find(revision).ok_or_else(|| {
            TableError::revision_unavailable(revision, &slots.revisions()).for_table(self.kind)
        })?;

        let data_path = self.dir.join(DATA_FILE);
        let file = File::open(&data_path).map_err(|e| {
            TableError::open_failed(
                format!("Failed to open table data: {}", data_path.display()),
                e,
            )
            .for_table(self.kind)
        })?;

        let file_len = file
            .metadata()
            .map_err(|e| TableError::open_failed("Failed to read data metadata", e))?
            .len();
        if file_len < slot.data_length {
            return Err(TableError::revision_unavailable(revision, &slots.revisions())
                .for_table(self.kind));
        }

        let scan_handle = file
            .try_clone()
            .map_err(|e| TableError::open_failed("Failed to clone data handle", e))?;
        let (index, entry_count) = scan_entries(scan_handle, slot.data_length, revision)
            .map_err(|e| e.for_table(self.kind))?;

        if entry_count != slot.entry_count {
            return Err(TableError::corruption(format!(
                "revision {} records {} entries, found {}",
                revision, slot.entry_count, entry_count
            ))
            .for_table(self.kind));
        }

        self.open = Some(OpenRevision {
            revision,
            slot: slot_name,
            data_length: slot.data_length,
            entry_count,
            index,
            file,
        });
        Ok(())
    }

    /// Drops the open revision and any staged changes.
    pub fn close(&mut self) {
        self.diff.clear();
        self.open = None;
    }

    /// Highest revision recorded in the slots, regardless of what is open.
    pub fn latest_revision_number(&self) -> TableResult<u64> {
        let slots = SlotPair::read(&self.dir).map_err(|e| e.for_table(self.kind))?;
        slots
            .latest()
            .map(|(_, slot)| slot.revision)
            .ok_or_else(|| {
                TableError::open_failed_no_source("no valid revision slot").for_table(self.kind)
            })
    }

    /// Revisions currently openable according to the slots.
    pub fn available_revisions(&self) -> TableResult<Vec<u64>> {
        Ok(SlotPair::read(&self.dir)
            .map_err(|e| e.for_table(self.kind))?
            .revisions())
    }

    /// Staged value first, then the open revision. Disk reads are cached
    /// unless the handle was built without a read cache.
    pub fn get(&mut self, key: &[u8]) -> TableResult<Option<Tag>> {
        if let Lookup::Known(tag) = self.diff.lookup(key) {
            return Ok(tag.cloned());
        }
        let tag = self.read_committed(key)?;
        if self.cache_reads {
            self.diff.cache_read(key.to_vec(), tag.clone());
        }
        Ok(tag)
    }

    /// Reads held in the session cache.
    pub fn cached_reads(&self) -> usize {
        self.diff.cached_len()
    }

    /// Returns a staged, mutable tag for `key`, starting from its current
    /// value or an empty tag. The key counts as modified afterwards.
    pub fn get_or_create(&mut self, key: &[u8]) -> TableResult<&mut Tag> {
        let initial = if self.diff.has_staged_write(key) {
            Vec::new()
        } else {
            match self.diff.lookup(key) {
                Lookup::Known(tag) => tag.cloned(),
                Lookup::Untouched => self.read_committed(key)?,
            }
            .unwrap_or_default()
        };
        Ok(self.diff.staged_mut(key.to_vec(), initial))
    }

    pub fn set(&mut self, key: impl Into<Key>, tag: Tag) {
        self.diff.set(key.into(), tag);
    }

    pub fn delete(&mut self, key: impl Into<Key>) {
        self.diff.delete(key.into());
    }

    pub fn is_modified(&self) -> bool {
        self.diff.is_modified()
    }

    /// Number of staged changes.
    pub fn pending_changes(&self) -> usize {
        self.diff.len()
    }

    /// Discards staged changes and cached reads.
    pub fn cancel(&mut self) {
        self.diff.clear();
    }

    /// Makes the next `apply` fail after its entries hit disk but before the
    /// revision slot is written.
    pub fn arm_apply_failure(&mut self) {
        self.fail_next_apply = true;
    }

    /// Writes every staged change as `new_revision` and advances the table.
    ///
    /// The diff is cleared whether or not this succeeds. On error the
    /// revision slots are untouched, so the table is still at its prior
    /// revision on disk. Never retries.
    pub fn apply(&mut self, new_revision: u64) -> TableResult<()> {
        let changes = self.diff.take();
        let inject_failure = std::mem::take(&mut self.fail_next_apply);
        let kind = self.kind;

        let open = self.open.as_mut().ok_or_else(|| {
            TableError::apply_failed_no_source("table is not open").for_table(kind)
        })?;

        if new_revision <= open.revision {
            return Err(TableError::apply_failed_no_source(format!(
                "revision {} does not advance past {}",
                new_revision, open.revision
            ))
            .for_table(kind));
        }

        for (key, tag) in &changes {
            let tag_len = tag.as_ref().map_or(0, Vec::len);
            if EntryRecord::encoded_len(key.len(), tag_len).is_none() {
                return Err(TableError::apply_failed_no_source(format!(
                    "entry with {}-byte key and {}-byte tag exceeds the {}-byte entry limit",
                    key.len(),
                    tag_len,
                    MAX_ENTRY_SIZE
                ))
                .for_table(kind));
            }
        }

        let mut buffer = Vec::new();
        let mut placed: Vec<(Key, Option<u64>)> = Vec::with_capacity(changes.len());
        let mut entry_count = open.entry_count;

        for (key, tag) in changes {
            let offset = open.data_length + buffer.len() as u64;
            match tag {
                Some(tag) => {
                    EntryRecord::live(new_revision, key.clone(), tag).encode_into(&mut buffer);
                    placed.push((key, Some(offset)));
                }
                None => {
                    if !open.index.contains_key(&key) {
                        continue;
                    }
                    EntryRecord::tombstone(new_revision, key.clone()).encode_into(&mut buffer);
                    placed.push((key, None));
                }
            }
            entry_count += 1;
        }

        write_entries(&self.dir, open.data_length, &buffer, self.sync).map_err(|e| {
            TableError::apply_failed(
                format!("Failed to write entries for revision {}", new_revision),
                e,
            )
            .for_table(kind)
        })?;

        maybe_crash(points::TABLE_AFTER_DATA_WRITE);

        if inject_failure {
            return Err(TableError::apply_failed(
                format!("Failed to write revision slot for revision {}", new_revision),
                io::Error::new(io::ErrorKind::Other, "injected apply failure"),
            )
            .for_table(kind));
        }

        let new_length = open.data_length + buffer.len() as u64;
        let target = open.slot.other();
        RevisionSlot::new(new_revision, new_length, entry_count)
            .write_atomic(&self.dir, target, self.sync)
            .map_err(|e| {
                TableError::apply_failed(
                    format!("Failed to write revision slot for revision {}", new_revision),
                    e,
                )
                .for_table(kind)
            })?;

        maybe_crash(points::TABLE_AFTER_SLOT_WRITE);

        for (key, offset) in placed {
            match offset {
                Some(offset) => {
                    open.index.insert(key, offset);
                }
                None => {
                    open.index.remove(&key);
                }
            }
        }
        open.revision = new_revision;
        open.slot = target;
        open.data_length = new_length;
        open.entry_count = entry_count;

        Ok(())
    }

    /// Stamps the open revision's content as `new_revision` with no changes.
    pub fn force_set_revision(&mut self, new_revision: u64) -> TableResult<()> {
        self.diff.clear();
        self.apply(new_revision)
    }

    fn read_committed(&mut self, key: &[u8]) -> TableResult<Option<Tag>> {
        let kind = self.kind;
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| TableError::open_failed_no_source("table is not open").for_table(kind))?;

        let offset = match open.index.get(key) {
            Some(offset) => *offset,
            None => return Ok(None),
        };

        let outcome = open
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| read_entry(&mut open.file, open.data_length - offset));

        match outcome {
            Ok((record, _)) if record.key == key && record.revision <= open.revision => {
                Ok(record.tag)
            }
            Ok(_) => Err(classify_read_failure(&self.dir, open.revision, offset, "entry moved")
                .for_table(kind)),
            Err(e) => Err(
                classify_read_failure(&self.dir, open.revision, offset, &e.to_string())
                    .for_table(kind),
            ),
        }
    }
}

/// A failed read is a discarded revision if the slots no longer hold the
/// revision being read; otherwise the table is corrupt.
fn classify_read_failure(dir: &Path, revision: u64, offset: u64, reason: &str) -> TableError {
    match SlotPair::read(dir) {
        Ok(slots) if slots.find(revision).is_some() => TableError::corruption_at_offset(
            offset,
            format!("unreadable entry in revision {}: {}", revision, reason),
        ),
        _ => TableError::revision_discarded(revision),
    }
}

/// Reads one entry from `reader`, refusing to read past `remaining` bytes.
fn read_entry<R: Read>(reader: &mut R, remaining: u64) -> io::Result<(EntryRecord, usize)> {
    if remaining < MIN_ENTRY_SIZE as u64 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} bytes left, minimum entry size is {}", remaining, MIN_ENTRY_SIZE),
        ));
    }

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let record_length = EntryRecord::peek_length(&len_buf)?;

    if record_length < MIN_ENTRY_SIZE || record_length as u64 > remaining {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid entry length {} ({} bytes left)", record_length, remaining),
        ));
    }

    let mut record_buf = vec![0u8; record_length];
    record_buf[..4].copy_from_slice(&len_buf);
    reader.read_exact(&mut record_buf[4..])?;

    EntryRecord::decode(&record_buf)
}

/// Scans the first `data_length` bytes, building the key index of `revision`.
fn scan_entries(
    file: File,
    data_length: u64,
    revision: u64,
) -> TableResult<(BTreeMap<Key, u64>, u64)> {
    let mut reader = BufReader::new(file);
    let mut index = BTreeMap::new();
    let mut offset = 0u64;
    let mut entry_count = 0u64;

    while offset < data_length {
        let (record, consumed) = read_entry(&mut reader, data_length - offset)
            .map_err(|e| TableError::corruption_at_offset(offset, e.to_string()))?;

        if record.revision > revision {
            return Err(TableError::corruption_at_offset(
                offset,
                format!(
                    "entry from revision {} inside revision {}",
                    record.revision, revision
                ),
            ));
        }

        match record.tag {
            Some(_) => {
                index.insert(record.key, offset);
            }
            None => {
                index.remove(&record.key);
            }
        }

        offset += consumed as u64;
        entry_count += 1;
    }

    Ok((index, entry_count))
}

/// Truncates the data file to `base_length` and appends `buffer`.
fn write_entries(dir: &Path, base_length: u64, buffer: &[u8], sync: bool) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(dir.join(DATA_FILE))?;
    file.set_len(base_length)?;
    file.seek(SeekFrom::Start(base_length))?;
    file.write_all(buffer)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::errors::TableErrorCode;
    use tempfile::TempDir;

    fn create_table(dir: &TempDir) -> VersionedTable {
        let mut table =
            VersionedTable::create(TableKind::Postings, dir.path().join("postings"), false)
                .unwrap();
        table.open(0).unwrap();
        table
    }

    #[test]
    fn test_create_starts_at_revision_zero() {
        let dir = TempDir::new().unwrap();
        let table = create_table(&dir);
        assert_eq!(table.revision(), Some(0));
        assert_eq!(table.latest_revision_number().unwrap(), 0);
        assert!(VersionedTable::exists(table.dir()));
    }

    #[test]
    fn test_set_is_visible_before_apply_but_not_on_disk() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"foo".to_vec(), b"1".to_vec());

        assert_eq!(table.get(b"foo").unwrap(), Some(b"1".to_vec()));
        assert!(table.is_modified());

        let mut other = VersionedTable::new(TableKind::Postings, table.dir(), false);
        other.open(0).unwrap();
        assert_eq!(other.get(b"foo").unwrap(), None);
    }

    #[test]
    fn test_apply_persists_and_advances() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"foo".to_vec(), b"1".to_vec());
        table.set(b"bar".to_vec(), b"2".to_vec());
        table.apply(1).unwrap();

        assert!(!table.is_modified());
        assert_eq!(table.revision(), Some(1));

        let mut reopened = VersionedTable::new(TableKind::Postings, table.dir(), false);
        reopened.open(1).unwrap();
        assert_eq!(reopened.get(b"foo").unwrap(), Some(b"1".to_vec()));
        assert_eq!(reopened.get(b"bar").unwrap(), Some(b"2".to_vec()));
        assert_eq!(reopened.committed_len(), 2);
        let keys: Vec<&Key> = reopened.committed_keys().collect();
        assert_eq!(keys, vec![&b"bar".to_vec(), &b"foo".to_vec()]);
    }

    #[test]
    fn test_read_cache_can_be_turned_off() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"foo".to_vec(), b"1".to_vec());
        table.apply(1).unwrap();

        let mut cached = VersionedTable::new(TableKind::Postings, table.dir(), false);
        cached.open(1).unwrap();
        cached.get(b"foo").unwrap();
        cached.get(b"missing").unwrap();
        assert_eq!(cached.cached_reads(), 2);
        assert!(!cached.is_modified());

        let mut uncached =
            VersionedTable::new(TableKind::Postings, table.dir(), false).with_read_cache(false);
        uncached.open(1).unwrap();
        for _ in 0..3 {
            assert_eq!(uncached.get(b"foo").unwrap(), Some(b"1".to_vec()));
            assert_eq!(uncached.get(b"missing").unwrap(), None);
        }
        assert_eq!(uncached.cached_reads(), 0);

        // Staged values are still served from the diff.
        uncached.set(b"bar".to_vec(), b"2".to_vec());
        assert_eq!(uncached.get(b"bar").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_previous_revision_stays_openable_for_one_commit() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"v1".to_vec());
        table.apply(1).unwrap();
        table.set(b"k".to_vec(), b"v2".to_vec());
        table.apply(2).unwrap();

        let mut old = VersionedTable::new(TableKind::Postings, table.dir(), false);
        old.open(1).unwrap();
        assert_eq!(old.get(b"k").unwrap(), Some(b"v1".to_vec()));

        table.set(b"k".to_vec(), b"v3".to_vec());
        table.apply(3).unwrap();
        assert_eq!(table.available_revisions().unwrap(), vec![2, 3]);
        let err = old.open(1).unwrap_err();
        assert_eq!(err.code(), TableErrorCode::FlintTableRevisionUnavailable);
    }

    #[test]
    fn test_delete_writes_tombstone() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"v".to_vec());
        table.apply(1).unwrap();
        table.delete(b"k".to_vec());
        assert_eq!(table.get(b"k").unwrap(), None);
        table.apply(2).unwrap();

        let mut reopened = VersionedTable::new(TableKind::Postings, table.dir(), false);
        reopened.open(2).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), None);
        assert_eq!(reopened.committed_len(), 0);
    }

    #[test]
    fn test_get_or_create_never_absent() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.get_or_create(b"new").unwrap().extend_from_slice(b"abc");
        table.get_or_create(b"new").unwrap().push(b'd');
        assert_eq!(table.get(b"new").unwrap(), Some(b"abcd".to_vec()));
        assert!(table.is_modified());
    }

    #[test]
    fn test_get_or_create_starts_from_committed_tag() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"old".to_vec());
        table.apply(1).unwrap();

        table.get_or_create(b"k").unwrap().extend_from_slice(b"+new");
        table.apply(2).unwrap();
        assert_eq!(table.get(b"k").unwrap(), Some(b"old+new".to_vec()));
    }

    #[test]
    fn test_reads_do_not_mark_modified() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.get(b"absent").unwrap();
        assert!(!table.is_modified());
    }

    #[test]
    fn test_failed_apply_leaves_prior_revision_and_clears_diff() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"v1".to_vec());
        table.apply(1).unwrap();

        table.set(b"k".to_vec(), b"v2".to_vec());
        table.arm_apply_failure();
        let err = table.apply(2).unwrap_err();
        assert_eq!(err.code(), TableErrorCode::FlintTableApplyFailed);
        assert_eq!(err.table(), Some(TableKind::Postings));
        assert!(!table.is_modified());
        assert_eq!(table.latest_revision_number().unwrap(), 1);

        table.open(1).unwrap();
        assert_eq!(table.get(b"k").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_apply_after_failure_discards_partial_bytes() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"v1".to_vec());
        table.arm_apply_failure();
        assert!(table.apply(1).is_err());

        table.open(0).unwrap();
        table.set(b"other".to_vec(), b"x".to_vec());
        table.apply(2).unwrap();

        let mut reopened = VersionedTable::new(TableKind::Postings, table.dir(), false);
        reopened.open(2).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), None);
        assert_eq!(reopened.get(b"other").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_force_set_revision_restamps_open_content() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"v".to_vec());
        table.apply(1).unwrap();

        table.set(b"ignored".to_vec(), b"x".to_vec());
        table.force_set_revision(5).unwrap();

        assert_eq!(table.latest_revision_number().unwrap(), 5);
        let mut reopened = VersionedTable::new(TableKind::Postings, table.dir(), false);
        reopened.open(5).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(reopened.get(b"ignored").unwrap(), None);
    }

    #[test]
    fn test_apply_requires_advancing_revision() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"v".to_vec());
        table.apply(3).unwrap();
        table.set(b"k".to_vec(), b"w".to_vec());
        assert!(table.apply(3).is_err());
    }

    #[test]
    fn test_reader_of_restamped_revision_sees_discarded() {
        let dir = TempDir::new().unwrap();
        let mut writer = create_table(&dir);
        writer.set(b"k".to_vec(), b"v1".to_vec());
        writer.apply(1).unwrap();
        writer.set(b"late".to_vec(), b"v2".to_vec());
        writer.apply(2).unwrap();

        let mut reader = VersionedTable::new(TableKind::Postings, writer.dir(), false);
        reader.open(2).unwrap();

        // Rewind to 1 and restamp as 3: revision 2's bytes are truncated away.
        writer.open(1).unwrap();
        writer.force_set_revision(3).unwrap();

        let err = reader.get(b"late").unwrap_err();
        assert_eq!(err.code(), TableErrorCode::FlintTableRevisionDiscarded);
        assert!(reader.open(2).is_err());
    }

    #[test]
    fn test_truncated_data_file_fails_open() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"k".to_vec(), b"value".to_vec());
        table.apply(1).unwrap();

        let data_path = table.dir().join(DATA_FILE);
        let contents = fs::read(&data_path).unwrap();
        fs::write(&data_path, &contents[..contents.len() - 2]).unwrap();

        let mut reopened = VersionedTable::new(TableKind::Postings, table.dir(), false);
        assert!(reopened.open(1).is_err());
    }

    #[test]
    fn test_corrupted_entry_fails_open() {
        let dir = TempDir::new().unwrap();
        let mut table = create_table(&dir);
        table.set(b"key".to_vec(), b"value".to_vec());
        table.apply(1).unwrap();

        let data_path = table.dir().join(DATA_FILE);
        let mut contents = fs::read(&data_path).unwrap();
        let mid = contents.len() / 2;
        contents[mid] ^= 0xFF;
        fs::write(&data_path, contents).unwrap();

        let mut reopened = VersionedTable::new(TableKind::Postings, table.dir(), false);
        let err = reopened.open(1).unwrap_err();
        assert!(err.is_fatal());
    }
}
