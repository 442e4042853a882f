//! In-memory staging area for one table
//!
//! A `DiffSet` lives for exactly one write session. It holds two maps:
//! staged changes (what `apply` will write) and a read-through cache of tags
//! already fetched from disk during the session. Only staged changes count
//! towards `is_modified`; a session that merely reads is not a modification.

use std::collections::BTreeMap;

/// Opaque table key; ordering is byte-wise.
pub type Key = Vec<u8>;

/// Opaque table value.
pub type Tag = Vec<u8>;

/// Result of looking a key up in the diff only.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The key is staged or cached; `None` means absent
    Known(Option<&'a Tag>),
    /// The key was never touched this session
    Untouched,
}

/// Staged writes/deletes plus read-through cache for one table.
///
/// A staged `None` is a delete marker.
#[derive(Debug, Default)]
pub struct DiffSet {
    changes: BTreeMap<Key, Option<Tag>>,
    cache: BTreeMap<Key, Option<Tag>>,
}

impl DiffSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks the key up in staged changes, then in the read cache.
    pub fn lookup(&self, key: &[u8]) -> Lookup<'_> {
        match self.changes.get(key) {
            Some(staged) => Lookup::Known(staged.as_ref()),
            None => match self.cache.get(key) {
                Some(cached) => Lookup::Known(cached.as_ref()),
                None => Lookup::Untouched,
            },
        }
    }

    /// Remembers what disk returned for a key.
    pub fn cache_read(&mut self, key: Key, tag: Option<Tag>) {
        if !self.changes.contains_key(&key) {
            self.cache.insert(key, tag);
        }
    }

    /// Stages `tag` for `key`, replacing any earlier intent.
    pub fn set(&mut self, key: Key, tag: Tag) {
        self.cache.remove(&key);
        self.changes.insert(key, Some(tag));
    }

    /// Stages removal of `key`.
    pub fn delete(&mut self, key: Key) {
        self.cache.remove(&key);
        self.changes.insert(key, None);
    }

    /// Returns a mutable staged tag, staging `initial` first if the key has
    /// no staged write yet.
    pub fn staged_mut(&mut self, key: Key, initial: Tag) -> &mut Tag {
        self.cache.remove(&key);
        self.changes.entry(key).or_insert(None).get_or_insert(initial)
    }

    /// Whether a write for `key` is already staged.
    pub fn has_staged_write(&self, key: &[u8]) -> bool {
        matches!(self.changes.get(key), Some(Some(_)))
    }

    /// True iff any change is staged.
    pub fn is_modified(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Number of staged changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of cached reads.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Takes every staged change in key order and clears the whole diff.
    pub fn take(&mut self) -> BTreeMap<Key, Option<Tag>> {
        self.cache.clear();
        std::mem::take(&mut self.changes)
    }

    /// Discards staged changes and cached reads.
    pub fn clear(&mut self) {
        self.changes.clear();
        self.cache.clear();
    }
}
