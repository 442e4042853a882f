//! Documents as handed to the writer and read back from storage

use std::collections::{BTreeMap, BTreeSet};

use super::codec::{DocId, TermEntry};

/// Frequency and positions of one term within a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermInfo {
    pub wdf: u32,
    pub positions: BTreeSet<u32>,
}

/// A document to be indexed: a data blob, terms and value slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    data: Vec<u8>,
    terms: BTreeMap<String, TermInfo>,
    values: BTreeMap<u32, Vec<u8>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Adds `wdf_inc` occurrences of `term` without positional information.
    pub fn add_term(&mut self, term: impl Into<String>, wdf_inc: u32) {
        let info = self.terms.entry(term.into()).or_default();
        info.wdf = info.wdf.saturating_add(wdf_inc);
    }

    /// Records `term` at `position`, adding `wdf_inc` to its frequency.
    pub fn add_posting(&mut self, term: impl Into<String>, position: u32, wdf_inc: u32) {
        let info = self.terms.entry(term.into()).or_default();
        info.wdf = info.wdf.saturating_add(wdf_inc);
        info.positions.insert(position);
    }

    pub fn remove_term(&mut self, term: &str) -> bool {
        self.terms.remove(term).is_some()
    }

    pub fn add_value(&mut self, slot: u32, value: impl Into<Vec<u8>>) {
        self.values.insert(slot, value.into());
    }

    pub fn value(&self, slot: u32) -> Option<&[u8]> {
        self.values.get(&slot).map(Vec::as_slice)
    }

    pub fn values(&self) -> &BTreeMap<u32, Vec<u8>> {
        &self.values
    }

    pub fn terms(&self) -> &BTreeMap<String, TermInfo> {
        &self.terms
    }

    /// Sum of every term's wdf.
    pub fn length(&self) -> u64 {
        self.terms.values().map(|info| u64::from(info.wdf)).sum()
    }
}

/// A document as committed: what a reader gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub docid: DocId,
    pub data: Vec<u8>,
    pub terms: Vec<TermEntry>,
    pub values: BTreeMap<u32, Vec<u8>>,
    pub length: u64,
}

impl StoredDocument {
    pub fn value(&self, slot: u32) -> Option<&[u8]> {
        self.values.get(&slot).map(Vec::as_slice)
    }

    pub fn has_term(&self, term: &str) -> bool {
        self.terms
            .binary_search_by(|entry| entry.term.as_str().cmp(term))
            .is_ok()
    }

    pub fn wdf(&self, term: &str) -> Option<u32> {
        self.terms
            .binary_search_by(|entry| entry.term.as_str().cmp(term))
            .ok()
            .map(|i| self.terms[i].wdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postings_accumulate_wdf_and_positions() {
        let mut doc = Document::with_data("hello");
        doc.add_posting("foo", 3, 1);
        doc.add_posting("foo", 1, 1);
        doc.add_term("bar", 2);

        let foo = &doc.terms()["foo"];
        assert_eq!(foo.wdf, 2);
        assert_eq!(foo.positions.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(doc.length(), 4);
        assert_eq!(doc.data(), b"hello");
    }

    #[test]
    fn test_values_replace_by_slot() {
        let mut doc = Document::new();
        doc.add_value(0, "A");
        doc.add_value(0, "B");
        assert_eq!(doc.value(0), Some(&b"B"[..]));
        assert_eq!(doc.value(1), None);
    }

    #[test]
    fn test_remove_term() {
        let mut doc = Document::new();
        doc.add_term("foo", 1);
        assert!(doc.remove_term("foo"));
        assert!(!doc.remove_term("foo"));
        assert_eq!(doc.length(), 0);
    }

    #[test]
    fn test_stored_document_lookups() {
        let stored = StoredDocument {
            docid: 1,
            data: Vec::new(),
            terms: vec![
                TermEntry {
                    term: "a".to_string(),
                    wdf: 1,
                },
                TermEntry {
                    term: "foo".to_string(),
                    wdf: 3,
                },
            ],
            values: BTreeMap::new(),
            length: 4,
        };
        assert!(stored.has_term("foo"));
        assert_eq!(stored.wdf("foo"), Some(3));
        assert!(!stored.has_term("bar"));
    }
}
