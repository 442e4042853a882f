//! Key and tag encodings for each table kind
//!
//! All integers are little-endian except document ids used as keys, which
//! are big-endian so byte order matches numeric order.
//!
//! ```text
//! Postings   term                 → count u32 | (docid u32, wdf u32)*
//! Terms      docid                → doc_length u64 | count u32 | (term, wdf u32)*
//! Positions  docid ‖ term         → count u32 | position u32*
//! Values     docid                → count u32 | (slot u32, bytes)*
//! Records    docid                → data blob
//! Records    ""                   → doc_count u32 | last_docid u32 | total_length u64
//! ```
//!
//! Strings and byte blobs inside tags are u32-length-prefixed.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::table::Key;

/// Document identifier. Zero is never assigned.
pub type DocId = u32;

/// Tag decoding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{what} truncated at byte {offset}")]
    Truncated { what: &'static str, offset: usize },

    #[error("{what} has {extra} trailing bytes")]
    Trailing { what: &'static str, extra: usize },

    #[error("{what} contains a term that is not UTF-8")]
    InvalidUtf8 { what: &'static str },

    #[error("{what} is not sorted")]
    Unsorted { what: &'static str },
}

pub type CodecResult<T> = Result<T, CodecError>;

pub fn docid_key(docid: DocId) -> Key {
    docid.to_be_bytes().to_vec()
}

/// Inverse of [`docid_key`]; None for keys of any other shape.
pub fn parse_docid_key(key: &[u8]) -> Option<DocId> {
    let bytes: [u8; 4] = key.try_into().ok()?;
    Some(DocId::from_be_bytes(bytes))
}

pub fn position_key(docid: DocId, term: &str) -> Key {
    let mut key = Vec::with_capacity(4 + term.len());
    key.extend_from_slice(&docid.to_be_bytes());
    key.extend_from_slice(term.as_bytes());
    key
}

/// Bounds-checked reader over one tag.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, pos: 0, what }
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(CodecError::Truncated {
                what: self.what,
                offset: self.pos,
            }),
        }
    }

    fn u32(&mut self) -> CodecResult<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> CodecResult<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> CodecResult<String> {
        let what = self.what;
        std::str::from_utf8(self.bytes()?)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8 { what })
    }

    fn finish(self) -> CodecResult<()> {
        let extra = self.buf.len() - self.pos;
        if extra == 0 {
            Ok(())
        } else {
            Err(CodecError::Trailing {
                what: self.what,
                extra,
            })
        }
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

// A field past u32::MAX makes its entry too large for apply, which rejects it.
fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

/// One document's entry in a posting list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub docid: DocId,
    pub wdf: u32,
}

/// Documents containing one term, sorted by docid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    postings: Vec<Posting>,
}

impl PostingList {
    /// An empty tag decodes to an empty list.
    pub fn decode(tag: &[u8]) -> CodecResult<Self> {
        if tag.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(tag, "posting list");
        let count = cur.u32()?;
        let mut postings = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let docid = cur.u32()?;
            let wdf = cur.u32()?;
            if postings.last().map_or(false, |p: &Posting| p.docid >= docid) {
                return Err(CodecError::Unsorted {
                    what: "posting list",
                });
            }
            postings.push(Posting { docid, wdf });
        }
        cur.finish()?;
        Ok(Self { postings })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.postings.len() * 8);
        put_u32(&mut out, self.postings.len() as u32);
        for p in &self.postings {
            put_u32(&mut out, p.docid);
            put_u32(&mut out, p.wdf);
        }
        out
    }

    /// Adds or overwrites `docid`'s entry.
    pub fn insert(&mut self, docid: DocId, wdf: u32) {
        match self.postings.binary_search_by_key(&docid, |p| p.docid) {
            Ok(i) => self.postings[i].wdf = wdf,
            Err(i) => self.postings.insert(i, Posting { docid, wdf }),
        }
    }

    pub fn remove(&mut self, docid: DocId) -> bool {
        match self.postings.binary_search_by_key(&docid, |p| p.docid) {
            Ok(i) => {
                self.postings.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    pub fn get(&self, docid: DocId) -> Option<Posting> {
        self.postings
            .binary_search_by_key(&docid, |p| p.docid)
            .ok()
            .map(|i| self.postings[i])
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.iter()
    }

    pub fn into_vec(self) -> Vec<Posting> {
        self.postings
    }
}

/// One term of a document with its within-document frequency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub term: String,
    pub wdf: u32,
}

/// Terms of one document, sorted by term, plus its length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermList {
    pub entries: Vec<TermEntry>,
    pub doc_length: u64,
}

impl TermList {
    pub fn decode(tag: &[u8]) -> CodecResult<Self> {
        let mut cur = Cursor::new(tag, "term list");
        let doc_length = cur.u64()?;
        let count = cur.u32()?;
        let mut entries: Vec<TermEntry> = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let term = cur.string()?;
            let wdf = cur.u32()?;
            if entries.last().map_or(false, |e| e.term >= term) {
                return Err(CodecError::Unsorted { what: "term list" });
            }
            entries.push(TermEntry { term, wdf });
        }
        cur.finish()?;
        Ok(Self {
            entries,
            doc_length,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.doc_length.to_le_bytes());
        put_u32(&mut out, self.entries.len() as u32);
        for entry in &self.entries {
            put_bytes(&mut out, entry.term.as_bytes());
            put_u32(&mut out, entry.wdf);
        }
        out
    }
}

/// Sorted, unique positions of one term in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionList(pub Vec<u32>);

impl PositionList {
    pub fn from_sorted(positions: impl IntoIterator<Item = u32>) -> Self {
        Self(positions.into_iter().collect())
    }

    pub fn decode(tag: &[u8]) -> CodecResult<Self> {
        let mut cur = Cursor::new(tag, "position list");
        let count = cur.u32()?;
        let mut positions: Vec<u32> = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let pos = cur.u32()?;
            if positions.last().map_or(false, |last| *last >= pos) {
                return Err(CodecError::Unsorted {
                    what: "position list",
                });
            }
            positions.push(pos);
        }
        cur.finish()?;
        Ok(Self(positions))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.0.len() * 4);
        put_u32(&mut out, self.0.len() as u32);
        for pos in &self.0 {
            put_u32(&mut out, *pos);
        }
        out
    }
}

/// Value slots of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSet(pub BTreeMap<u32, Vec<u8>>);

impl ValueSet {
    pub fn decode(tag: &[u8]) -> CodecResult<Self> {
        let mut cur = Cursor::new(tag, "value set");
        let count = cur.u32()?;
        let mut values = BTreeMap::new();
        let mut last: Option<u32> = None;
        for _ in 0..count {
            let slot = cur.u32()?;
            if last.map_or(false, |l| l >= slot) {
                return Err(CodecError::Unsorted { what: "value set" });
            }
            last = Some(slot);
            values.insert(slot, cur.bytes()?.to_vec());
        }
        cur.finish()?;
        Ok(Self(values))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u32(&mut out, self.0.len() as u32);
        for (slot, value) in &self.0 {
            put_u32(&mut out, *slot);
            put_bytes(&mut out, value);
        }
        out
    }
}
