//! Entry records appended to `table.dat`
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, includes itself and the checksum)
//! +------------------+
//! | Revision         | (u64 LE)
//! +------------------+
//! | Tombstone Flag   | (u8: 0 = live, 1 = deleted)
//! +------------------+
//! | Key              | (u32 LE length-prefixed bytes)
//! +------------------+
//! | Tag              | (u32 LE length-prefixed bytes, empty for tombstones)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself.

use std::io;

use super::checksum::compute_checksum;
use super::diff::{Key, Tag};

/// Smallest possible encoded entry: empty key, empty tag.
pub const MIN_ENTRY_SIZE: usize = 4 + 8 + 1 + 4 + 4 + 4;

/// Largest entry the u32 length prefix can describe.
pub const MAX_ENTRY_SIZE: usize = u32::MAX as usize;

/// One key's state as written by a single revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// Revision that wrote this entry
    pub revision: u64,
    /// Table key
    pub key: Key,
    /// `None` for a tombstone
    pub tag: Option<Tag>,
}

impl EntryRecord {
    pub fn live(revision: u64, key: Key, tag: Tag) -> Self {
        Self {
            revision,
            key,
            tag: Some(tag),
        }
    }

    pub fn tombstone(revision: u64, key: Key) -> Self {
        Self {
            revision,
            key,
            tag: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.tag.is_none()
    }

    /// Encoded size of an entry with these key and tag lengths, or `None`
    /// when it would overflow the u32 length prefix.
    pub fn encoded_len(key_len: usize, tag_len: usize) -> Option<usize> {
        let len = MIN_ENTRY_SIZE.checked_add(key_len)?.checked_add(tag_len)?;
        (len <= MAX_ENTRY_SIZE).then_some(len)
    }

    /// Appends the encoded record to `out` and returns its encoded length.
    ///
    /// Callers must have checked the sizes with [`EntryRecord::encoded_len`].
    pub fn encode_into(&self, out: &mut Vec<u8>) -> usize {
        let tag: &[u8] = self.tag.as_deref().unwrap_or(&[]);
        let record_length = MIN_ENTRY_SIZE + self.key.len() + tag.len();
        debug_assert!(record_length <= MAX_ENTRY_SIZE);
        let start = out.len();

        out.extend_from_slice(&(record_length as u32).to_le_bytes());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.push(if self.is_tombstone() { 1 } else { 0 });
        out.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&(tag.len() as u32).to_le_bytes());
        out.extend_from_slice(tag);

        let checksum = compute_checksum(&out[start..]);
        out.extend_from_slice(&checksum.to_le_bytes());

        record_length
    }

    /// Encodes the record into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Reads the record length prefix without validating anything else.
    pub fn peek_length(data: &[u8]) -> io::Result<usize> {
        if data.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "record length prefix truncated",
            ));
        }
        Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize)
    }

    /// Decodes one record from the front of `data`, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_ENTRY_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "record too short",
            ));
        }

        let record_length = Self::peek_length(data)?;
        if record_length < MIN_ENTRY_SIZE {
            return Err(invalid(format!("invalid record length: {}", record_length)));
        }
        if record_length > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record length {} exceeds available {} bytes",
                    record_length,
                    data.len()
                ),
            ));
        }

        let body = &data[..record_length - 4];
        let stored = u32::from_le_bytes([
            data[record_length - 4],
            data[record_length - 3],
            data[record_length - 2],
            data[record_length - 1],
        ]);
        let computed = compute_checksum(body);
        if stored != computed {
            return Err(invalid(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            )));
        }

        let mut pos = 4;
        let revision = u64::from_le_bytes(read_array::<8>(body, &mut pos)?);
        let flag = body[pos];
        pos += 1;
        let key = read_prefixed(body, &mut pos)?;
        let tag = read_prefixed(body, &mut pos)?;
        if pos != body.len() {
            return Err(invalid("trailing bytes inside record"));
        }

        let tag = match flag {
            0 => Some(tag),
            1 if tag.is_empty() => None,
            1 => return Err(invalid("tombstone carries a tag")),
            other => return Err(invalid(format!("invalid tombstone flag: {}", other))),
        };

        Ok((Self { revision, key, tag }, record_length))
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn read_array<const N: usize>(data: &[u8], pos: &mut usize) -> io::Result<[u8; N]> {
    let end = *pos + N;
    let slice = data
        .get(*pos..end)
        .ok_or_else(|| invalid("field extends past record end"))?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    *pos = end;
    Ok(out)
}

fn read_prefixed(data: &[u8], pos: &mut usize) -> io::Result<Vec<u8>> {
    let len = u32::from_le_bytes(read_array::<4>(data, pos)?) as usize;
    let end = *pos + len;
    let bytes = data
        .get(*pos..end)
        .ok_or_else(|| invalid("length-prefixed field extends past record end"))?
        .to_vec();
    *pos = end;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_record_decodes() {
        let record = EntryRecord::live(3, b"foo".to_vec(), b"posting".to_vec());
        let bytes = record.encode();
        let (decoded, consumed) = EntryRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_tombstone_has_no_tag() {
        let bytes = EntryRecord::tombstone(9, b"gone".to_vec()).encode();
        let (decoded, _) = EntryRecord::decode(&bytes).unwrap();
        assert!(decoded.is_tombstone());
        assert_eq!(decoded.revision, 9);
    }

    #[test]
    fn test_empty_live_tag_is_not_a_tombstone() {
        let bytes = EntryRecord::live(1, b"k".to_vec(), Vec::new()).encode();
        let (decoded, _) = EntryRecord::decode(&bytes).unwrap();
        assert_eq!(decoded.tag, Some(Vec::new()));
    }

    #[test]
    fn test_encoded_len_rejects_oversized_entries() {
        assert_eq!(EntryRecord::encoded_len(0, 0), Some(MIN_ENTRY_SIZE));
        assert_eq!(EntryRecord::encoded_len(3, 5), Some(MIN_ENTRY_SIZE + 8));

        let room = MAX_ENTRY_SIZE - MIN_ENTRY_SIZE;
        assert_eq!(EntryRecord::encoded_len(room, 0), Some(MAX_ENTRY_SIZE));
        assert_eq!(EntryRecord::encoded_len(room, 1), None);
        assert_eq!(EntryRecord::encoded_len(1, u32::MAX as usize), None);
        assert_eq!(EntryRecord::encoded_len(usize::MAX, 1), None);
    }

    #[test]
    fn test_bit_flip_is_rejected() {
        let mut bytes = EntryRecord::live(1, b"key".to_vec(), b"value".to_vec()).encode();
        bytes[14] ^= 0x40;
        let err = EntryRecord::decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_record_is_eof() {
        let bytes = EntryRecord::live(1, b"key".to_vec(), b"value".to_vec()).encode();
        let err = EntryRecord::decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_consecutive_records() {
        let mut buf = Vec::new();
        let first = EntryRecord::live(2, b"a".to_vec(), b"1".to_vec());
        let second = EntryRecord::tombstone(2, b"b".to_vec());
        let first_len = first.encode_into(&mut buf);
        second.encode_into(&mut buf);

        let (_, consumed) = EntryRecord::decode(&buf).unwrap();
        assert_eq!(consumed, first_len);
        let (decoded, _) = EntryRecord::decode(&buf[consumed..]).unwrap();
        assert_eq!(decoded, second);
    }
}
