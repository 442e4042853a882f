//! Database-wide statistics stored in the Records table

use super::codec::{CodecError, CodecResult, DocId};

/// Key of the statistics entry in Records
pub const STATS_KEY: &[u8] = b"";

const STATS_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub doc_count: u32,
    pub last_docid: DocId,
    /// Sum of every document's length
    pub total_length: u64,
}

impl DatabaseStats {
    pub fn decode(tag: &[u8]) -> CodecResult<Self> {
        if tag.len() < STATS_LEN {
            return Err(CodecError::Truncated {
                what: "statistics",
                offset: tag.len(),
            });
        }
        if tag.len() > STATS_LEN {
            return Err(CodecError::Trailing {
                what: "statistics",
                extra: tag.len() - STATS_LEN,
            });
        }
        let mut u32_bytes = [0u8; 4];
        let mut u64_bytes = [0u8; 8];

        u32_bytes.copy_from_slice(&tag[0..4]);
        let doc_count = u32::from_le_bytes(u32_bytes);
        u32_bytes.copy_from_slice(&tag[4..8]);
        let last_docid = u32::from_le_bytes(u32_bytes);
        u64_bytes.copy_from_slice(&tag[8..16]);
        let total_length = u64::from_le_bytes(u64_bytes);

        Ok(Self {
            doc_count,
            last_docid,
            total_length,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATS_LEN);
        out.extend_from_slice(&self.doc_count.to_le_bytes());
        out.extend_from_slice(&self.last_docid.to_le_bytes());
        out.extend_from_slice(&self.total_length.to_le_bytes());
        out
    }

    /// Mean document length; 0 for an empty database.
    pub fn average_length(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_length as f64 / f64::from(self.doc_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_layout() {
        let stats = DatabaseStats {
            doc_count: 2,
            last_docid: 5,
            total_length: 9,
        };
        let bytes = stats.encode();
        assert_eq!(bytes.len(), 16);
        assert_eq!(DatabaseStats::decode(&bytes).unwrap(), stats);
    }

    #[test]
    fn test_short_stats_rejected() {
        assert!(DatabaseStats::decode(&[0u8; 15]).is_err());
        assert!(DatabaseStats::decode(&[0u8; 17]).is_err());
    }

    #[test]
    fn test_average_length() {
        assert_eq!(DatabaseStats::default().average_length(), 0.0);
        let stats = DatabaseStats {
            doc_count: 4,
            last_docid: 4,
            total_length: 10,
        };
        assert_eq!(stats.average_length(), 2.5);
    }
}
