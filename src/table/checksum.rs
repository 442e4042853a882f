//! CRC32 checksums for table entries and revision slots
//!
//! Every entry appended to `table.dat` and every revision slot carries a
//! CRC32 (IEEE polynomial). A mismatch on read is treated as corruption,
//! or as a discarded revision when the reader's revision has been overwritten.

use crc32fast::Hasher;

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes a CRC32 checksum over several slices as if they were contiguous.
pub fn compute_checksum_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Verifies that the computed checksum matches the expected checksum.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}
