//! IEEE CRC32 over plaintext entry bytes, rendered in the position codec's
//! alphabet so checksums sit inline in an index line without a second
//! delimiter.

use crate::b64;

pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

pub fn checksum_b64(bytes: &[u8]) -> String {
    b64::int_to_b64(checksum(bytes) as u64)
}
