//! Raw DEFLATE (no zlib or gzip header) per-entry compression.
//!
//! Per-entry framing already carries the plaintext length in the index, so a
//! zlib/gzip wrapper would only add bytes without adding information.

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use std::io::{self, Read};

pub fn deflate(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(data, Compression::new(level.min(9)));
    let mut out = Vec::with_capacity(data.len());
    encoder.read_to_end(&mut out)?;
    Ok(out)
}

pub fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = deflate(&data, 9).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(inflate(&compressed).unwrap(), data);
    }
}
