//! C8: map uncompressed byte positions to compressed byte positions for an
//! externally block-gzipped flatfile (BGZF or gztool), so a range of
//! uncompressed bytes can be fetched without decompressing the whole file.
//!
//! Both flavors expose the same small capability set; callers resolve an
//! uncompressed offset to a block id, then ask for that block's compressed
//! byte range.

use crate::error::BlockMapError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Uncompressed byte stride of one BGZF block. Frozen by the BGZF format.
pub const BGZF_STRIDE: u64 = 65_280;

pub trait BlockMap {
    /// Block id covering uncompressed offset `p`.
    fn block_for_uncompressed_offset(&self, p: u64) -> usize;
    /// Compressed byte offset where block `id` begins.
    fn compressed_start(&self, id: usize) -> u64;
    /// Compressed byte offset just past block `id`.
    fn compressed_end(&self, id: usize) -> u64;
    /// Uncompressed byte offset where block `id` begins.
    fn uncompressed_start(&self, id: usize) -> u64;
    fn max_blockid(&self) -> usize;
}

/// A BGZF `.gzi` sidecar: little-endian `u64` count `N` followed by `N`
/// `(compressed_offset, uncompressed_offset)` pairs. Block 0 is implicit at
/// `(0, 0)` and is not stored in the file.
pub struct BgzfIndex {
    /// `(compressed_offset, uncompressed_offset)` per block boundary,
    /// including the implicit `(0, 0)` entry at index 0.
    boundaries: Vec<(u64, u64)>,
}

impl BgzfIndex {
    pub fn read(gzi_path: &Path) -> Result<Self, BlockMapError> {
        let mut reader = BufReader::new(File::open(gzi_path)?);
        let count = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| BlockMapError::CorruptBlockIndex(e.to_string()))?;
        let mut boundaries = Vec::with_capacity(count as usize + 1);
        boundaries.push((0, 0));
        for _ in 0..count {
            let compressed = reader
                .read_u64::<LittleEndian>()
                .map_err(|e| BlockMapError::CorruptBlockIndex(e.to_string()))?;
            let uncompressed = reader
                .read_u64::<LittleEndian>()
                .map_err(|e| BlockMapError::CorruptBlockIndex(e.to_string()))?;
            boundaries.push((compressed, uncompressed));
        }
        if boundaries.windows(2).any(|w| w[1].1 <= w[0].1 || w[1].0 <= w[0].0) {
            return Err(BlockMapError::CorruptBlockIndex(
                "gzi boundaries are not strictly increasing".to_string(),
            ));
        }
        Ok(Self { boundaries })
    }
}

impl BlockMap for BgzfIndex {
    fn block_for_uncompressed_offset(&self, p: u64) -> usize {
        (p / BGZF_STRIDE) as usize
    }

    fn compressed_start(&self, id: usize) -> u64 {
        self.boundaries[id].0
    }

    fn compressed_end(&self, id: usize) -> u64 {
        self.boundaries
            .get(id + 1)
            .map(|b| b.0)
            .unwrap_or(self.boundaries.last().unwrap().0)
    }

    fn uncompressed_start(&self, id: usize) -> u64 {
        self.boundaries[id].1
    }

    fn max_blockid(&self) -> usize {
        self.boundaries.len() - 1
    }
}

/// A gztool index: variable-stride block boundaries read from the external
/// `gztool -i` sidecar. Unlike BGZF the uncompressed stride is not fixed, so
/// block lookup is a binary search over the ascending uncompressed-offset
/// array rather than a division.
pub struct GztoolIndex {
    /// `(compressed_offset, uncompressed_offset)` per block, ascending by
    /// both fields.
    blocks: Vec<(u64, u64)>,
}

impl GztoolIndex {
    pub fn from_records(blocks: Vec<(u64, u64)>) -> Result<Self, BlockMapError> {
        if blocks.is_empty() || blocks.windows(2).any(|w| w[1].1 <= w[0].1) {
            return Err(BlockMapError::CorruptBlockIndex(
                "gztool blocks are not strictly increasing by uncompressed offset".to_string(),
            ));
        }
        Ok(Self { blocks })
    }
}

impl BlockMap for GztoolIndex {
    fn block_for_uncompressed_offset(&self, p: u64) -> usize {
        match self.blocks.binary_search_by_key(&p, |b| b.1) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }

    /// One byte before the reported offset, to give the decompressor the
    /// deflate-block context it needs to resume mid-stream.
    fn compressed_start(&self, id: usize) -> u64 {
        self.blocks[id].0.saturating_sub(1)
    }

    fn compressed_end(&self, id: usize) -> u64 {
        self.blocks.get(id + 1).map(|b| b.0).unwrap_or(self.blocks.last().unwrap().0)
    }

    fn uncompressed_start(&self, id: usize) -> u64 {
        self.blocks[id].1
    }

    fn max_blockid(&self) -> usize {
        self.blocks.len() - 1
    }
}

/// Read every byte of `reader` as little-endian `u64`s, used for tests and
/// for parsing a gztool index dumped in the same shape.
pub fn read_u64_pairs(mut reader: impl Read) -> std::io::Result<Vec<(u64, u64)>> {
    let mut out = Vec::new();
    loop {
        let a = match reader.read_u64::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        let b = reader.read_u64::<LittleEndian>()?;
        out.push((a, b));
    }
    Ok(out)
}
