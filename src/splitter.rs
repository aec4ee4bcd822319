//! Compute shard boundaries for a flatfile so that no shard splits an
//! entry.
//!
//! Terminator matching is line-oriented: each physical line is tested
//! (without its trailing newline) against the terminator regex, so a
//! default terminator like `^-$` simply asks "is this whole line a single
//! `-`?". This is equivalent to the anchor-rewriting-over-a-raw-buffer
//! technique for any terminator that, like the default, only ever matches a
//! complete line, and is the simpler of the two to get right in a
//! line-buffered reader.

use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// A shard as `(start_offset, byte_length)`.
pub type Shard = (u64, u64);

/// Split `path` into shards of at least `blocksize` bytes each, ending every
/// shard but the last immediately after a line matching `terminator`. The
/// first shard starts at 0; the last extends to end of file. Returns no
/// shards for an empty file.
pub fn compute_splits(path: &Path, blocksize: u64, terminator: &Regex) -> io::Result<Vec<Shard>> {
    let file_len = path.metadata()?.len();
    if file_len == 0 {
        return Ok(Vec::new());
    }
    let blocksize = blocksize.max(1);

    let mut boundaries = vec![0u64];
    let mut reader = BufReader::new(File::open(path)?);
    let mut pos = 0u64;
    let mut next_target = blocksize;
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        pos += n as u64;
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches('\n').trim_end_matches('\r');
        if pos >= next_target && terminator.is_match(trimmed) {
            boundaries.push(pos);
            next_target = pos + blocksize;
        }
    }
    if *boundaries.last().unwrap() != file_len {
        boundaries.push(file_len);
    }

    Ok(boundaries
        .windows(2)
        .filter_map(|w| (w[1] > w[0]).then_some((w[0], w[1] - w[0])))
        .collect())
}

/// Split on plain newlines, ignoring entry semantics entirely — every line
/// is an acceptable boundary.
pub fn compute_splits_by_line(path: &Path, blocksize: u64) -> io::Result<Vec<Shard>> {
    let any_line = Regex::new(".*").expect("trivial pattern");
    compute_splits(path, blocksize, &any_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn splits_do_not_break_entries() {
        let mut f = NamedTempFile::new().unwrap();
        for i in 0..20 {
            writeln!(f, "entry {i} line one").unwrap();
            writeln!(f, "entry {i} line two").unwrap();
            writeln!(f, "-").unwrap();
        }
        f.flush().unwrap();
        let terminator = Regex::new(r"^-$").unwrap();
        let shards = compute_splits(f.path(), 100, &terminator).unwrap();
        assert!(shards.len() > 1);
        let total: u64 = shards.iter().map(|(_, len)| *len).sum();
        assert_eq!(total, f.path().metadata().unwrap().len());
        // every boundary but the last lands right after a "-\n" line
        let content = std::fs::read(f.path()).unwrap();
        for &(start, len) in &shards {
            let end = start + len;
            if end != content.len() as u64 {
                assert_eq!(&content[(end - 2) as usize..end as usize], b"-\n");
            }
        }
    }

    #[test]
    fn empty_file_has_no_shards() {
        let f = NamedTempFile::new().unwrap();
        let terminator = Regex::new(r"^-$").unwrap();
        assert!(compute_splits(f.path(), 100, &terminator).unwrap().is_empty());
    }
}
