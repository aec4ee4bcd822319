//! Binary search over a sorted, line-oriented text file by byte offset,
//! without requiring a line index.
//!
//! Each probe seeks to a midpoint byte offset, discards whatever partial
//! line it landed inside by reading up to the next newline, then reads the
//! following full line as the actual probe value. Because the file is
//! sorted lexicographically by whole line, this converges to the leftmost
//! line not less than the search key in `O(log N)` probes.

use crate::error::SearchError;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    First,
    Last,
    All,
}

/// Seek to `offset`, discard a partial line if not already at a line start,
/// and read the next full line. Returns `(line_start_offset, line)`; `line`
/// is empty at end of file.
fn probe_line(file: &mut File, offset: u64) -> Result<(u64, String), SearchError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(offset))?;
    if offset != 0 {
        let mut discard = String::new();
        reader.read_line(&mut discard)?;
    }
    let line_start = reader.stream_position()?;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok((line_start, line))
}

/// Find all lines beginning with `key` per `mode`. Returns `(byte_offset,
/// line)` pairs with the trailing newline stripped from `line`, in file
/// order. Empty if no line starts with `key`.
pub fn search(file: &mut File, key: &str, mode: Mode) -> Result<Vec<(u64, String)>, SearchError> {
    let file_len = file.seek(SeekFrom::End(0))?;
    let mut lo = 0u64;
    let mut hi = file_len;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (line_start, line) = probe_line(file, mid)?;
        if line.is_empty() {
            hi = mid;
            continue;
        }
        let trimmed = line.trim_end_matches('\n');
        if trimmed < key {
            lo = line_start + line.len() as u64;
        } else {
            hi = line_start;
        }
    }

    let (start, first_line) = probe_line(file, lo)?;
    if first_line.is_empty() || !first_line.starts_with(key) {
        return Ok(Vec::new());
    }

    if mode == Mode::First {
        return Ok(vec![(start, first_line.trim_end_matches('\n').to_string())]);
    }

    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(start))?;
    let mut matches = Vec::new();
    let mut pos = start;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 || !line.starts_with(key) {
            break;
        }
        matches.push((pos, line.trim_end_matches('\n').to_string()));
        pos += n as u64;
    }

    match mode {
        Mode::First => unreachable!(),
        Mode::Last => Ok(matches.into_iter().last().into_iter().collect()),
        Mode::All => Ok(matches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_file(lines: &[&str]) -> File {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        f.flush().unwrap();
        f.reopen().unwrap()
    }

    #[test]
    fn finds_first_and_last_of_duplicates() {
        let mut file = make_file(&["AC001\t1-2", "AC002\t3-4", "AC002\t5-6", "AC003\t7-8"]);
        let first = search(&mut file, "AC002\t", Mode::First).unwrap();
        assert_eq!(first, vec![(12u64, "AC002\t3-4".to_string())]);
        let last = search(&mut file, "AC002\t", Mode::Last).unwrap();
        assert_eq!(last[0].1, "AC002\t5-6");
        let all = search(&mut file, "AC002\t", Mode::All).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn missing_key_is_empty() {
        let mut file = make_file(&["AC001\t1-2", "AC003\t7-8"]);
        assert!(search(&mut file, "AC002\t", Mode::First).unwrap().is_empty());
    }

    #[test]
    fn single_line_file() {
        let mut file = make_file(&["AC001\t1-2"]);
        let found = search(&mut file, "AC001\t", Mode::First).unwrap();
        assert_eq!(found, vec![(0u64, "AC001\t1-2".to_string())]);
    }
}
