//! Stream a byte file, yielding successive entries bounded by a terminator.
//!
//! Matches [`crate::splitter`]'s line-oriented terminator test: each line is
//! read whole, tested against the terminator regex (trailing newline
//! stripped), and accumulated into the current entry until a line matches.
//! Content after the last terminator match, if any, is junk and is dropped
//! rather than yielded as a final partial entry.

use regex::Regex;
use std::io::{self, BufRead};

pub struct Entry {
    pub bytes: Vec<u8>,
}

impl Entry {
    pub fn length(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub struct EntryScanner<R> {
    reader: R,
    terminator: Regex,
}

impl<R: BufRead> EntryScanner<R> {
    pub fn new(reader: R, terminator: Regex) -> Self {
        Self { reader, terminator }
    }
}

impl<R: BufRead> Iterator for EntryScanner<R> {
    type Item = io::Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = Vec::new();
        loop {
            let mut line = Vec::new();
            match self.reader.read_until(b'\n', &mut line) {
                Err(e) => return Some(Err(e)),
                Ok(0) => return None,
                Ok(_) => {
                    buf.extend_from_slice(&line);
                    let text = String::from_utf8_lossy(&line);
                    let trimmed = text.trim_end_matches('\n').trim_end_matches('\r');
                    if self.terminator.is_match(trimmed) {
                        return Some(Ok(Entry { bytes: buf }));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn yields_entries_and_drops_trailing_junk() {
        let data = b"one\ntwo\n-\nthree\n-\njunk without terminator";
        let terminator = Regex::new(r"^-$").unwrap();
        let scanner = EntryScanner::new(Cursor::new(&data[..]), terminator);
        let entries: Vec<_> = scanner.map(|e| e.unwrap().bytes).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], b"one\ntwo\n-\n");
        assert_eq!(entries[1], b"three\n-\n");
    }
}
