//! C7: append a pre-indexed delta flatfile to a base flatfile and
//! merge-sort the two positional indexes, shifting every delta position by
//! the base flatfile's size.
//!
//! The delta index is read once, line by line, and each line's position
//! field is decoded, shifted, and re-encoded; for a small delta this is
//! buffered in memory, otherwise it spills to a temp file, matching the
//! `-s/--small` choice between the two strategies. Either
//! way the shifted delta is still itself sorted (shifting every position by
//! the same constant cannot reorder it), so producing the merged index is a
//! plain two-way merge against the already-sorted base index.

use crate::error::MergeError;
use crate::index::{self, Flavor};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Size under which the delta index is shifted entirely in memory rather
/// than spilled to a temp file.
pub const SMALL_THRESHOLD: u64 = 1 << 20;

fn first_line(path: &Path) -> Result<String, MergeError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line)
}

fn check_compatible(base_index: &Path, delta_index: &Path) -> Result<index::IndexClass, MergeError> {
    let base_class = index::classify(&first_line(base_index)?)?;
    let delta_class = index::classify(&first_line(delta_index)?)?;
    let compatible = base_class.flavor == delta_class.flavor
        && base_class.cipher.map(|c| c.letter()) == delta_class.cipher.map(|c| c.letter())
        && base_class.has_checksum == delta_class.has_checksum;
    if !compatible {
        return Err(MergeError::IncompatibleIndex(format!(
            "base is {:?} (checksum={}), delta is {:?} (checksum={})",
            base_class.flavor, base_class.has_checksum, delta_class.flavor, delta_class.has_checksum
        )));
    }
    Ok(base_class)
}

fn shift_line(line: &str, flavor: Flavor, cipher: Option<crate::crypto::CipherKind>, offset: u64) -> Result<String, MergeError> {
    if flavor == Flavor::NoPos {
        return Ok(format!("{}\n", line.trim_end_matches('\n')));
    }
    let entry = index::parse_line(line, flavor)?;
    Ok(index::format_line(
        &entry.identifier,
        flavor,
        entry.position + offset,
        entry.length,
        cipher,
        entry.iv.as_ref(),
        entry.checksum,
    ))
}

/// Produce the shifted delta index as a sequence of lines, either fully
/// buffered in memory or spooled through a temp file depending on size.
fn shifted_delta_lines(
    delta_index: &Path,
    flavor: Flavor,
    cipher: Option<crate::crypto::CipherKind>,
    offset: u64,
    force_small: bool,
) -> Result<Box<dyn Iterator<Item = Result<String, MergeError>>>, MergeError> {
    let size = delta_index.metadata()?.len();
    if force_small || size <= SMALL_THRESHOLD {
        let reader = BufReader::new(File::open(delta_index)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(shift_line(&line?, flavor, cipher, offset));
        }
        Ok(Box::new(lines.into_iter()))
    } else {
        let reader = BufReader::new(File::open(delta_index)?);
        let tmp = tempfile::NamedTempFile::new()?;
        {
            let mut writer = BufWriter::new(tmp.reopen()?);
            for line in reader.lines() {
                writer.write_all(shift_line(&line?, flavor, cipher, offset)?.as_bytes())?;
            }
            writer.flush()?;
        }
        let shifted_reader = BufReader::new(tmp.reopen()?);
        Ok(Box::new(shifted_reader.lines().map(|l| Ok(l?))))
    }
}

/// Two-way merge of two already-sorted line sequences.
fn merge_sorted(base: impl Iterator<Item = std::io::Result<String>>, delta: impl Iterator<Item = Result<String, MergeError>>, out: &mut impl Write) -> Result<(), MergeError> {
    let mut base = base.peekable();
    let mut delta = delta.peekable();
    loop {
        match (base.peek(), delta.peek()) {
            (Some(Ok(_)), Some(Ok(_))) => {
                let take_base = base.peek().unwrap().as_ref().unwrap() <= delta.peek().unwrap().as_ref().unwrap();
                let line = if take_base { base.next().unwrap()? } else { delta.next().unwrap()? };
                writeln!(out, "{}", line.trim_end_matches('\n'))?;
            }
            (Some(Ok(_)), None) => {
                let line = base.next().unwrap()?;
                writeln!(out, "{}", line.trim_end_matches('\n'))?;
            }
            (None, Some(Ok(_))) => {
                let line = delta.next().unwrap()?;
                writeln!(out, "{}", line.trim_end_matches('\n'))?;
            }
            (Some(Err(_)), _) => {
                base.next().unwrap()?;
            }
            (_, Some(Err(_))) => {
                delta.next().unwrap()?;
            }
            (None, None) => break,
        }
    }
    Ok(())
}

pub struct MergeResult {
    pub new_flatfile_size: u64,
}

/// Merge `delta_ff`/`delta_index` into `base_ff`/`base_index`, writing
/// `new_ff` and `new_index`. `force_small` mirrors `-s/--small`.
pub fn merge(
    base_ff: &Path,
    base_index: &Path,
    delta_ff: &Path,
    delta_index: &Path,
    new_ff: &Path,
    new_index: &Path,
    force_small: bool,
) -> Result<MergeResult, MergeError> {
    let class = check_compatible(base_index, delta_index)?;
    let offset = base_ff.metadata()?.len();

    let delta_lines = shifted_delta_lines(delta_index, class.flavor, class.cipher, offset, force_small)?;
    let base_lines = BufReader::new(File::open(base_index)?).lines();
    let mut out = BufWriter::new(File::create(new_index)?);
    merge_sorted(base_lines, delta_lines, &mut out)?;
    out.flush()?;

    let mut new_file = BufWriter::new(File::create(new_ff)?);
    std::io::copy(&mut File::open(base_ff)?, &mut new_file)?;
    std::io::copy(&mut File::open(delta_ff)?, &mut new_file)?;
    new_file.flush()?;

    let new_size = offset + delta_ff.metadata()?.len();
    debug_assert_eq!(new_ff.metadata()?.len(), new_size);
    Ok(MergeResult { new_flatfile_size: new_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn write_file(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn merge_is_additive_and_sorted() {
        let base_ff = write_file(b"0123456789");
        let base_idx = write_file(b"AC001\t0-5\nAC003\t5-5\n");
        let delta_ff = write_file(b"abcde");
        let delta_idx = write_file(b"AC002\t0-5\n");

        let new_ff = tempfile::NamedTempFile::new().unwrap();
        let new_idx = tempfile::NamedTempFile::new().unwrap();
        let result = merge(base_ff.path(), base_idx.path(), delta_ff.path(), delta_idx.path(), new_ff.path(), new_idx.path(), true).unwrap();

        assert_eq!(result.new_flatfile_size, 15);
        assert_eq!(new_ff.path().metadata().unwrap().len(), 15);

        let lines: Vec<String> = BufReader::new(File::open(new_idx.path()).unwrap())
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["AC001\t0-5", "AC002\t10-5", "AC003\t5-5"]);
    }

    #[test]
    fn incompatible_flavors_are_rejected() {
        let base_idx = write_file(b"AC001\t0-5\n");
        let delta_idx = write_file(b"AC002\t0:5\n");
        let base_ff = write_file(b"01234");
        let delta_ff = write_file(b"56789");
        let new_ff = tempfile::NamedTempFile::new().unwrap();
        let new_idx = tempfile::NamedTempFile::new().unwrap();
        let err = merge(base_ff.path(), base_idx.path(), delta_ff.path(), delta_idx.path(), new_ff.path(), new_idx.path(), true).unwrap_err();
        assert!(matches!(err, MergeError::IncompatibleIndex(_)));
    }
}
