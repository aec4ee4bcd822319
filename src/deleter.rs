//! C11: remove chosen entries from a flatfile and rewrite the index with
//! every surviving position shifted by the cumulative size of the removed
//! entries that precede it.
//!
//! Resolution of identifiers to positions reuses [`crate::extractor`]'s
//! first/last/duplicates lookup policy, so deletion selection agrees with
//! extraction selection for the same flags.

use crate::error::DeleteError;
use crate::extractor::{self, LookupMode};
use crate::index::{self, Flavor};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub struct DeletePlan {
    /// Ascending removed positions mapped to their byte length.
    pub position2size: BTreeMap<u64, u64>,
    pub not_found: Vec<String>,
}

/// Resolve `identifiers` against `index_path` under `mode` and collect the
/// set of `(position, length)` pairs to remove. Duplicate positions (the
/// same entry reached by two identifiers) collapse naturally via the map.
pub fn plan_deletion(index_path: &Path, identifiers: &[String], mode: LookupMode) -> anyhow::Result<DeletePlan> {
    let (_, _, found, not_found) = extractor::resolve(index_path, identifiers, mode)?;
    let mut position2size = BTreeMap::new();
    for (_, entry) in found {
        position2size.insert(entry.position, entry.length);
    }
    Ok(DeletePlan { position2size, not_found })
}

/// Stream `input` into `output`, skipping every `[position, position+length)`
/// run named in `plan`. Returns the new file's size. Errors with
/// [`DeleteError::SizeMismatch`] if the arithmetic doesn't add up.
pub fn rewrite_flatfile(input: &Path, output: &Path, plan: &DeletePlan) -> Result<u64, DeleteError> {
    let mut infile = File::open(input)?;
    let input_size = infile.metadata()?.len();
    let mut out = BufWriter::new(File::create(output)?);

    let mut cursor = 0u64;
    let mut removed_total = 0u64;
    for (&position, &length) in &plan.position2size {
        if position > cursor {
            copy_range(&mut infile, &mut out, cursor, position - cursor)?;
        }
        cursor = position + length;
        removed_total += length;
    }
    if cursor < input_size {
        copy_range(&mut infile, &mut out, cursor, input_size - cursor)?;
    }
    out.flush()?;

    let expected = input_size - removed_total;
    let actual = output.metadata()?.len();
    if expected != actual {
        return Err(DeleteError::SizeMismatch { expected, actual });
    }
    Ok(actual)
}

fn copy_range(input: &mut File, out: &mut impl Write, start: u64, len: u64) -> std::io::Result<()> {
    input.seek(SeekFrom::Start(start))?;
    let mut remaining = len;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        input.read_exact(&mut buf[..chunk])?;
        out.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

/// For a surviving index line's `position`, the number of bytes to subtract
/// — the cumulative length of every removed entry at or before `position`.
/// Positions that are themselves removed are handled by the caller (the
/// line is dropped, not shifted).
fn shift_for(position: u64, plan: &DeletePlan) -> u64 {
    plan.position2size
        .range(..=position)
        .map(|(_, &len)| len)
        .sum()
}

pub struct ReindexStats {
    pub total: u64,
    pub shifted: u64,
    pub skipped: u64,
}

/// Rewrite `index_path` into `output`, dropping lines whose position is in
/// `plan` and subtracting each survivor's cumulative shift. `flavor`/`cipher`
/// come from classifying the index's first line.
pub fn reindex(
    index_path: &Path,
    output: &Path,
    plan: &DeletePlan,
    flavor: Flavor,
    cipher: Option<crate::crypto::CipherKind>,
) -> Result<ReindexStats, DeleteError> {
    let reader = BufReader::new(File::open(index_path)?);
    let mut out = BufWriter::new(File::create(output)?);
    let mut total = 0u64;
    let mut shifted = 0u64;
    let mut skipped = 0u64;

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        total += 1;
        if flavor == Flavor::NoPos {
            writeln!(out, "{line}")?;
            continue;
        }
        let entry = index::parse_line(&line, flavor)?;
        if plan.position2size.contains_key(&entry.position) {
            skipped += 1;
            continue;
        }
        let shift = shift_for(entry.position, plan);
        if shift > 0 {
            shifted += 1;
        }
        let new_line = index::format_line(
            &entry.identifier,
            flavor,
            entry.position - shift,
            entry.length,
            cipher,
            entry.iv.as_ref(),
            entry.checksum,
        );
        out.write_all(new_line.as_bytes())?;
    }
    out.flush()?;
    Ok(ReindexStats { total, shifted, skipped })
}

/// Split `index_path` into line-aligned shards and apply [`reindex`] to
/// each independently, then concatenate the shard outputs in order into
/// `output`.
pub fn reindex_parallel(
    index_path: &Path,
    output: &Path,
    plan: &DeletePlan,
    flavor: Flavor,
    cipher: Option<crate::crypto::CipherKind>,
    blocksize: u64,
    threads: usize,
) -> anyhow::Result<ReindexStats> {
    use crate::splitter;
    use rayon::prelude::*;

    let shards = splitter::compute_splits_by_line(index_path, blocksize)?;
    if shards.len() <= 1 {
        return Ok(reindex(index_path, output, plan, flavor, cipher)?);
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads.max(1)).build()?;
    let shard_outputs: Vec<(tempfile::NamedTempFile, ReindexStats)> = pool.install(|| {
        shards
            .par_iter()
            .map(|&(start, len)| -> anyhow::Result<_> {
                let mut f = File::open(index_path)?;
                f.seek(SeekFrom::Start(start))?;
                let mut buf = vec![0u8; len as usize];
                f.read_exact(&mut buf)?;
                let tmp_in = tempfile::NamedTempFile::new()?;
                std::fs::write(tmp_in.path(), &buf)?;
                let tmp_out = tempfile::NamedTempFile::new()?;
                let stats = reindex(tmp_in.path(), tmp_out.path(), plan, flavor, cipher)?;
                Ok((tmp_out, stats))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut out = BufWriter::new(File::create(output)?);
    let mut total = ReindexStats { total: 0, shifted: 0, skipped: 0 };
    for (tmp, stats) in shard_outputs {
        std::io::copy(&mut File::open(tmp.path())?, &mut out)?;
        total.total += stats.total;
        total.shifted += stats.shifted;
        total.skipped += stats.skipped;
    }
    out.flush()?;
    Ok(total)
}
