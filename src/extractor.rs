//! C10: resolve identifiers to byte ranges, optionally batch adjacent
//! ranges into one fetch, retrieve bytes from a local file, a remote HTTP
//! Range source, or either flavor of block-gzipped source, and reverse any
//! per-entry encryption/compression before handing back plaintext.

use crate::blockmap::BlockMap;
use crate::cache::{CacheDir, Resolution as CacheResolution};
use crate::crc;
use crate::crypto::{self, CipherKind};
use crate::deflate;
use crate::error::{CacheError, ExtractError};
use crate::index::{self, Flavor, IndexEntry};
use crate::remote;
use crate::search::{self, Mode as SearchMode};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    First,
    Last,
    Duplicates,
}

impl From<LookupMode> for SearchMode {
    fn from(m: LookupMode) -> Self {
        match m {
            LookupMode::First => SearchMode::First,
            LookupMode::Last => SearchMode::Last,
            LookupMode::Duplicates => SearchMode::All,
        }
    }
}

/// Resolve each of `identifiers` against the sorted index at `index_path`
/// under `mode`. Identifiers with no match are reported via `not_found`.
/// Returns the index's classified flavor and cipher kind alongside the
/// matches so callers can derive a decryption key without re-reading the
/// index's first line themselves.
pub fn resolve(
    index_path: &Path,
    identifiers: &[String],
    mode: LookupMode,
) -> anyhow::Result<(Flavor, Option<CipherKind>, Vec<(String, IndexEntry)>, Vec<String>)> {
    let mut file = File::open(index_path)?;
    let first_line = {
        let mut buf = [0u8; 4096];
        let n = file.read(&mut buf)?;
        file.seek(SeekFrom::Start(0))?;
        String::from_utf8_lossy(&buf[..n]).lines().next().unwrap_or("").to_string()
    };
    let class = index::classify(&first_line)?;

    let mut found = Vec::new();
    let mut not_found = Vec::new();
    for id in identifiers {
        let key = format!("{id}{}", index::FIELDSEP);
        let lines = search::search(&mut file, &key, mode.into())?;
        if lines.is_empty() {
            not_found.push(id.clone());
            continue;
        }
        for (_, line) in lines {
            found.push((id.clone(), index::parse_line(&line, class.flavor)?));
        }
    }
    Ok((class.flavor, class.cipher, found, not_found))
}

/// One physical fetch, possibly covering several adjacent index entries.
pub struct MergedRequest {
    pub position: u64,
    pub length: u64,
    /// `(identifier, offset_within_fetch, entry)` in ascending offset order.
    pub parts: Vec<(String, u64, IndexEntry)>,
}

/// Sort by position and coalesce runs where `prev.position + prev.length ==
/// next.position` into one [`MergedRequest`]. Observationally transparent:
/// each part keeps its own entry (iv, checksum) so post-processing a merged
/// fetch is identical to post-processing the same entries fetched alone.
pub fn batch_adjacent(mut entries: Vec<(String, IndexEntry)>) -> Vec<MergedRequest> {
    entries.sort_by_key(|(_, e)| e.position);
    let mut out: Vec<MergedRequest> = Vec::new();
    for (id, entry) in entries {
        if let Some(last) = out.last_mut() {
            if last.position + last.length == entry.position {
                let offset = last.length;
                last.length += entry.length;
                last.parts.push((id, offset, entry));
                continue;
            }
        }
        out.push(MergedRequest {
            position: entry.position,
            length: entry.length,
            parts: vec![(id, 0, entry)],
        });
    }
    out
}

/// Where the flatfile's bytes come from.
pub enum Source<'a> {
    LocalPlain { path: &'a Path },
    LocalBgzf { path: &'a Path, blockmap: &'a dyn BlockMap },
    RemotePlain { url: &'a str },
    RemoteBgzf { url: &'a str, blockmap: &'a dyn BlockMap, cache: Option<&'a CacheDir> },
}

fn read_local_range(path: &Path, position: u64, length: u64) -> std::io::Result<Vec<u8>> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(position))?;
    let mut buf = vec![0u8; length as usize];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

/// Decompress the minimal span of BGZF/gzip blocks covering `[position,
/// position+length)` and trim to exactly that uncompressed range.
fn fetch_via_blockmap(compressed: &[u8], blockmap: &dyn BlockMap, start_block: usize, position: u64, length: u64) -> std::io::Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(compressed);
    let mut all = Vec::new();
    decoder.read_to_end(&mut all)?;
    let block_uncompressed_start = blockmap.uncompressed_start(start_block);
    let trim_from = (position - block_uncompressed_start) as usize;
    let trim_to = trim_from + length as usize;
    Ok(all[trim_from..trim_to.min(all.len())].to_vec())
}

fn fetch_raw(source: &Source, position: u64, length: u64) -> anyhow::Result<Vec<u8>> {
    match source {
        Source::LocalPlain { path } => Ok(read_local_range(path, position, length)?),
        Source::LocalBgzf { path, blockmap } => {
            let start_block = blockmap.block_for_uncompressed_offset(position);
            let end_block = blockmap.block_for_uncompressed_offset(position + length - 1);
            let compressed_start = blockmap.compressed_start(start_block);
            let compressed_end = blockmap.compressed_end(end_block);
            let compressed = read_local_range(path, compressed_start, compressed_end - compressed_start)?;
            Ok(fetch_via_blockmap(&compressed, *blockmap, start_block, position, length)?)
        }
        Source::RemotePlain { url } => Ok(remote::fetch_range(url, position, position + length - 1)?),
        Source::RemoteBgzf { url, blockmap, cache } => {
            let start_block = blockmap.block_for_uncompressed_offset(position);
            let end_block = blockmap.block_for_uncompressed_offset(position + length - 1);
            let compressed_start = blockmap.compressed_start(start_block);
            let compressed_end = blockmap.compressed_end(end_block);
            let compressed = fetch_remote_span(url, cache.copied(), start_block as u64, end_block as u64, compressed_start, compressed_end)?;
            Ok(fetch_via_blockmap(&compressed, *blockmap, start_block, position, length)?)
        }
    }
}

fn fetch_remote_span(
    url: &str,
    cache: Option<&CacheDir>,
    start_block: u64,
    end_block: u64,
    compressed_start: u64,
    compressed_end: u64,
) -> anyhow::Result<Vec<u8>> {
    let Some(cache) = cache else {
        return Ok(remote::fetch_range(url, compressed_start, compressed_end.saturating_sub(1))?);
    };
    match cache.resolve(start_block, end_block)? {
        CacheResolution::Served(path) => Ok(std::fs::read(path)?),
        CacheResolution::Fresh => {
            let bytes = remote::fetch_range(url, compressed_start, compressed_end.saturating_sub(1))?;
            let path = cache.write_fresh(start_block, end_block, &bytes)?;
            Ok(std::fs::read(path)?)
        }
        CacheResolution::TailExtend { span, missing_from } => {
            let missing_bytes = remote::fetch_range(url, span.end + 1, compressed_end.saturating_sub(1))?;
            let _ = missing_from;
            let path = cache.grow_tail(&span, end_block, &missing_bytes).map_err(anyhow_from_cache)?;
            Ok(std::fs::read(path)?)
        }
        CacheResolution::HeadExtend { span, missing_to } => {
            let missing_bytes = remote::fetch_range(url, compressed_start, span.start.saturating_sub(1))?;
            let _ = missing_to;
            let path = cache.grow_head(&span, start_block, &missing_bytes).map_err(anyhow_from_cache)?;
            Ok(std::fs::read(path)?)
        }
    }
}

fn anyhow_from_cache(e: CacheError) -> anyhow::Error {
    anyhow::anyhow!(e)
}

pub struct ExtractOptions {
    pub flavor: Flavor,
    pub cipher: Option<CipherKind>,
    pub key: Option<Vec<u8>>,
    pub xsanity: bool,
}

/// Decrypt (if encrypted), inflate (if compressed) and optionally verify one
/// entry's bytes. `raw` is the slice belonging to exactly this entry.
pub fn postprocess(raw: &[u8], entry: &IndexEntry, opts: &ExtractOptions) -> Result<Vec<u8>, ExtractError> {
    let mut data = raw.to_vec();
    if opts.flavor.is_encrypted() {
        let iv = entry.iv.ok_or_else(|| ExtractError::Corrupted("missing iv".to_string()))?;
        let kind = opts.cipher.ok_or_else(|| ExtractError::Corrupted("missing cipher".to_string()))?;
        let key = opts.key.as_deref().ok_or_else(|| ExtractError::Corrupted("missing key".to_string()))?;
        data = crypto::decrypt(kind, key, &iv, &data).map_err(|_| ExtractError::Corrupted(entry.identifier.clone()))?;
    }
    if opts.flavor.is_compressed() {
        data = deflate::inflate(&data).map_err(|_| ExtractError::Corrupted(entry.identifier.clone()))?;
    }
    if opts.xsanity {
        let expected = entry.checksum.ok_or_else(|| ExtractError::Corrupted(entry.identifier.clone()))?;
        if crc::checksum(&data) != expected {
            return Err(ExtractError::Corrupted(entry.identifier.clone()));
        }
    }
    Ok(data)
}

/// Fetch and post-process every merged request, returning one
/// `(identifier, plaintext)` per sub-entry in the same relative order the
/// requests were given.
pub fn extract_all(source: &Source, requests: &[MergedRequest], opts: &ExtractOptions) -> anyhow::Result<Vec<(String, Result<Vec<u8>, ExtractError>)>> {
    let mut out = Vec::new();
    for req in requests {
        let raw = fetch_raw(source, req.position, req.length);
        match raw {
            Ok(raw) => {
                for (id, offset, entry) in &req.parts {
                    let slice = &raw[*offset as usize..(*offset + entry.length) as usize];
                    out.push((id.clone(), postprocess(slice, entry, opts)));
                }
            }
            Err(_) => {
                for (id, _, _) in &req.parts {
                    out.push((id.clone(), Err(ExtractError::Corrupted(id.clone()))));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_entries_are_coalesced() {
        let entries = vec![
            ("a".to_string(), IndexEntry { identifier: "a".into(), position: 0, length: 5, iv: None, checksum: None }),
            ("b".to_string(), IndexEntry { identifier: "b".into(), position: 5, length: 5, iv: None, checksum: None }),
            ("c".to_string(), IndexEntry { identifier: "c".into(), position: 20, length: 5, iv: None, checksum: None }),
        ];
        let reqs = batch_adjacent(entries);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].position, 0);
        assert_eq!(reqs[0].length, 10);
        assert_eq!(reqs[0].parts.len(), 2);
        assert_eq!(reqs[1].position, 20);
    }

    #[test]
    fn merged_and_isolated_plain_extraction_agree() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"helloworld!!!!!").unwrap();
        f.flush().unwrap();
        let entries = vec![
            ("a".to_string(), IndexEntry { identifier: "a".into(), position: 0, length: 5, iv: None, checksum: None }),
            ("b".to_string(), IndexEntry { identifier: "b".into(), position: 5, length: 5, iv: None, checksum: None }),
        ];
        let opts = ExtractOptions { flavor: Flavor::Plain, cipher: None, key: None, xsanity: false };

        let merged_reqs = batch_adjacent(entries.clone());
        let merged_source = Source::LocalPlain { path: f.path() };
        let merged_out = extract_all(&merged_source, &merged_reqs, &opts).unwrap();

        let isolated_reqs: Vec<MergedRequest> = entries
            .into_iter()
            .map(|(id, e)| MergedRequest { position: e.position, length: e.length, parts: vec![(id, 0, e)] })
            .collect();
        let isolated_source = Source::LocalPlain { path: f.path() };
        let isolated_out = extract_all(&isolated_source, &isolated_reqs, &opts).unwrap();

        let merged_bytes: Vec<_> = merged_out.into_iter().map(|(_, r)| r.unwrap()).collect();
        let isolated_bytes: Vec<_> = isolated_out.into_iter().map(|(_, r)| r.unwrap()).collect();
        assert_eq!(merged_bytes, isolated_bytes);
        assert_eq!(merged_bytes[0], b"hello");
        assert_eq!(merged_bytes[1], b"world");
    }
}
