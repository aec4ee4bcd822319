//! C6: parallel driver that scans a flatfile shard by shard, applies
//! per-entry compression/encryption, and emits a merged positional index.
//!
//! Each shard (see [`crate::splitter`]) is scanned and post-processed
//! independently and in parallel. When neither compression nor encryption
//! is requested, index positions reference the *original* flatfile directly
//! and a shard's absolute offset is simply its own start offset; when either
//! transform is active, each shard instead produces its own output byte
//! buffer, and the final absolute position of a shard's entries is only
//! known once every preceding shard's output size is known — so shards
//! collect positions relative to their own output first, and a final
//! single-threaded stitching pass adds the right cumulative offset before
//! formatting and sorting the index.

use crate::crypto::{self, CipherKind};
use crate::deflate;
use crate::crc;
use crate::entry::EntryScanner;
use crate::index::{self, Flavor};
use crate::splitter;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub patterns: Vec<Regex>,
    pub joined_patterns: Vec<Regex>,
    pub terminator: Regex,
    pub allmatches: bool,
    pub keysize: Option<usize>,
    pub passphrase: Option<String>,
    pub compresslevel: Option<u32>,
    pub xsanity: bool,
    pub unsorted: bool,
    pub nopos: bool,
    pub offset: u64,
    pub threads: usize,
    pub blocksize: u64,
}

impl IndexerOptions {
    pub fn flavor(&self) -> Flavor {
        if self.nopos {
            return Flavor::NoPos;
        }
        match (self.compresslevel.is_some(), self.passphrase.is_some()) {
            (false, false) => Flavor::Plain,
            (true, false) => Flavor::Deflate,
            (false, true) => Flavor::Encrypt,
            (true, true) => Flavor::Both,
        }
    }

    fn cipher_kind(&self) -> Option<CipherKind> {
        if self.nopos || self.passphrase.is_none() {
            return None;
        }
        CipherKind::from_keysize(self.keysize.unwrap_or(32)).ok()
    }
}

#[derive(Debug, Default)]
pub struct IndexerStats {
    pub scanned: u64,
    pub skipped: u64,
}

pub struct IndexerOutput {
    pub lines: Vec<String>,
    pub flatfile: Option<(PathBuf, Vec<u8>)>,
    pub stats: IndexerStats,
}

struct Record {
    identifier: String,
    position: u64,
    length: u64,
    iv: Option<[u8; 16]>,
    checksum: Option<u32>,
}

struct ShardResult {
    records: Vec<Record>,
    output: Option<Vec<u8>>,
    local_size: u64,
    scanned: u64,
    skipped: u64,
}

fn extract_identifiers(text: &str, opts: &IndexerOptions) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut push = |id: String| {
        if !id.is_empty() && seen.insert(id.clone()) {
            out.push(id);
        }
    };

    for re in &opts.patterns {
        if opts.allmatches {
            for caps in re.captures_iter(text) {
                if caps.len() > 1 {
                    for i in 1..caps.len() {
                        if let Some(m) = caps.get(i) {
                            push(m.as_str().to_string());
                        }
                    }
                } else if let Some(m) = caps.get(0) {
                    push(m.as_str().to_string());
                }
            }
        } else if let Some(caps) = re.captures(text) {
            let id = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str().to_string());
            if let Some(id) = id {
                push(id);
            }
        }
    }

    for re in &opts.joined_patterns {
        let mut emit_joined = |caps: regex::Captures| {
            let joined: String = (1..caps.len())
                .filter_map(|i| caps.get(i))
                .map(|m| m.as_str())
                .collect();
            push(joined);
        };
        if opts.allmatches {
            for caps in re.captures_iter(text) {
                emit_joined(caps);
            }
        } else if let Some(caps) = re.captures(text) {
            emit_joined(caps);
        }
    }

    out
}

fn process_shard(path: &Path, shard: splitter::Shard, opts: &IndexerOptions, key: &Option<Vec<u8>>) -> std::io::Result<ShardResult> {
    let (start, size) = shard;
    let bytes = {
        use std::io::{Read, Seek, SeekFrom};
        let mut f = fs::File::open(path)?;
        f.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; size as usize];
        f.read_exact(&mut buf)?;
        buf
    };

    let flavor = opts.flavor();
    let transforming = flavor.is_compressed() || flavor.is_encrypted();
    let cipher = opts.cipher_kind();

    let scanner = EntryScanner::new(Cursor::new(&bytes[..]), opts.terminator.clone());
    let mut records = Vec::new();
    let mut output = if transforming { Some(Vec::new()) } else { None };
    let mut local_pos = 0u64;
    let mut scanned = 0u64;
    let mut skipped = 0u64;

    for entry in scanner {
        let entry = entry?;
        scanned += 1;
        let text = String::from_utf8_lossy(&entry.bytes);
        let ids = extract_identifiers(&text, opts);

        if ids.is_empty() {
            skipped += 1;
            if !transforming {
                local_pos += entry.length();
            }
            continue;
        }

        let position = local_pos;
        let checksum = opts.xsanity.then(|| crc::checksum(&entry.bytes));

        let mut content = entry.bytes.clone();
        if flavor.is_compressed() {
            content = deflate::deflate(&content, opts.compresslevel.unwrap_or(9)).expect("in-memory deflate cannot fail");
        }
        let iv = if flavor.is_encrypted() {
            let iv = crypto::generate_iv();
            let kind = cipher.expect("encrypted flavor always has a cipher kind");
            let key = key.as_ref().expect("encrypted flavor always has a derived key");
            content = crypto::encrypt(kind, key, &iv, &content).expect("key length already validated");
            Some(iv)
        } else {
            None
        };

        let out_len = if transforming { content.len() as u64 } else { entry.length() };
        if let Some(buf) = output.as_mut() {
            buf.extend_from_slice(&content);
        }
        local_pos += out_len;

        for identifier in ids {
            records.push(Record {
                identifier,
                position,
                length: out_len,
                iv,
                checksum,
            });
        }
    }

    let local_size = output.as_ref().map(|o| o.len() as u64).unwrap_or(size);
    Ok(ShardResult {
        records,
        output,
        local_size,
        scanned,
        skipped,
    })
}

/// Run the indexer over `input` per `opts`, returning the merged/sorted
/// index lines, the optional transformed flatfile (path, bytes) and run
/// stats. Writing the outputs to disk/stdout is the caller's job (the
/// `indexer` binary).
pub fn run(input: &Path, opts: &IndexerOptions) -> anyhow::Result<IndexerOutput> {
    let shards = splitter::compute_splits(input, opts.blocksize, &opts.terminator)?;
    let flavor = opts.flavor();

    let key = if flavor.is_encrypted() {
        let kind = opts.cipher_kind().ok_or_else(|| anyhow::anyhow!("encrypted flavor requires a keysize"))?;
        let passphrase = opts
            .passphrase
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("encrypted flavor requires a passphrase"))?;
        Some(crypto::derive_key(passphrase, kind)?)
    } else {
        None
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads.max(1))
        .build()?;
    let results: Vec<std::io::Result<ShardResult>> = pool.install(|| {
        shards
            .par_iter()
            .map(|&shard| process_shard(input, shard, opts, &key))
            .collect()
    });
    let results: Result<Vec<_>, _> = results.into_iter().collect();
    let results = results?;

    let transforming = flavor.is_compressed() || flavor.is_encrypted();
    let cipher = opts.cipher_kind();

    let mut lines = Vec::new();
    let mut stats = IndexerStats::default();
    let mut cumulative = opts.offset;
    let mut flatfile_bytes = transforming.then(Vec::new);

    for (i, result) in results.into_iter().enumerate() {
        stats.scanned += result.scanned;
        stats.skipped += result.skipped;

        let shard_offset = if transforming { cumulative } else { opts.offset + shards[i].0 };
        for record in &result.records {
            let absolute = shard_offset + record.position;
            lines.push(index::format_line(
                &record.identifier,
                flavor,
                absolute,
                record.length,
                cipher,
                record.iv.as_ref(),
                record.checksum,
            ));
        }
        if transforming {
            if let Some(out) = &result.output {
                flatfile_bytes.as_mut().unwrap().extend_from_slice(out);
            }
            cumulative += result.local_size;
        }
    }

    if !opts.unsorted {
        lines.sort();
    }

    let flatfile = flatfile_bytes.map(|bytes| {
        let suffix = if flavor.is_encrypted() { "enc" } else { "xz" };
        (input.with_extension(suffix), bytes)
    });

    Ok(IndexerOutput { lines, flatfile, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn base_opts(patterns: Vec<Regex>) -> IndexerOptions {
        IndexerOptions {
            patterns,
            joined_patterns: vec![],
            terminator: Regex::new(r"^-$").unwrap(),
            allmatches: false,
            keysize: None,
            passphrase: None,
            compresslevel: None,
            xsanity: false,
            unsorted: false,
            nopos: false,
            offset: 0,
            threads: 2,
            blocksize: 1024,
        }
    }

    #[test]
    fn plain_index_positions_match_original_file() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "AC   001;\nsome data\n-\nAC   002;\nmore data\n-\n").unwrap();
        f.flush().unwrap();
        let opts = base_opts(vec![Regex::new(r"^AC   (.+?);").unwrap()]);
        let out = run(f.path(), &opts).unwrap();
        assert_eq!(out.stats.scanned, 2);
        assert_eq!(out.stats.skipped, 0);
        assert!(out.flatfile.is_none());
        assert_eq!(out.lines.len(), 2);

        let content = std::fs::read(f.path()).unwrap();
        for line in &out.lines {
            let class = index::classify(line).unwrap();
            let entry = index::parse_line(line, class.flavor).unwrap();
            let slice = &content[entry.position as usize..(entry.position + entry.length) as usize];
            assert!(String::from_utf8_lossy(slice).starts_with("AC   "));
        }
    }

    #[test]
    fn entries_without_identifiers_are_skipped() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "no id here\n-\nAC   001;\nmatches\n-\n").unwrap();
        f.flush().unwrap();
        let opts = base_opts(vec![Regex::new(r"^AC   (.+?);").unwrap()]);
        let out = run(f.path(), &opts).unwrap();
        assert_eq!(out.stats.scanned, 2);
        assert_eq!(out.stats.skipped, 1);
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn encrypted_and_compressed_roundtrip_via_extractor_primitives() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "AC   001;\npayload one\n-\nAC   002;\npayload two\n-\n").unwrap();
        f.flush().unwrap();
        let mut opts = base_opts(vec![Regex::new(r"^AC   (.+?);").unwrap()]);
        opts.compresslevel = Some(6);
        opts.passphrase = Some("hunter2".to_string());
        opts.keysize = Some(16);
        opts.xsanity = true;
        let out = run(f.path(), &opts).unwrap();
        let (_, flatfile_bytes) = out.flatfile.as_ref().unwrap();

        for line in &out.lines {
            let class = index::classify(line).unwrap();
            assert_eq!(class.flavor, Flavor::Both);
            let e = index::parse_line(line, class.flavor).unwrap();
            let kind = class.cipher.unwrap();
            let key = crypto::derive_key("hunter2", kind).unwrap();
            let ciphertext = &flatfile_bytes[e.position as usize..(e.position + e.length) as usize];
            let compressed = crypto::decrypt(kind, &key, &e.iv.unwrap(), ciphertext).unwrap();
            let plaintext = deflate::inflate(&compressed).unwrap();
            assert_eq!(crc::checksum(&plaintext), e.checksum.unwrap());
            assert!(String::from_utf8_lossy(&plaintext).starts_with("AC   "));
        }
    }

    #[test]
    fn joined_pattern_concatenates_groups() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "AC   X;Y;\nbody\n-\n").unwrap();
        f.flush().unwrap();
        let mut opts = base_opts(vec![]);
        opts.joined_patterns = vec![Regex::new(r"^AC   (.+?);(.+?);").unwrap()];
        let out = run(f.path(), &opts).unwrap();
        assert_eq!(out.lines.len(), 1);
        let entry = index::parse_line(&out.lines[0], Flavor::Plain).unwrap();
        assert_eq!(entry.identifier, "XY");
    }

    #[test]
    fn unsorted_mode_preserves_shard_order_without_merging() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "AC   999;\nfirst\n-\nAC   111;\nsecond\n-\n").unwrap();
        f.flush().unwrap();
        let mut opts = base_opts(vec![Regex::new(r"^AC   (.+?);").unwrap()]);
        opts.unsorted = true;
        opts.threads = 1;
        let out = run(f.path(), &opts).unwrap();
        assert!(out.lines[0].starts_with("999\t"));
        assert!(out.lines[1].starts_with("111\t"));
    }
}
