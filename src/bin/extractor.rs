//! `extractor`: resolve identifiers against a positional index and write
//! the corresponding entries, optionally batching adjacent ranges and
//! fetching from a local, remote, or block-gzipped flatfile.

use clap::Parser;
use ffidx::blockmap::{BgzfIndex, BlockMap, GztoolIndex};
use ffidx::cache::CacheDir;
use ffidx::crypto::{self, CipherKind};
use ffidx::extractor::{self, batch_adjacent, ExtractOptions, LookupMode, Source};
use ffidx::index::Flavor;
use ffidx::preflight;
use ffidx::progress::{self, Counters};
use ffidx::sizefmt::ByteSize;
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Extract entries from a flatfile by identifier, using its positional
/// index.
#[derive(Parser, Debug)]
#[command(name = "extractor", version)]
struct Args {
    /// Flatfile path, or an http(s) URL for remote extraction.
    #[arg(short = 'f', long = "file")]
    file: String,

    /// Positional index for the flatfile.
    #[arg(short = 'i', long = "index")]
    index: PathBuf,

    /// A single identifier to extract; repeatable.
    #[arg(short = 's', long = "single")]
    single: Vec<String>,

    /// File with one identifier per line.
    #[arg(short = 'l', long = "list")]
    list: Option<PathBuf>,

    /// Write extracted entries here instead of stdout.
    #[arg(short = 'o', long = "outfile")]
    outfile: Option<PathBuf>,

    /// Coalesce index-adjacent ranges into single fetches.
    #[arg(short = 'm', long = "mergedretrieval")]
    mergedretrieval: bool,

    /// On duplicate identifiers, return every matching entry.
    #[arg(short = 'd', long)]
    duplicates: bool,

    /// On duplicate identifiers, return the one appearing last in the
    /// flatfile rather than the first.
    #[arg(short = 'z', long)]
    zfound: bool,

    /// Verify each entry's CRC32 checksum.
    #[arg(short = 'x', long)]
    xsanity: bool,

    /// Passphrase for AES-CFB decryption.
    #[arg(short = 'p', long)]
    passphrase: Option<String>,

    /// Treat the flatfile as gztool-compressed; `-g` names the gztool
    /// index.
    #[arg(short = 'c', long = "compressed_gzip")]
    compressed_gzip: bool,

    /// Treat the flatfile as BGZF-compressed; `.gzi` sidecar is
    /// `<file>.gzi`.
    #[arg(short = 'C', long = "Compressed_bgzip")]
    compressed_bgzip: bool,

    /// gztool index path (required with `-c`).
    #[arg(short = 'g', long = "gzindex")]
    gzindex: Option<PathBuf>,

    /// Fetch the flatfile over HTTP Range (implied when `-f` is a URL).
    #[arg(short = 'r', long)]
    remote: bool,

    /// Leave the remote block cache populated on exit instead of
    /// compacting and pruning it.
    #[arg(short = 'k', long)]
    keepcache: bool,

    /// Worker thread count.
    #[arg(short = 't', long, default_value_t = 1)]
    threads: usize,

    /// Identifier-list chunk size for parallel extraction.
    #[arg(short = 'b', long, default_value = "10m")]
    blocksize: ByteSize,

    #[arg(short = 'v', long)]
    verbose: bool,
}

fn lookup_mode(args: &Args) -> anyhow::Result<LookupMode> {
    if args.duplicates && args.zfound {
        anyhow::bail!(ffidx::error::ArgError::Contradictory(
            "cannot specify both -d/--duplicates and -z/--zfound".to_string()
        ));
    }
    Ok(if args.duplicates {
        LookupMode::Duplicates
    } else if args.zfound {
        LookupMode::Last
    } else {
        LookupMode::First
    })
}

fn collect_identifiers(args: &Args) -> anyhow::Result<Vec<String>> {
    let mut ids = args.single.clone();
    if let Some(path) = &args.list {
        let text = std::fs::read_to_string(path)?;
        ids.extend(text.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()));
    }
    if ids.is_empty() {
        anyhow::bail!(ffidx::error::ArgError::Contradictory(
            "at least one -s/--single identifier or -l/--list file is required".to_string()
        ));
    }
    Ok(ids)
}

/// Build the block-gzip mapping named by `-c`/`-C`, if either is set.
/// Cheap enough (a small sidecar read) to rebuild independently per worker.
fn build_blockmap(args: &Args) -> anyhow::Result<Option<Box<dyn BlockMap>>> {
    if args.compressed_bgzip {
        let gzi_path = PathBuf::from(format!("{}.gzi", args.file));
        Ok(Some(Box::new(BgzfIndex::read(&gzi_path)?)))
    } else if args.compressed_gzip {
        let gzindex = args.gzindex.clone().ok_or_else(|| {
            anyhow::anyhow!(ffidx::error::ArgError::Contradictory(
                "-c/--compressed_gzip requires -g/--gzindex".to_string()
            ))
        })?;
        let records = ffidx::blockmap::read_u64_pairs(std::io::BufReader::new(std::fs::File::open(&gzindex)?))?;
        Ok(Some(Box::new(GztoolIndex::from_records(records)?)))
    } else {
        Ok(None)
    }
}

fn cache_dir_for(args: &Args, is_remote: bool) -> anyhow::Result<Option<CacheDir>> {
    if is_remote && (args.compressed_bgzip || args.compressed_gzip) {
        let basename = args.file.rsplit('/').next().unwrap_or(&args.file);
        let dir = std::env::temp_dir().join("tmpEXTRACTcache").join(basename);
        Ok(Some(CacheDir::new(dir, if args.compressed_bgzip { "BGZ".to_string() } else { "GZ".to_string() })?))
    } else {
        Ok(None)
    }
}

/// Split `ids` into up to `chunks` roughly equal, order-preserving groups —
/// spec.md §4.10's "block mode" chunking, here sized off the thread count
/// rather than a byte count since identifiers arrive as an in-memory list.
fn chunk_identifiers(ids: &[String], chunks: usize) -> Vec<&[String]> {
    let chunks = chunks.max(1).min(ids.len().max(1));
    if ids.is_empty() {
        return Vec::new();
    }
    let per = (ids.len() + chunks - 1) / chunks;
    ids.chunks(per).collect()
}

struct ChunkOutput {
    bytes: Vec<u8>,
    not_found: Vec<String>,
    counters: Counters,
}

/// One worker's independent lookup + fetch + post-process pass over its
/// slice of identifiers, writing results to its own in-memory buffer in the
/// same relative order [`extractor::extract_all`] produces them.
fn process_chunk(
    args: &Args,
    ids: &[String],
    mode: LookupMode,
    flavor: Flavor,
    cipher: Option<CipherKind>,
    key: &Option<Vec<u8>>,
    is_remote: bool,
) -> anyhow::Result<ChunkOutput> {
    let owned_ids: Vec<String> = ids.to_vec();
    let requested = owned_ids.len() as u64;
    let (_, _, found, not_found) = extractor::resolve(&args.index, &owned_ids, mode)?;
    let found_count = found.len() as u64;

    let requests = if args.mergedretrieval {
        batch_adjacent(found)
    } else {
        found
            .into_iter()
            .map(|(id, e)| extractor::MergedRequest { position: e.position, length: e.length, parts: vec![(id, 0, e)] })
            .collect()
    };

    let opts = ExtractOptions { flavor, cipher, key: key.clone(), xsanity: args.xsanity };
    let blockmap = build_blockmap(args)?;
    let cache_dir = cache_dir_for(args, is_remote)?;

    let source = if is_remote {
        if let Some(bm) = &blockmap {
            Source::RemoteBgzf { url: &args.file, blockmap: bm.as_ref(), cache: cache_dir.as_ref() }
        } else {
            Source::RemotePlain { url: &args.file }
        }
    } else if let Some(bm) = &blockmap {
        Source::LocalBgzf { path: std::path::Path::new(&args.file), blockmap: bm.as_ref() }
    } else {
        Source::LocalPlain { path: std::path::Path::new(&args.file) }
    };
    let results = extractor::extract_all(&source, &requests, &opts)?;

    let mut bytes = Vec::new();
    let mut extracted = 0u64;
    let mut corrupted = 0u64;
    for (id, result) in results {
        match result {
            Ok(data) => {
                bytes.extend_from_slice(&data);
                extracted += 1;
            }
            Err(e) => {
                corrupted += 1;
                if args.verbose {
                    eprintln!("    => WARNING: '{id}' failed integrity check: {e}");
                }
            }
        }
    }
    let counters = Counters { requested, found: found_count, extracted, corrupted };
    Ok(ChunkOutput { bytes, not_found, counters })
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let started = Instant::now();
    let mode = lookup_mode(&args)?;
    let ids = collect_identifiers(&args)?;
    let is_remote = args.remote || args.file.contains("://");

    let mut reads = vec![args.index.as_path()];
    if !is_remote {
        reads.push(Path::new(&args.file));
    }
    if let Some(gzindex) = &args.gzindex {
        reads.push(gzindex.as_path());
    }
    if let Some(list) = &args.list {
        reads.push(list.as_path());
    }
    let writes: Vec<&Path> = args.outfile.as_deref().into_iter().collect();
    preflight::check_iofiles(&reads, &writes)?;

    let (flavor, cipher) = {
        let mut file = std::fs::File::open(&args.index)?;
        let mut buf = [0u8; 4096];
        use std::io::Read;
        let n = file.read(&mut buf)?;
        let first_line = String::from_utf8_lossy(&buf[..n]).lines().next().unwrap_or("").to_string();
        let class = ffidx::index::classify(&first_line)?;
        (class.flavor, class.cipher)
    };
    let key = match (&cipher, &args.passphrase) {
        (Some(kind), Some(pass)) => Some(crypto::derive_key(pass, *kind)?),
        (Some(_), None) => anyhow::bail!(ffidx::error::ArgError::Contradictory(
            "index is encrypted; -p/--passphrase is required".to_string()
        )),
        _ => None,
    };

    let chunks = chunk_identifiers(&ids, args.threads.max(1));
    let pool = rayon::ThreadPoolBuilder::new().num_threads(args.threads.max(1)).build()?;
    let chunk_results: Vec<anyhow::Result<ChunkOutput>> = pool.install(|| {
        chunks
            .par_iter()
            .map(|chunk| process_chunk(&args, chunk, mode, flavor, cipher, &key, is_remote))
            .collect()
    });
    let chunk_results: anyhow::Result<Vec<ChunkOutput>> = chunk_results.into_iter().collect();
    let chunk_results = chunk_results?;

    let mut out: Box<dyn Write> = match &args.outfile {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut not_found = Vec::new();
    let mut cells = Vec::with_capacity(chunk_results.len());
    for chunk in &chunk_results {
        out.write_all(&chunk.bytes)?;
        cells.push(chunk.counters);
        not_found.extend(chunk.not_found.iter().cloned());
    }
    out.flush()?;
    let totals = Counters::sum(&cells);

    if args.verbose {
        for id in &not_found {
            eprintln!("    => WARNING: '{id}' not found in index; skipping");
        }
    }

    if let Some(cache) = cache_dir_for(&args, is_remote)? {
        if !args.keepcache {
            // cache_dir_for only returns Some when -c/-C selected a
            // block-gzip flavor, so build_blockmap is guaranteed Some here.
            let blockmap = build_blockmap(&args)?.expect("cache dir implies a block map");
            cache.cleanup(blockmap.as_ref())?;
        }
    }

    if args.verbose {
        progress::summarize("extractor", totals, started);
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("extractor: {err:#}");
        std::process::exit(ffidx::exit_code(&err));
    }
}
