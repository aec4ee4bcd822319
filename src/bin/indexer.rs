//! `indexer`: split a flatfile into shards, extract identifiers per entry,
//! optionally compress/encrypt each entry, and emit a sorted positional
//! index to stdout.

use clap::Parser;
use ffidx::indexer::{self, IndexerOptions};
use ffidx::preflight;
use ffidx::sizefmt::ByteSize;
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

/// Build a sorted positional index for a flatfile of terminator-delimited
/// entries.
#[derive(Parser, Debug)]
#[command(name = "indexer", version)]
struct Args {
    /// Flatfile to index.
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Identifier-extracting regex; repeatable. Each non-empty capture
    /// group (or the whole match, with none) is its own identifier.
    #[arg(short = 'i', long = "id")]
    id: Vec<String>,

    /// Identifier regex whose capture groups are concatenated into a
    /// single identifier; repeatable.
    #[arg(short = 'j', long = "joinedid")]
    joinedid: Vec<String>,

    /// Entry terminator regex.
    #[arg(short = 'e', long = "endpattern", default_value = "^-$")]
    endpattern: String,

    /// Collect every regex match per entry instead of just the first.
    #[arg(short = 'a', long)]
    allmatches: bool,

    /// Passphrase enabling AES-CFB per-entry encryption.
    #[arg(short = 'p', long)]
    passphrase: Option<String>,

    /// AES key size in bytes: 16, 24 or 32. Requires `-p`.
    #[arg(short = 'k', long)]
    keysize: Option<usize>,

    /// DEFLATE level 0-9 enabling per-entry compression.
    #[arg(short = 'c', long)]
    compresslevel: Option<u32>,

    /// Record a CRC32 checksum of each entry's plaintext.
    #[arg(short = 'x', long)]
    xsanity: bool,

    /// Stream index lines in shard order instead of merge-sorting them.
    #[arg(short = 'u', long)]
    unsorted: bool,

    /// Emit identifier-only lines with no position field.
    #[arg(short = 'n', long)]
    nopos: bool,

    /// Added to every emitted position.
    #[arg(short = 'o', long, default_value = "0")]
    offset: ByteSize,

    /// Worker thread count.
    #[arg(short = 't', long, default_value_t = 1)]
    threads: usize,

    /// Shard size target for parallel indexing.
    #[arg(short = 'b', long, default_value = "10m")]
    blocksize: ByteSize,

    /// Print a final summary to stderr.
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn compile(patterns: &[String]) -> anyhow::Result<Vec<Regex>> {
    patterns.iter().map(|p| Ok(Regex::new(p)?)).collect()
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let started = Instant::now();

    if args.id.is_empty() && args.joinedid.is_empty() && !args.nopos {
        anyhow::bail!(ffidx::error::ArgError::Contradictory(
            "at least one -i/--id or -j/--joinedid pattern is required".to_string()
        ));
    }
    if args.compresslevel.is_some() && args.compresslevel.unwrap() > 9 {
        anyhow::bail!(ffidx::error::ArgError::Contradictory("-c/--compresslevel must be 0-9".to_string()));
    }

    let opts = IndexerOptions {
        patterns: compile(&args.id)?,
        joined_patterns: compile(&args.joinedid)?,
        terminator: Regex::new(&args.endpattern)?,
        allmatches: args.allmatches,
        keysize: args.keysize,
        passphrase: args.passphrase,
        compresslevel: args.compresslevel,
        xsanity: args.xsanity,
        unsorted: args.unsorted,
        nopos: args.nopos,
        offset: args.offset.0,
        threads: args.threads,
        blocksize: args.blocksize.0,
    };

    let flavor = opts.flavor();
    let writes: Vec<PathBuf> = if flavor.is_compressed() || flavor.is_encrypted() {
        let suffix = if flavor.is_encrypted() { "enc" } else { "xz" };
        vec![args.file.with_extension(suffix)]
    } else {
        Vec::new()
    };
    preflight::check_iofiles(&[&args.file], &writes.iter().map(|p| p.as_path()).collect::<Vec<_>>())?;

    let out = indexer::run(&args.file, &opts)?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for line in &out.lines {
        handle.write_all(line.as_bytes())?;
    }

    if let Some((path, bytes)) = &out.flatfile {
        std::fs::write(path, bytes)?;
        if args.verbose {
            eprintln!(" |-- wrote transformed flatfile to {}", path.display());
        }
    }

    if args.verbose {
        eprintln!(
            " '-- scanned={} skipped={} indexed={} elapsed={:.2}s",
            out.stats.scanned,
            out.stats.skipped,
            out.lines.len(),
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("indexer: {err:#}");
        std::process::exit(ffidx::exit_code(&err));
    }
}
