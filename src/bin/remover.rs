//! `remover`: delete the entries named in a list from a flatfile and
//! rewrite its positional index with surviving offsets shifted by the
//! cumulative size of whatever was removed ahead of them.

use clap::Parser;
use ffidx::deleter::{self, DeletePlan};
use ffidx::extractor::LookupMode;
use ffidx::index;
use ffidx::preflight;
use ffidx::sizefmt::ByteSize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Remove identified entries from a flatfile using its positional index.
#[derive(Parser, Debug)]
#[command(name = "remover", version)]
struct Args {
    /// Flatfile to delete entries from.
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Index of the flatfile.
    #[arg(short = 'i', long = "index")]
    index: PathBuf,

    /// File listing one identifier per line to delete.
    #[arg(short = 'l', long = "list")]
    list: PathBuf,

    /// Write outputs to this directory instead of `<file>.new`/`<index>.new`.
    #[arg(short = 'o', long = "outpath")]
    outpath: Option<PathBuf>,

    /// Delete every entry matching a duplicated identifier.
    #[arg(short = 'd', long)]
    duplicates: bool,

    /// On duplicate identifiers, delete the one appearing last in the
    /// flatfile rather than the first.
    #[arg(short = 'z', long)]
    zfound: bool,

    /// Worker thread count for reindexing.
    #[arg(short = 't', long, default_value_t = 1)]
    threads: usize,

    /// Index shard size for parallel reindexing.
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

fn output_path(outpath: &Option<PathBuf>, base: &Path) -> PathBuf {
    let name = format!("{}.new", base.file_name().unwrap().to_string_lossy());
    match outpath {
        Some(dir) => dir.join(name),
        None => base.with_file_name(name),
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let started = Instant::now();
    let mode = lookup_mode(&args)?;

    let out_ff = output_path(&args.outpath, &args.file);
    let out_index = output_path(&args.outpath, &args.index);
    preflight::check_iofiles(
        &[args.file.as_path(), args.index.as_path(), args.list.as_path()],
        &[out_ff.as_path(), out_index.as_path()],
    )?;

    let list_text = std::fs::read_to_string(&args.list)?;
    let identifiers: Vec<String> = list_text.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
    let requested = identifiers.len();

    let plan: DeletePlan = deleter::plan_deletion(&args.index, &identifiers, mode)?;
    let found = plan.position2size.len();
    if args.verbose {
        for id in &plan.not_found {
            eprintln!("    => WARNING: '{id}' not found in index; skipping");
        }
    }

    let new_size = deleter::rewrite_flatfile(&args.file, &out_ff, &plan)?;

    let first_line = {
        let reader = std::io::BufReader::new(std::fs::File::open(&args.index)?);
        reader.lines().next().transpose()?.unwrap_or_default()
    };
    let class = index::classify(&first_line)?;

    let stats = if args.threads > 1 {
        deleter::reindex_parallel(&args.index, &out_index, &plan, class.flavor, class.cipher, args.blocksize.0, args.threads)?
    } else {
        deleter::reindex(&args.index, &out_index, &plan, class.flavor, class.cipher)?
    };

    if args.verbose {
        eprintln!(
            " |-- found and removed {found} of {requested} requested identifiers"
        );
        eprintln!(
            " '-- new flatfile size={new_size} indexed={} shifted={} skipped={} elapsed={:.2}s",
            stats.total,
            stats.shifted,
            stats.skipped,
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("remover: {err:#}");
        std::process::exit(ffidx::exit_code(&err));
    }
}
