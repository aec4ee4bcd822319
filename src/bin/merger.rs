//! `merger`: append a pre-indexed delta flatfile onto a base flatfile and
//! merge-sort their positional indexes, shifting the delta by the base
//! flatfile's size.

use clap::Parser;
use ffidx::merger;
use ffidx::preflight;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Merge a delta flatfile/index pair onto a base flatfile/index pair.
#[derive(Parser, Debug)]
#[command(name = "merger", version)]
struct Args {
    /// Base flatfile.
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Base flatfile's index.
    #[arg(short = 'i', long = "index")]
    index: PathBuf,

    /// Delta flatfile to append.
    #[arg(short = 'e', long = "entries")]
    entries: PathBuf,

    /// Delta flatfile's index.
    #[arg(short = 'n', long = "newindex")]
    newindex: PathBuf,

    /// Write outputs to this directory instead of alongside the base
    /// files.
    #[arg(short = 'o', long = "outpath")]
    outpath: Option<PathBuf>,

    /// Remove the delta flatfile/index after a successful merge.
    #[arg(short = 'd', long)]
    delete: bool,

    /// Force an in-memory delta shift instead of spilling to a temp file.
    #[arg(short = 's', long)]
    small: bool,

    #[arg(short = 'v', long)]
    verbose: bool,
}

fn output_path(outpath: &Option<PathBuf>, base: &Path, suffix: &str) -> PathBuf {
    let name = format!("{}{suffix}", base.file_name().unwrap().to_string_lossy());
    match outpath {
        Some(dir) => dir.join(name),
        None => base.with_file_name(name),
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let started = Instant::now();

    let new_ff = output_path(&args.outpath, &args.file, ".merged");
    let new_index = output_path(&args.outpath, &args.index, ".merged");

    preflight::check_iofiles(
        &[args.file.as_path(), args.index.as_path(), args.entries.as_path(), args.newindex.as_path()],
        &[new_ff.as_path(), new_index.as_path()],
    )?;

    let result = merger::merge(
        &args.file,
        &args.index,
        &args.entries,
        &args.newindex,
        &new_ff,
        &new_index,
        args.small,
    )?;

    if args.delete {
        std::fs::remove_file(&args.entries)?;
        std::fs::remove_file(&args.newindex)?;
    }

    if args.verbose {
        eprintln!(
            " '-- merged flatfile size={} wrote {} and {} elapsed={:.2}s",
            result.new_flatfile_size,
            new_ff.display(),
            new_index.display(),
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("merger: {err:#}");
        std::process::exit(ffidx::exit_code(&err));
    }
}
