use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ffidx::index::{self, Flavor};
use ffidx::search::{self, Mode};
use std::io::Write;
use tempfile::NamedTempFile;

fn build_sorted_index(n: usize) -> NamedTempFile {
    let mut lines: Vec<String> = (0..n)
        .map(|i| index::format_line(&format!("AC{i:08}"), Flavor::Plain, i as u64 * 100, 100, None, None, None))
        .collect();
    lines.sort();
    let mut f = NamedTempFile::new().unwrap();
    for line in &lines {
        f.write_all(line.as_bytes()).unwrap();
    }
    f.flush().unwrap();
    f
}

fn bench_sorted_search(c: &mut Criterion) {
    let f = build_sorted_index(100_000);
    c.bench_function("sorted_search_first_100k_lines", |b| {
        b.iter(|| {
            let mut file = f.reopen().unwrap();
            let key = format!("AC{:08}\t", black_box(42_000));
            search::search(&mut file, &key, Mode::First).unwrap()
        })
    });
}

fn bench_indexer_parallel(c: &mut Criterion) {
    use ffidx::indexer::{self, IndexerOptions};
    use regex::Regex;

    let mut flatfile = NamedTempFile::new().unwrap();
    for i in 0..5_000 {
        writeln!(flatfile, "AC   {i:08};").unwrap();
        writeln!(flatfile, "some payload text for entry {i}").unwrap();
        writeln!(flatfile, "-").unwrap();
    }
    flatfile.flush().unwrap();

    let opts = IndexerOptions {
        patterns: vec![Regex::new(r"^AC   (.+?);").unwrap()],
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
        threads: 4,
        blocksize: 64 * 1024,
    };

    c.bench_function("indexer_parallel_5k_entries", |b| {
        b.iter(|| indexer::run(black_box(flatfile.path()), black_box(&opts)).unwrap())
    });
}

criterion_group!(benches, bench_sorted_search, bench_indexer_parallel);
criterion_main!(benches);
