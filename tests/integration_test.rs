use ffidx::crypto::CipherKind;
use ffidx::deleter::{self, DeletePlan};
use ffidx::extractor::{self, ExtractOptions, LookupMode, MergedRequest, Source};
use ffidx::index::{self, Flavor};
use ffidx::indexer::{self, IndexerOptions};
use ffidx::merger;
use regex::Regex;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_entries(entries: &[(&str, &str)]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    for (id, body) in entries {
        writeln!(f, "AC   {id};").unwrap();
        writeln!(f, "{body}").unwrap();
        writeln!(f, "//").unwrap();
    }
    f.flush().unwrap();
    f
}

fn base_opts() -> IndexerOptions {
    IndexerOptions {
        patterns: vec![Regex::new(r"^AC   (.+?);").unwrap()],
        joined_patterns: vec![],
        terminator: Regex::new(r"^//$").unwrap(),
        allmatches: false,
        keysize: None,
        passphrase: None,
        compresslevel: None,
        xsanity: false,
        unsorted: false,
        nopos: false,
        offset: 0,
        threads: 1,
        blocksize: 1 << 20,
    }
}

fn extract_one(flatfile_path: &std::path::Path, index_path: &std::path::Path, id: &str, opts: &ExtractOptions) -> Vec<u8> {
    let (_, _, found, not_found) = extractor::resolve(index_path, &[id.to_string()], LookupMode::First).unwrap();
    assert!(not_found.is_empty(), "{id} unexpectedly not found");
    let (id, entry) = found.into_iter().next().unwrap();
    let req = MergedRequest { position: entry.position, length: entry.length, parts: vec![(id, 0, entry)] };
    let source = Source::LocalPlain { path: flatfile_path };
    let mut out = extractor::extract_all(&source, &[req], opts).unwrap();
    out.remove(0).1.unwrap()
}

/// Scenario 1: plain roundtrip over 8 entries, extracted one at a time.
#[test]
fn plain_roundtrip_reconstructs_each_entry() {
    let entries: Vec<(&str, &str)> = (0..8).map(|i| (Box::leak(format!("{i:03}").into_boxed_str()) as &str, "some payload data")).collect();
    let f = write_entries(&entries);
    let opts = base_opts();
    let out = indexer::run(f.path(), &opts).unwrap();
    assert_eq!(out.stats.scanned, 8);
    assert!(out.flatfile.is_none());

    let mut idx = NamedTempFile::new().unwrap();
    for line in &out.lines {
        idx.write_all(line.as_bytes()).unwrap();
    }
    idx.flush().unwrap();

    let extract_opts = ExtractOptions { flavor: Flavor::Plain, cipher: None, key: None, xsanity: false };
    for (id, _) in &entries {
        let bytes = extract_one(f.path(), idx.path(), id, &extract_opts);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(&format!("AC   {id};")));
        assert!(text.contains("some payload data"));
    }
}

/// Scenario 2: encrypted + compressed with xsanity; no corrupted entries on
/// a clean roundtrip.
#[test]
fn encrypted_and_compressed_roundtrip_has_no_corruption() {
    let entries = vec![("e01", "first secret payload"), ("e02", "second secret payload, a bit longer this time")];
    let f = write_entries(&entries);
    let mut opts = base_opts();
    opts.compresslevel = Some(6);
    opts.passphrase = Some("correct horse battery staple".to_string());
    opts.keysize = Some(24);
    opts.xsanity = true;

    let out = indexer::run(f.path(), &opts).unwrap();
    let (flatfile_path, flatfile_bytes) = out.flatfile.as_ref().unwrap();
    std::fs::write(flatfile_path, flatfile_bytes).unwrap();
    assert_ne!(&flatfile_bytes[..], std::fs::read(f.path()).unwrap().as_slice());

    let mut idx = NamedTempFile::new().unwrap();
    for line in &out.lines {
        idx.write_all(line.as_bytes()).unwrap();
    }
    idx.flush().unwrap();

    let cipher = CipherKind::from_keysize(24).unwrap();
    let key = ffidx::crypto::derive_key("correct horse battery staple", cipher).unwrap();
    let extract_opts = ExtractOptions { flavor: Flavor::Both, cipher: Some(cipher), key: Some(key), xsanity: true };

    let mut corrupted = 0;
    for (id, body) in &entries {
        let (_, _, found, not_found) = extractor::resolve(idx.path(), &[id.to_string()], LookupMode::First).unwrap();
        assert!(not_found.is_empty());
        let (id_owned, entry) = found.into_iter().next().unwrap();
        let req = MergedRequest { position: entry.position, length: entry.length, parts: vec![(id_owned, 0, entry)] };
        let source = Source::LocalPlain { path: flatfile_path };
        let results = extractor::extract_all(&source, &[req], &extract_opts).unwrap();
        match &results[0].1 {
            Ok(bytes) => assert!(String::from_utf8_lossy(bytes).contains(body)),
            Err(_) => corrupted += 1,
        }
    }
    assert_eq!(corrupted, 0);
}

/// Scenario 3: duplicate identifiers — first/last/duplicates policies.
#[test]
fn duplicate_identifiers_resolve_per_policy() {
    let entries = vec![("dup", "entry A"), ("other", "filler"), ("dup", "entry B")];
    let f = write_entries(&entries);
    let opts = base_opts();
    let out = indexer::run(f.path(), &opts).unwrap();

    let mut idx = NamedTempFile::new().unwrap();
    for line in &out.lines {
        idx.write_all(line.as_bytes()).unwrap();
    }
    idx.flush().unwrap();

    let (_, _, first, _) = extractor::resolve(idx.path(), &["dup".to_string()], LookupMode::First).unwrap();
    let (_, _, last, _) = extractor::resolve(idx.path(), &["dup".to_string()], LookupMode::Last).unwrap();
    let (_, _, all, _) = extractor::resolve(idx.path(), &["dup".to_string()], LookupMode::Duplicates).unwrap();

    assert_eq!(all.len(), 2);
    assert_eq!(first[0].1.position, all[0].1.position);
    assert_eq!(last[0].1.position, all[1].1.position);
    assert_ne!(first[0].1.position, last[0].1.position);
}

/// Scenario 4: parallel indexing matches single-threaded indexing
/// byte-for-byte.
#[test]
fn parallel_merge_sort_matches_single_threaded() {
    let entries: Vec<(&str, &str)> = (0..8)
        .map(|i| (Box::leak(format!("{i:03}").into_boxed_str()) as &str, "payload of a representative size for splitting"))
        .collect();
    let f = write_entries(&entries);

    let mut single = base_opts();
    single.threads = 1;
    let mut parallel = base_opts();
    parallel.threads = 4;
    parallel.blocksize = 100;

    let single_out = indexer::run(f.path(), &single).unwrap();
    let parallel_out = indexer::run(f.path(), &parallel).unwrap();
    assert_eq!(single_out.lines, parallel_out.lines);
}

/// Scenario 5: delete three entries then reindex; size conservation and
/// surviving-entry correctness.
#[test]
fn delete_then_reindex_preserves_survivors() {
    let entries: Vec<(&str, &str)> = (0..6)
        .map(|i| (Box::leak(format!("{i:03}").into_boxed_str()) as &str, "fixed payload text"))
        .collect();
    let f = write_entries(&entries);
    let opts = base_opts();
    let out = indexer::run(f.path(), &opts).unwrap();

    let mut idx = NamedTempFile::new().unwrap();
    for line in &out.lines {
        idx.write_all(line.as_bytes()).unwrap();
    }
    idx.flush().unwrap();

    let to_remove: Vec<String> = vec!["000".to_string(), "002".to_string(), "004".to_string()];
    let plan: DeletePlan = deleter::plan_deletion(idx.path(), &to_remove, LookupMode::First).unwrap();
    assert_eq!(plan.position2size.len(), 3);

    let new_ff = NamedTempFile::new().unwrap();
    let old_size = f.path().metadata().unwrap().len();
    let removed_total: u64 = plan.position2size.values().sum();
    let new_size = deleter::rewrite_flatfile(f.path(), new_ff.path(), &plan).unwrap();
    assert_eq!(new_size, old_size - removed_total);

    let new_idx = NamedTempFile::new().unwrap();
    let class = index::classify(&out.lines[0]).unwrap();
    deleter::reindex(idx.path(), new_idx.path(), &plan, class.flavor, class.cipher).unwrap();

    let extract_opts = ExtractOptions { flavor: Flavor::Plain, cipher: None, key: None, xsanity: false };
    for (id, _) in entries.iter().filter(|(id, _)| !to_remove.contains(&id.to_string())) {
        let bytes = extract_one(new_ff.path(), new_idx.path(), id, &extract_opts);
        assert!(String::from_utf8_lossy(&bytes).starts_with(&format!("AC   {id};")));
    }

    for id in &to_remove {
        let (_, _, _, not_found) = extractor::resolve(new_idx.path(), std::slice::from_ref(id), LookupMode::First).unwrap();
        assert_eq!(not_found, vec![id.clone()]);
    }
}

/// Merger additivity: merged flatfile size is the sum of its parts, and
/// every delta identifier resolves at a position shifted by the base size.
#[test]
fn merge_is_additive_and_delta_positions_shift() {
    let base_entries = vec![("b01", "base payload one"), ("b02", "base payload two")];
    let delta_entries = vec![("d01", "delta payload one")];

    let base_f = write_entries(&base_entries);
    let delta_f = write_entries(&delta_entries);
    let opts = base_opts();
    let base_out = indexer::run(base_f.path(), &opts).unwrap();
    let delta_out = indexer::run(delta_f.path(), &opts).unwrap();

    let mut base_idx = NamedTempFile::new().unwrap();
    for line in &base_out.lines {
        base_idx.write_all(line.as_bytes()).unwrap();
    }
    base_idx.flush().unwrap();
    let mut delta_idx = NamedTempFile::new().unwrap();
    for line in &delta_out.lines {
        delta_idx.write_all(line.as_bytes()).unwrap();
    }
    delta_idx.flush().unwrap();

    let new_ff = NamedTempFile::new().unwrap();
    let new_idx = NamedTempFile::new().unwrap();
    let base_size = base_f.path().metadata().unwrap().len();
    let delta_size = delta_f.path().metadata().unwrap().len();

    let result = merger::merge(base_f.path(), base_idx.path(), delta_f.path(), delta_idx.path(), new_ff.path(), new_idx.path(), true).unwrap();
    assert_eq!(result.new_flatfile_size, base_size + delta_size);
    assert_eq!(new_ff.path().metadata().unwrap().len(), base_size + delta_size);

    let extract_opts = ExtractOptions { flavor: Flavor::Plain, cipher: None, key: None, xsanity: false };
    let bytes = extract_one(new_ff.path(), new_idx.path(), "d01", &extract_opts);
    assert!(String::from_utf8_lossy(&bytes).starts_with("AC   d01;"));
}
