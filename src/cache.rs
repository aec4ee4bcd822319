//! C9: disk cache of compressed block spans for remote block-gzipped
//! flatfiles.
//!
//! A span is a file named `PREFIX.<start>-<end>` holding the verbatim
//! compressed byte run covering inclusive block ids `start..=end`. Two
//! sidecars make concurrent access cooperative rather than enforced: a
//! reader creates `<name>l` before using a span, and a writer that would
//! otherwise delete a locked span instead drops `<name>_`; [`cleanup`]
//! reconciles both at the end of a run. Candidates are ranked by
//! [`distance`] — negative means overlap, zero means touching, and ties
//! are broken in the iteration order produced by sorting ascending, which
//! favors full containment over partial overlap because a containing span
//! always has `distance <= 0` against an overlapping span's `distance`.

use crate::blockmap::BlockMap;
use crate::error::CacheError;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Signed distance between inclusive block ranges `[start, end]` and
/// `[a, b]`: `max(start, a) - min(end, b)`. Negative values overlap, zero
/// means adjacent-touching, positive means a gap remains.
pub fn distance(start: u64, end: u64, a: u64, b: u64) -> i64 {
    start.max(a) as i64 - end.min(b) as i64
}

#[derive(Debug, Clone)]
pub struct Span {
    pub start: u64,
    pub end: u64,
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum Resolution {
    /// `path` already covers `[start, end]`; no fetch needed.
    Served(PathBuf),
    /// `span` covers the head; fetch blocks `span.end+1..=end` and append.
    TailExtend { span: Span, missing_from: u64 },
    /// `span` covers the tail; fetch blocks `start..=span.start-1` and prepend.
    HeadExtend { span: Span, missing_to: u64 },
    Fresh,
}

pub struct CacheDir {
    dir: PathBuf,
    prefix: String,
}

impl CacheDir {
    pub fn new(dir: PathBuf, prefix: String) -> std::io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, prefix })
    }

    fn span_pattern(&self) -> Regex {
        Regex::new(&format!(r"^{}\.(\d+)-(\d+)$", regex::escape(&self.prefix))).unwrap()
    }

    fn span_path(&self, start: u64, end: u64) -> PathBuf {
        self.dir.join(format!("{}.{start}-{end}", self.prefix))
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push("l");
        PathBuf::from(s)
    }

    fn delete_marker_path(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push("_");
        PathBuf::from(s)
    }

    /// All live spans (excluding lock/delete-marker sidecars, which never
    /// match the `prefix.<digits>-<digits>` pattern because of their
    /// trailing letter).
    pub fn list_spans(&self) -> std::io::Result<Vec<Span>> {
        let pattern = self.span_pattern();
        let mut spans = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(caps) = pattern.captures(&name) {
                let start: u64 = caps[1].parse().unwrap();
                let end: u64 = caps[2].parse().unwrap();
                spans.push(Span { start, end, path: entry.path() });
            }
        }
        Ok(spans)
    }

    /// Rank existing spans against `[start, end]` and decide how to serve
    /// the request: containment first, then the closer of a forward or
    /// backward overlap, else a fresh download.
    pub fn resolve(&self, start: u64, end: u64) -> std::io::Result<Resolution> {
        let mut spans = self.list_spans()?;
        spans.sort_by_key(|s| distance(start, end, s.start, s.end));
        for span in spans {
            if span.start <= start && end <= span.end {
                return Ok(Resolution::Served(span.path));
            }
            if span.start <= start && start <= span.end && span.end < end {
                let missing_from = span.end + 1;
                return Ok(Resolution::TailExtend { span, missing_from });
            }
            if start < span.start && span.start <= end && end <= span.end {
                let missing_to = span.start - 1;
                return Ok(Resolution::HeadExtend { span, missing_to });
            }
        }
        Ok(Resolution::Fresh)
    }

    pub fn acquire_lock(&self, path: &Path) -> std::io::Result<()> {
        fs::File::create(Self::lock_path(path))?;
        Ok(())
    }

    pub fn release_lock(&self, path: &Path) -> std::io::Result<()> {
        let lock = Self::lock_path(path);
        if lock.exists() {
            fs::remove_file(lock)?;
        }
        Ok(())
    }

    fn is_locked(path: &Path) -> bool {
        Self::lock_path(path).exists()
    }

    /// Remove `path` unless a concurrent reader holds its lock, in which
    /// case drop a delete-marker sidecar for the cleanup pass to honor.
    fn remove_or_mark(&self, path: &Path) -> std::io::Result<()> {
        if Self::is_locked(path) {
            fs::File::create(Self::delete_marker_path(path))?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn write_fresh(&self, start: u64, end: u64, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.span_path(start, end);
        let mut f = fs::File::create(&path)?;
        f.write_all(bytes)?;
        Ok(path)
    }

    /// Grow `span`'s tail with `extra` (blocks `span.end+1..=new_end`),
    /// writing a new span file and retiring the old one.
    pub fn grow_tail(&self, span: &Span, new_end: u64, extra: &[u8]) -> Result<PathBuf, CacheError> {
        if !span.path.exists() {
            return Err(CacheError::CacheFileMissing(span.path.clone()));
        }
        let existing = fs::read(&span.path)?;
        let new_path = self.span_path(span.start, new_end);
        let mut f = fs::File::create(&new_path)?;
        f.write_all(&existing)?;
        f.write_all(extra)?;
        self.remove_or_mark(&span.path)?;
        Ok(new_path)
    }

    /// Grow `span`'s head with `extra` (blocks `new_start..=span.start-1`).
    pub fn grow_head(&self, span: &Span, new_start: u64, extra: &[u8]) -> Result<PathBuf, CacheError> {
        if !span.path.exists() {
            return Err(CacheError::CacheFileMissing(span.path.clone()));
        }
        let existing = fs::read(&span.path)?;
        let new_path = self.span_path(new_start, span.end);
        let mut f = fs::File::create(&new_path)?;
        f.write_all(extra)?;
        f.write_all(&existing)?;
        self.remove_or_mark(&span.path)?;
        Ok(new_path)
    }

    /// End-of-run reconciliation, in order: drop residual lock files, honor
    /// pending delete markers, drop empty/subsumed spans, merge adjacent
    /// spans, then merge overlapping spans. Restores the steady-state
    /// invariant that no two surviving spans overlap or touch. `blockmap`
    /// maps block ids to compressed byte offsets so overlapping spans can
    /// be joined without duplicating the shared bytes.
    pub fn cleanup(&self, blockmap: &dyn BlockMap) -> std::io::Result<()> {
        // Phase 0.1: drop lock files outright — a run-end cleanup assumes no
        // reader is still active.
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.to_string_lossy().ends_with('l') && !self.span_pattern().is_match(&file_name(&path)) {
                let _ = fs::remove_file(&path);
            }
        }

        // Phase 0.2: honor pending delete markers.
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = file_name(&path);
            if let Some(base) = name.strip_suffix('_') {
                if self.span_pattern().is_match(base) {
                    let base_path = self.dir.join(base);
                    if base_path.exists() {
                        fs::remove_file(&base_path)?;
                    }
                    fs::remove_file(&path)?;
                }
            }
        }

        let mut spans = self.list_spans()?;
        spans.retain(|s| match fs::metadata(&s.path) {
            Ok(m) => m.len() > 0,
            Err(_) => false,
        });
        spans.sort_by_key(|s| s.start);

        // Phase I: drop spans fully contained in a bigger one.
        let mut kept: Vec<Span> = Vec::new();
        'outer: for span in spans {
            for other in &kept {
                if other.start <= span.start && span.end <= other.end {
                    fs::remove_file(&span.path)?;
                    continue 'outer;
                }
            }
            kept.retain(|other| {
                if span.start <= other.start && other.end <= span.end {
                    let _ = fs::remove_file(&other.path);
                    false
                } else {
                    true
                }
            });
            kept.push(span);
        }
        kept.sort_by_key(|s| s.start);

        // Phase II: merge strictly adjacent spans until no more merges apply.
        loop {
            let mut merged_any = false;
            let mut next: Vec<Span> = Vec::new();
            let mut iter = kept.into_iter().peekable();
            while let Some(span) = iter.next() {
                if let Some(other) = iter.peek() {
                    if other.start == span.end + 1 {
                        let other = iter.next().unwrap();
                        let joined = self.join_spans(&span, &other)?;
                        next.push(joined);
                        merged_any = true;
                        continue;
                    }
                }
                next.push(span);
            }
            kept = next;
            if !merged_any {
                break;
            }
        }

        // Phase III: merge partially overlapping spans.
        loop {
            let mut merged_any = false;
            let mut next: Vec<Span> = Vec::new();
            let mut iter = kept.into_iter().peekable();
            while let Some(span) = iter.next() {
                if let Some(other) = iter.peek() {
                    if other.start <= span.end {
                        let other = iter.next().unwrap();
                        let joined = self.join_overlapping(&span, &other, blockmap)?;
                        next.push(joined);
                        merged_any = true;
                        continue;
                    }
                }
                next.push(span);
            }
            kept = next;
            if !merged_any {
                break;
            }
        }

        Ok(())
    }

    fn join_spans(&self, a: &Span, b: &Span) -> std::io::Result<Span> {
        let mut bytes = fs::read(&a.path)?;
        bytes.extend(fs::read(&b.path)?);
        let path = self.span_path(a.start, b.end);
        fs::write(&path, &bytes)?;
        fs::remove_file(&a.path)?;
        fs::remove_file(&b.path)?;
        Ok(Span { start: a.start, end: b.end, path })
    }

    /// `a` and `b` overlap (`b.start <= a.end`); keep `a`'s bytes verbatim
    /// and append only the portion of `b` past where `a` already ends.
    /// `a`'s span file holds compressed bytes
    /// `[compressed_start(a.start), compressed_end(a.end))`; `b`'s holds
    /// `[compressed_start(b.start), compressed_end(b.end))`. The byte
    /// offset within `b` where the non-overlapping tail begins is
    /// `compressed_end(a.end) - compressed_start(b.start)`.
    fn join_overlapping(&self, a: &Span, b: &Span, blockmap: &dyn BlockMap) -> std::io::Result<Span> {
        let bytes_a = fs::read(&a.path)?;
        let bytes_b = fs::read(&b.path)?;

        let a_end_byte = blockmap.compressed_end(a.end as usize);
        let b_start_byte = blockmap.compressed_start(b.start as usize);
        let trim = a_end_byte.saturating_sub(b_start_byte) as usize;
        let trim = trim.min(bytes_b.len());

        let mut bytes = bytes_a;
        bytes.extend_from_slice(&bytes_b[trim..]);

        let end = a.end.max(b.end);
        let path = self.span_path(a.start, end);
        fs::write(&path, &bytes)?;
        fs::remove_file(&a.path)?;
        fs::remove_file(&b.path)?;
        Ok(Span { start: a.start, end, path })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap_or_default().to_string_lossy().to_string()
}
