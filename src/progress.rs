//! Shared per-chunk progress counters.
//!
//! One worker owns one cell; no cell is ever written by more than one
//! worker, so summing at the end needs no further synchronization beyond
//! the `Vec` itself being handed back after the parallel phase completes.

use std::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub requested: u64,
    pub found: u64,
    pub extracted: u64,
    pub corrupted: u64,
}

impl Counters {
    pub fn sum(cells: &[Counters]) -> Counters {
        cells.iter().fold(Counters::default(), |acc, c| Counters {
            requested: acc.requested + c.requested,
            found: acc.found + c.found,
            extracted: acc.extracted + c.extracted,
            corrupted: acc.corrupted + c.corrupted,
        })
    }
}

/// Formats a `-v` summary line of per-run statistics.
pub fn summarize(label: &str, counters: Counters, started: Instant) {
    eprintln!(
        "{label}: requested={} found={} extracted={} corrupted={} elapsed={:.2}s",
        counters.requested,
        counters.found,
        counters.extracted,
        counters.corrupted,
        started.elapsed().as_secs_f64()
    );
}
