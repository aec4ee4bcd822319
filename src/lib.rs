//! # ffidx — flat-file record database with an external positional index
//!
//! Four tightly coupled subsystems, leaves first:
//! - [`b64`], [`crc`], [`deflate`], [`crypto`]: the codec layer (C1) —
//!   position/length integer encoding, CRC32, per-entry DEFLATE, PBKDF2 +
//!   AES-CFB.
//! - [`index`]: on-disk index line format and flavor classification (C2).
//! - [`search`]: binary search over a sorted, line-oriented index file (C3).
//! - [`splitter`], [`entry`]: shard boundary computation (C4) and the
//!   entry-terminator scanner (C5).
//! - [`indexer`]: the parallel indexing driver (C6).
//! - [`merger`]: append-and-merge-sort of a delta flatfile/index pair (C7).
//! - [`blockmap`], [`cache`], [`remote`]: block-gzip position mapping (C8),
//!   the disk span cache (C9), and the blocking HTTP Range client.
//! - [`extractor`]: identifier lookup, adjacent-range batching, fetch and
//!   post-process (C10).
//! - [`deleter`]: entry removal and index reindexing (C11).
//! - [`preflight`]: input-readable/output-writable checks run before a
//!   binary starts any real work.
//!
//! Guarantees that span multiple modules are documented at the point
//! they're enforced rather than repeated here: the position codec's
//! alphabet and the PBKDF2 salt are frozen, deployment-wide constants
//! (see [`b64::ALPHABET`] and [`crypto::SALT`]); changing either breaks
//! every index or encrypted flatfile built against the old value.

pub mod b64;
pub mod blockmap;
pub mod cache;
pub mod crc;
pub mod crypto;
pub mod deflate;
pub mod deleter;
pub mod entry;
pub mod error;
pub mod extractor;
pub mod index;
pub mod indexer;
pub mod merger;
pub mod preflight;
pub mod progress;
pub mod remote;
pub mod search;
pub mod sizefmt;
pub mod splitter;

pub use crypto::CipherKind;
pub use error::exit_code;
pub use index::{Flavor, IndexEntry, FIELDSEP};
