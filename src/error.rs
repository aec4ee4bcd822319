//! Per-module error enums.
//!
//! Each subsystem owns the failure modes it can actually produce; nothing
//! here aggregates them into one giant enum; call sites that need a single
//! error type (the library's cross-module helpers, the four CLI binaries)
//! fold them into `io::Error` via `io::Error::new(ErrorKind::Other, e)` or
//! propagate `anyhow::Error`, the same way the rest of the crate glues
//! unrelated error types together at a boundary instead of upfront.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index line missing field separator: {0:?}")]
    MalformedIndex(String),
    #[error("unrecognized position flavor in line: {0:?}")]
    UnknownFlavor(String),
    #[error("cipher type letter {0:?} is not one of A, B, C")]
    UnknownCipher(char),
    #[error("encrypted flavor line is missing its IV: {0:?}")]
    MissingIv(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key size must be 16, 24 or 32 bytes, got {0}")]
    BadKeySize(usize),
    #[error("pbkdf2 key derivation failed")]
    Kdf,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("indexes are incompatible: {0}")]
    IncompatibleIndex(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("size mismatch after deletion: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, thiserror::Error)]
pub enum BlockMapError {
    #[error("block index sidecar is corrupt: {0}")]
    CorruptBlockIndex(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cached span {0} was deleted by a concurrent worker")]
    CacheFileMissing(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("unsupported URL scheme, only http(s) is accepted")]
    UnsupportedScheme,
    #[error("remote returned unacceptable status {0}")]
    RangeHttpError(u16),
    #[error("remote request failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("identifier not found: {0}")]
    NotFound(String),
    #[error("entry failed integrity check: {0}")]
    Corrupted(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ArgError {
    #[error("{0}")]
    Contradictory(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("cannot open '{0}' for reading")]
    Unreadable(PathBuf),
    #[error("output '{0}' already exists; refusing to overwrite")]
    OutputExists(PathBuf),
    #[error("cannot create '{0}' for writing")]
    Unwritable(PathBuf),
}

/// Map an end-to-end `anyhow::Error` produced by one of the four binaries to
/// the exit status table: 0 success, 1 generic fatal, 2 file-not-found, 5
/// remote/compressed failure, 14 internal key mismatch, 22 argument error,
/// 80 corrupt sidecar index.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        if io_err.kind() == std::io::ErrorKind::NotFound {
            return 2;
        }
    }
    if err.downcast_ref::<RemoteError>().is_some() {
        return 5;
    }
    if err.downcast_ref::<CryptoError>().is_some() {
        return 14;
    }
    if err.downcast_ref::<ArgError>().is_some() {
        return 22;
    }
    if err.downcast_ref::<BlockMapError>().is_some() {
        return 80;
    }
    if let Some(pf) = err.downcast_ref::<PreflightError>() {
        return match pf {
            PreflightError::Unreadable(_) => 2,
            PreflightError::OutputExists(_) | PreflightError::Unwritable(_) => 1,
        };
    }
    1
}
