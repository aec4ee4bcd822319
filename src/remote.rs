//! Blocking HTTP Range client for fetching compressed block spans from a
//! remote flatfile without downloading the whole thing.

use crate::error::RemoteError;
use std::io::Read;

const USER_AGENT: &str = "ffdb-rs/1";

fn check_scheme(url: &str) -> Result<(), RemoteError> {
    if url.starts_with("ftp://") {
        return Err(RemoteError::UnsupportedScheme);
    }
    Ok(())
}

fn check_status(status: u16) -> Result<(), RemoteError> {
    if status == 200 || status == 206 {
        Ok(())
    } else {
        Err(RemoteError::RangeHttpError(status))
    }
}

/// Inclusive byte range `[begin, end]` over HTTP Range.
pub fn fetch_range(url: &str, begin: u64, end: u64) -> Result<Vec<u8>, RemoteError> {
    check_scheme(url)?;
    let response = ureq::get(url)
        .set("User-Agent", USER_AGENT)
        .set("Accept-Encoding", "identity")
        .set("Range", &format!("bytes={begin}-{end}"))
        .call()
        .map_err(|e| RemoteError::Transport(e.to_string()))?;
    check_status(response.status())?;
    let mut buf = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut buf)
        .map_err(|e| RemoteError::Transport(e.to_string()))?;
    Ok(buf)
}

/// Total remote size, read from the `Content-Length` header of a full GET.
pub fn remote_size(url: &str) -> Result<u64, RemoteError> {
    check_scheme(url)?;
    let response = ureq::get(url)
        .set("User-Agent", USER_AGENT)
        .set("Accept-Encoding", "identity")
        .call()
        .map_err(|e| RemoteError::Transport(e.to_string()))?;
    check_status(response.status())?;
    response
        .header("Content-Length")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RemoteError::Transport("missing Content-Length".to_string()))
}
