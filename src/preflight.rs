//! Pre-flight input/output validation, grounded on the original tools'
//! `check_iofiles`/`check_files`: stat every input path for readability and
//! touch every output path for writability before any real work starts, so
//! a doomed run (missing input, unwritable output directory, a pre-existing
//! output file the original refuses to overwrite) fails fast instead of
//! partway through a parallel fan-out.

use crate::error::PreflightError;
use std::path::Path;

/// Confirm every path in `reads` opens for reading, and every path in
/// `writes` does not already exist and can be created. Touched output
/// files are removed immediately so the real writer creates them fresh.
pub fn check_iofiles(reads: &[&Path], writes: &[&Path]) -> Result<(), PreflightError> {
    for path in reads {
        std::fs::File::open(path).map_err(|_| PreflightError::Unreadable(path.to_path_buf()))?;
    }
    for path in writes {
        if path.exists() {
            return Err(PreflightError::OutputExists(path.to_path_buf()));
        }
        std::fs::File::create(path).map_err(|_| PreflightError::Unwritable(path.to_path_buf()))?;
        let _ = std::fs::remove_file(path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_missing_input() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(check_iofiles(&[&missing], &[]), Err(PreflightError::Unreadable(_))));
    }

    #[test]
    fn rejects_preexisting_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::write(&out, b"x").unwrap();
        assert!(matches!(check_iofiles(&[], &[&out]), Err(PreflightError::OutputExists(_))));
    }

    #[test]
    fn accepts_readable_input_and_fresh_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::write(&input, b"x").unwrap();
        let out = dir.path().join("out");
        check_iofiles(&[&input], &[&out]).unwrap();
        assert!(!out.exists(), "touched output should be removed after the check");
    }
}
