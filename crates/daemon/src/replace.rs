//! Replacer module: commits the finished encode over the original file.
//!
//! The temporary output already lives in the source's directory, so a single
//! same-directory rename is the whole commit. Everything before the rename is
//! reversible by deleting the temp file; there is no window where the source
//! path refers to partial content.

use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during file replacement.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// The temporary output is missing or unreadable.
    #[error("temporary output missing: {0}")]
    TempMissing(std::io::Error),

    /// The rename over the original failed.
    #[error("failed to replace original: {0}")]
    RenameFailed(std::io::Error),

    /// The source path did not exist after the rename.
    #[error("replaced file verification failed: {0}")]
    VerifyFailed(std::io::Error),
}

/// Atomically replaces the original file with the temporary output.
///
/// Verifies the temp file exists, renames it over the original (the commit
/// point), then stats the source path to close the window. On any failure
/// the caller owns cleanup of the temp file; the original is untouched
/// unless the rename already happened.
pub fn atomic_replace(original_path: &Path, temp_path: &Path) -> Result<(), ReplaceError> {
    fs::metadata(temp_path).map_err(ReplaceError::TempMissing)?;

    fs::rename(temp_path, original_path).map_err(ReplaceError::RenameFailed)?;

    fs::metadata(original_path).map_err(ReplaceError::VerifyFailed)?;

    Ok(())
}
