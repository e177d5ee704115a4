//! Startup checks run before the daemon does any useful work.
//!
//! The encoder binaries are provisioned by an external installer into the
//! configured install directory; if they are not there the daemon cannot
//! remediate by retrying and exits non-zero. Everything after startup is a
//! soft, per-file failure.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for startup checks.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffmpeg not found at {0} (is the install step complete?)")]
    FfmpegMissing(PathBuf),

    #[error("ffprobe not found at {0} (is the install step complete?)")]
    FfprobeMissing(PathBuf),

    #[error("failed to create directory {path:?}: {source}")]
    DirCreation {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolved encoder binary locations.
#[derive(Debug, Clone)]
pub struct Binaries {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Resolve ffmpeg and ffprobe from the install directory, verifying both
/// exist.
pub fn resolve_binaries(install_dir: &Path) -> Result<Binaries, StartupError> {
    let ffmpeg = install_dir.join("ffmpeg");
    if !ffmpeg.is_file() {
        return Err(StartupError::FfmpegMissing(ffmpeg));
    }

    let ffprobe = install_dir.join("ffprobe");
    if !ffprobe.is_file() {
        return Err(StartupError::FfprobeMissing(ffprobe));
    }

    Ok(Binaries { ffmpeg, ffprobe })
}

/// Create the job state directory if it does not exist.
pub fn create_state_dir(state_dir: &Path) -> Result<(), StartupError> {
    std::fs::create_dir_all(state_dir).map_err(|e| StartupError::DirCreation {
        path: state_dir.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_binaries_both_present() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("ffmpeg")).unwrap();
        File::create(temp_dir.path().join("ffprobe")).unwrap();

        let binaries = resolve_binaries(temp_dir.path()).expect("Should resolve");
        assert_eq!(binaries.ffmpeg, temp_dir.path().join("ffmpeg"));
        assert_eq!(binaries.ffprobe, temp_dir.path().join("ffprobe"));
    }

    #[test]
    fn test_resolve_binaries_missing_ffmpeg() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("ffprobe")).unwrap();

        let err = resolve_binaries(temp_dir.path()).unwrap_err();
        assert!(matches!(err, StartupError::FfmpegMissing(_)));
    }

    #[test]
    fn test_resolve_binaries_missing_ffprobe() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("ffmpeg")).unwrap();

        let err = resolve_binaries(temp_dir.path()).unwrap_err();
        assert!(matches!(err, StartupError::FfprobeMissing(_)));
    }

    #[test]
    fn test_create_state_dir_nested() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("deeply/nested/jobs");

        create_state_dir(&nested).expect("Should create nested dirs");
        assert!(nested.is_dir());

        // Idempotent
        create_state_dir(&nested).expect("Second call should also succeed");
    }
}
