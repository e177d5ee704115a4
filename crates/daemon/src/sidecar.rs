//! Sidecar module for the files written alongside library media.
//!
//! All sidecars share the source file's basename with a distinct suffix:
//! the permanent `.av1qsvd-skip` marker, the human-readable
//! `.av1qsvd-why.txt` explanation, the `.av1qsvd-classification.txt` dump,
//! the operator overrides `.websafe` / `.nowebsafe`, and the transient
//! `.av1-tmp.mkv` encode output.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Constructs the permanent skip marker path for a media file.
///
/// `/media/film.mkv` -> `/media/film.av1qsvd-skip`
pub fn skip_marker_path(media_path: &Path) -> PathBuf {
    media_path.with_extension("av1qsvd-skip")
}

/// Constructs the why sidecar path for a media file.
///
/// `/media/film.mkv` -> `/media/film.av1qsvd-why.txt`
pub fn why_path(media_path: &Path) -> PathBuf {
    media_path.with_extension("av1qsvd-why.txt")
}

/// Constructs the classification sidecar path for a media file.
pub fn classification_path(media_path: &Path) -> PathBuf {
    media_path.with_extension("av1qsvd-classification.txt")
}

/// Operator override forcing web-like treatment.
pub fn websafe_path(media_path: &Path) -> PathBuf {
    media_path.with_extension("websafe")
}

/// Operator override forcing disc-like treatment.
pub fn nowebsafe_path(media_path: &Path) -> PathBuf {
    media_path.with_extension("nowebsafe")
}

/// Temporary encode output path in the source's directory.
///
/// `/media/film.mkv` -> `/media/film.av1-tmp.mkv`
pub fn temp_output_path(media_path: &Path) -> PathBuf {
    media_path.with_extension("av1-tmp.mkv")
}

/// Checks if a permanent skip marker exists for the given media file.
pub fn has_skip_marker(media_path: &Path) -> bool {
    skip_marker_path(media_path).exists()
}

/// Creates the permanent `.av1qsvd-skip` marker so future scans ignore the file.
pub fn write_skip_marker(media_path: &Path) -> io::Result<()> {
    let mut file = File::create(skip_marker_path(media_path))?;
    file.write_all(b"skip")?;
    Ok(())
}

/// Writes the `.av1qsvd-why.txt` sidecar with the reason for the last
/// skip or rejection. A no-op when `enabled` is false.
pub fn write_why_sidecar(media_path: &Path, reason: &str, enabled: bool) -> io::Result<()> {
    if !enabled {
        return Ok(());
    }

    let mut file = File::create(why_path(media_path))?;
    writeln!(file, "{}", reason)?;
    Ok(())
}

/// Writes the `.av1qsvd-classification.txt` sidecar with the classifier's
/// class, score, and the ordered list of fired reasons.
pub fn write_classification_sidecar(
    media_path: &Path,
    class: &str,
    score: f64,
    reasons: &[String],
) -> io::Result<()> {
    let mut file = File::create(classification_path(media_path))?;
    writeln!(file, "class: {}", class)?;
    writeln!(file, "score: {:+.1}", score)?;
    writeln!(file, "reasons:")?;
    for reason in reasons {
        writeln!(file, "  - {}", reason)?;
    }
    Ok(())
}
