//! Scanner and admission filter.
//!
//! One scan pass walks every configured library root, applies the ordered
//! admission tests to each media file, and produces or refreshes job records.
//! Every rejection past the extension filter leaves a job record and a why
//! sidecar, so the decision is always explainable after the fact.

use crate::classify::classify_source;
use crate::encode::quality_for_height;
use crate::estimate::estimate_output_size;
use crate::jobs::{self, Job, JobStatus};
use crate::probe::probe_file;
use crate::sidecar;
use std::path::{Path, PathBuf};

/// Media extensions eligible for admission (lowercase, without the dot).
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "m4v"];

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A media file discovered during a library walk.
#[derive(Debug, Clone)]
pub struct ScanCandidate {
    /// Full path to the media file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
}

/// Settings the admission tests need.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Size floor; files at or below it are rejected.
    pub min_bytes: u64,
    /// Whether rejections also write `.av1qsvd-why.txt` sidecars.
    pub write_why_sidecars: bool,
    /// ffprobe binary location.
    pub ffprobe_bin: PathBuf,
    /// Job store directory.
    pub state_dir: PathBuf,
}

/// Outcome of running the admission tests on one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    /// Not logged, no sidecar: wrong extension or prior success.
    Ignored,
    /// Recorded as a Skipped job with this reason; why sidecar written.
    Rejected(String),
    /// Job is Pending (created or refreshed).
    Admitted,
}

/// Totals for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanSummary {
    pub admitted: usize,
    pub rejected: usize,
    pub ignored: usize,
}

/// Checks if a file has an eligible media extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walks the library roots and collects every file with an eligible
/// extension, in filesystem-walk order. Missing roots are skipped.
pub fn collect_media_files(roots: &[PathBuf]) -> Vec<ScanCandidate> {
    use walkdir::WalkDir;

    let mut candidates = Vec::new();

    for root in roots {
        if !root.exists() {
            log::warn!("library root {:?} does not exist, skipping", root);
            continue;
        }

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !is_video_file(path) {
                continue;
            }

            if let Ok(metadata) = entry.metadata() {
                candidates.push(ScanCandidate {
                    path: path.to_path_buf(),
                    size_bytes: metadata.len(),
                });
            }
        }
    }

    candidates
}

/// Runs the admission tests on one candidate, in order; the first matching
/// test decides the outcome.
pub fn admit_candidate(
    candidate: &ScanCandidate,
    existing_jobs: &mut Vec<Job>,
    cfg: &AdmissionConfig,
) -> AdmissionOutcome {
    let path = &candidate.path;

    // Permanent skip marker.
    if sidecar::has_skip_marker(path) {
        return reject(candidate, existing_jobs, cfg, "marked with .av1qsvd-skip");
    }

    // A prior success is the only permanent decision; everything else is
    // provisional and re-evaluated below.
    let existing = jobs::find_by_source_path(existing_jobs, path);
    if let Some(idx) = existing {
        if existing_jobs[idx].status == JobStatus::Success {
            return AdmissionOutcome::Ignored;
        }
    }

    // Size floor; strict greater-than passes.
    if candidate.size_bytes <= cfg.min_bytes {
        let reason = format!(
            "below size floor: {} bytes ({:.2} GiB) <= {:.2} GiB",
            candidate.size_bytes,
            candidate.size_bytes as f64 / GIB,
            cfg.min_bytes as f64 / GIB,
        );
        return reject(candidate, existing_jobs, cfg, &reason);
    }

    let probe = match probe_file(&cfg.ffprobe_bin, path) {
        Ok(probe) => probe,
        Err(e) => {
            return reject(candidate, existing_jobs, cfg, &format!("ffprobe failed: {}", e));
        }
    };

    if !probe.has_video {
        return reject(candidate, existing_jobs, cfg, "not a video");
    }

    if probe.has_av1 {
        return reject(candidate, existing_jobs, cfg, "already av1");
    }

    let decision = classify_source(path, &probe);
    if let Err(e) = sidecar::write_classification_sidecar(
        path,
        &decision.class.to_string(),
        decision.score,
        &decision.reasons,
    ) {
        log::warn!("failed to write classification sidecar for {:?}: {}", path, e);
    }

    // Admit: reuse the existing record or create a fresh one.
    let idx = match existing {
        Some(idx) => {
            // A Running record at scan time can only be a crashed prior run;
            // the single executor never overlaps a scan pass.
            if existing_jobs[idx].status == JobStatus::Running {
                existing_jobs[idx].status = JobStatus::Pending;
            }
            existing_jobs[idx].reset_for_rescan();
            idx
        }
        None => {
            existing_jobs.push(Job::new(path));
            existing_jobs.len() - 1
        }
    };

    let job = &mut existing_jobs[idx];
    job.original_bytes = candidate.size_bytes;
    job.is_web_like = decision.is_web_like();
    job.apply_probe_metadata(&probe);

    let quality = probe
        .main_video
        .as_ref()
        .map(|v| quality_for_height(v.height.value()))
        .unwrap_or(24);
    job.estimated_bytes = estimate_output_size(candidate.size_bytes, &probe, quality);
    job.classification = decision;

    log::info!(
        "admitted {:?} (class {}, score {:+.1}, codec {}, {})",
        path,
        job.classification.class,
        job.classification.score,
        job.source_codec,
        job.resolution,
    );

    persist(&existing_jobs[idx], cfg);
    AdmissionOutcome::Admitted
}

/// Record a rejection: upsert a Skipped job and write the why sidecar.
fn reject(
    candidate: &ScanCandidate,
    existing_jobs: &mut Vec<Job>,
    cfg: &AdmissionConfig,
    reason: &str,
) -> AdmissionOutcome {
    log::info!("rejected {:?}: {}", candidate.path, reason);

    let idx = match jobs::find_by_source_path(existing_jobs, &candidate.path) {
        Some(idx) => idx,
        None => {
            let mut job = Job::new(&candidate.path);
            job.original_bytes = candidate.size_bytes;
            existing_jobs.push(job);
            existing_jobs.len() - 1
        }
    };
    // Success is permanent; a marker next to an already-done file only gets
    // the sidecar refreshed. An identical rejection from a prior pass stays
    // untouched so rescans of an unchanged library do not churn the store.
    let job = &existing_jobs[idx];
    let unchanged = job.status == JobStatus::Skipped && job.reason == reason;
    if job.status != JobStatus::Success && !unchanged {
        existing_jobs[idx].skip(reason);
        persist(&existing_jobs[idx], cfg);
    }

    if let Err(e) = sidecar::write_why_sidecar(&candidate.path, reason, cfg.write_why_sidecars) {
        log::warn!("failed to write why sidecar for {:?}: {}", candidate.path, e);
    }

    AdmissionOutcome::Rejected(reason.to_string())
}

/// Durability is best-effort per record; the in-memory transition stands
/// and the next scan re-creates anything that failed to persist.
fn persist(job: &Job, cfg: &AdmissionConfig) {
    if let Err(e) = jobs::save_job(job, &cfg.state_dir) {
        log::warn!("failed to save job {}: {}", job.id, e);
    }
}

/// One full scan pass: walk every root, run admission on every candidate.
pub fn run_scan_pass(
    roots: &[PathBuf],
    existing_jobs: &mut Vec<Job>,
    cfg: &AdmissionConfig,
) -> ScanSummary {
    let mut summary = ScanSummary::default();

    for candidate in collect_media_files(roots) {
        match admit_candidate(&candidate, existing_jobs, cfg) {
            AdmissionOutcome::Admitted => summary.admitted += 1,
            AdmissionOutcome::Rejected(_) => summary.rejected += 1,
            AdmissionOutcome::Ignored => summary.ignored += 1,
        }
    }

    summary
}
