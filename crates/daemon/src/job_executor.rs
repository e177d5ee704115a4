//! Job executor: takes one pending job to a terminal state.
//!
//! Stability gate, encode, size gate, atomic replace. Every transition is
//! persisted to the store and every non-success terminal state mirrors its
//! reason into the why sidecar, so the daemon's decisions survive restarts
//! and are visible next to the media itself. Failures never escape: the
//! outcome lives entirely in the job record.

use crate::encode::{build_transcode_args, run_transcode, HwDevice};
use crate::jobs::{self, Job};
use crate::probe::ProbeResult;
use crate::replace::atomic_replace;
use crate::sidecar;
use crate::size_gate::{check_size_gate, SizeGateResult};
use crate::stability::{check_stability, StabilityResult};
use std::fs;
use std::path::{Path, PathBuf};

const MIB: f64 = 1024.0 * 1024.0;

/// Settings for one executor run.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// ffmpeg binary location.
    pub ffmpeg_bin: PathBuf,
    /// Job store directory.
    pub state_dir: PathBuf,
    /// Size-gate threshold: output must be <= original * ratio.
    pub max_size_ratio: f64,
    /// Seconds between the stability gate's two size samples.
    pub stability_wait_secs: u64,
    /// Whether to mirror reasons into `.av1qsvd-why.txt` sidecars.
    pub write_why_sidecars: bool,
    /// Language tags stripped from the output.
    pub strip_languages: Vec<String>,
    /// Hardware device directives for the encoder.
    pub hw: HwDevice,
}

/// Drive one pending job to a terminal state.
///
/// The caller supplies a fresh probe result for the source. On return the
/// job is Success, Failed, or Skipped; the store and sidecars reflect the
/// outcome. Only one invocation may run at a time: the hardware encoder is
/// single-tenant.
pub async fn execute_job(job: &mut Job, probe: &ProbeResult, cfg: &ExecutorConfig) {
    let source = job.source_path.clone();
    let temp_path = sidecar::temp_output_path(&source);

    // A stale temp from a crashed run is garbage; the rename never happened,
    // so the original is intact and the encode restarts from scratch.
    if temp_path.exists() {
        log::warn!("removing stale temp output {:?}", temp_path);
        let _ = fs::remove_file(&temp_path);
    }

    // Stability gate: two size samples across the wait window.
    match check_stability(&source, cfg.stability_wait_secs).await {
        Ok(StabilityResult::Stable) => {}
        Ok(StabilityResult::Unstable { initial_size, current_size }) => {
            log::info!(
                "{:?} grew from {} to {} bytes during stability window",
                source,
                initial_size,
                current_size
            );
            finish_skipped(job, "file still copying", cfg);
            return;
        }
        Err(e) => {
            finish_skipped(job, &format!("stability check failed: {}", e), cfg);
            return;
        }
    }

    job.mark_running();
    job.output_path = Some(temp_path.clone());
    persist(job, cfg);

    let args = match build_transcode_args(
        &source,
        &temp_path,
        probe,
        job.is_web_like,
        &cfg.strip_languages,
        &cfg.hw,
    ) {
        Ok(args) => args,
        Err(e) => {
            finish_failed(job, &format!("failed to build ffmpeg args: {}", e), cfg);
            return;
        }
    };

    log::info!(
        "encoding {:?} ({}, web_like={})",
        source,
        job.resolution,
        job.is_web_like
    );

    let ffmpeg_bin = cfg.ffmpeg_bin.clone();
    let blocking_args = args.clone();
    let encode_result =
        tokio::task::spawn_blocking(move || run_transcode(&ffmpeg_bin, &blocking_args)).await;

    match encode_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let _ = fs::remove_file(&temp_path);
            finish_failed(job, &e.to_string(), cfg);
            return;
        }
        Err(join_err) => {
            let _ = fs::remove_file(&temp_path);
            finish_failed(job, &format!("encode task panicked: {}", join_err), cfg);
            return;
        }
    }

    let output_bytes = match fs::metadata(&temp_path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            finish_failed(job, &format!("output file missing after encode: {}", e), cfg);
            return;
        }
    };
    job.new_bytes = output_bytes;

    // Size gate: the encode must have earned its keep.
    if let SizeGateResult::Reject { original_bytes, output_bytes, ratio } =
        check_size_gate(job.original_bytes, output_bytes, cfg.max_size_ratio)
    {
        let reason = format!(
            "size gate: new {:.1} MiB vs orig {:.1} MiB ({:.1}% > {:.0}%)",
            output_bytes as f64 / MIB,
            original_bytes as f64 / MIB,
            ratio * 100.0,
            cfg.max_size_ratio * 100.0,
        );

        // Permanent marker: re-encoding would produce the same result, so
        // future scans must not retry this file.
        if let Err(e) = sidecar::write_skip_marker(&source) {
            log::warn!("failed to write skip marker for {:?}: {}", source, e);
        }
        let _ = fs::remove_file(&temp_path);
        finish_skipped(job, &reason, cfg);
        return;
    }

    // Commit point: one rename replaces the original.
    if let Err(e) = atomic_replace(&source, &temp_path) {
        let _ = fs::remove_file(&temp_path);
        finish_failed(job, &e.to_string(), cfg);
        return;
    }

    job.mark_success(output_bytes);
    persist(job, cfg);
    log::info!(
        "success {:?}: {:.1} MiB -> {:.1} MiB ({:.1}% saved)",
        source,
        job.original_bytes as f64 / MIB,
        output_bytes as f64 / MIB,
        (1.0 - output_bytes as f64 / job.original_bytes.max(1) as f64) * 100.0,
    );
}

fn finish_skipped(job: &mut Job, reason: &str, cfg: &ExecutorConfig) {
    log::info!("skipped {:?}: {}", job.source_path, reason);
    job.skip(reason);
    note_why(&job.source_path, reason, cfg);
    persist(job, cfg);
}

fn finish_failed(job: &mut Job, reason: &str, cfg: &ExecutorConfig) {
    log::error!("failed {:?}: {}", job.source_path, reason);
    job.fail(reason);
    note_why(&job.source_path, reason, cfg);
    persist(job, cfg);
}

fn note_why(path: &Path, reason: &str, cfg: &ExecutorConfig) {
    if let Err(e) = sidecar::write_why_sidecar(path, reason, cfg.write_why_sidecars) {
        log::warn!("failed to write why sidecar for {:?}: {}", path, e);
    }
}

fn persist(job: &Job, cfg: &ExecutorConfig) {
    if let Err(e) = jobs::save_job(job, &cfg.state_dir) {
        log::warn!("failed to save job {}: {}", job.id, e);
    }
}
