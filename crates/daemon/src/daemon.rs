//! Daemon entry point and main loop.
//!
//! Single-threaded orchestration: one scan pass over the library roots,
//! then the pending jobs drain sequentially through the executor (the
//! hardware encoder is single-tenant), then the loop sleeps for the
//! configured interval. Per-file failures never cross into another file's
//! processing; only startup errors are fatal.

use crate::classify::classify_source;
use crate::config::{Config, ConfigError};
use crate::encode::HwDevice;
use crate::job_executor::{execute_job, ExecutorConfig};
use crate::jobs::{self, JobStatus};
use crate::probe::probe_file;
use crate::scan::{run_scan_pass, AdmissionConfig, ScanSummary};
use crate::sidecar;
use crate::startup::{create_state_dir, resolve_binaries, Binaries, StartupError};
use std::time::Duration;
use thiserror::Error;

/// Error type for daemon operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed.
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),
}

/// Daemon state: configuration plus the resolved external collaborators.
pub struct Daemon {
    config: Config,
    binaries: Binaries,
    hw: HwDevice,
}

/// Result of one tick of the main loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickSummary {
    /// Scan pass totals.
    pub scan: ScanSummary,
    /// Jobs the executor drove to a terminal state this tick.
    pub executed: usize,
}

impl Daemon {
    /// Initialize the daemon: resolve the encoder binaries, create the job
    /// state directory, detect the hardware device.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        let binaries = resolve_binaries(&config.paths.ffmpeg_install_dir)?;
        create_state_dir(&config.paths.job_state_dir)?;

        let hw = HwDevice::detect();
        log::info!("ffmpeg ready at {:?}", binaries.ffmpeg);
        log::info!("hardware device init: {}", hw.vaapi_init);

        Ok(Self {
            config,
            binaries,
            hw,
        })
    }

    fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            min_bytes: self.config.gates.min_bytes,
            write_why_sidecars: self.config.scan.write_why_sidecars,
            ffprobe_bin: self.binaries.ffprobe.clone(),
            state_dir: self.config.paths.job_state_dir.clone(),
        }
    }

    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            ffmpeg_bin: self.binaries.ffmpeg.clone(),
            state_dir: self.config.paths.job_state_dir.clone(),
            max_size_ratio: self.config.gates.max_size_ratio,
            stability_wait_secs: self.config.scan.stability_wait_secs,
            write_why_sidecars: self.config.scan.write_why_sidecars,
            strip_languages: self.config.encode.strip_languages.clone(),
            hw: self.hw.clone(),
        }
    }

    /// One tick: scan pass, then drain every pending job sequentially.
    ///
    /// Jobs loaded from the store sit ahead of newly admitted ones, so work
    /// left over from prior passes drains first.
    pub async fn run_once(&self) -> TickSummary {
        let state_dir = &self.config.paths.job_state_dir;
        let mut all_jobs = jobs::load_jobs(state_dir).unwrap_or_else(|e| {
            log::warn!("failed to load existing jobs: {}", e);
            Vec::new()
        });

        let scan = run_scan_pass(
            &self.config.scan.library_roots,
            &mut all_jobs,
            &self.admission_config(),
        );
        log::info!(
            "scan pass: {} admitted, {} rejected, {} ignored",
            scan.admitted,
            scan.rejected,
            scan.ignored
        );

        let exec_cfg = self.executor_config();
        let mut executed = 0;

        for idx in 0..all_jobs.len() {
            if all_jobs[idx].status != JobStatus::Pending {
                continue;
            }

            let job = &mut all_jobs[idx];
            log::info!("processing job {}: {:?}", job.id, job.source_path);

            // Fresh probe: the file may have changed since the scan.
            let probe = match probe_file(&self.binaries.ffprobe, &job.source_path) {
                Ok(probe) => probe,
                Err(e) => {
                    let reason = format!("ffprobe failed: {}", e);
                    job.skip(&reason);
                    if let Err(e) = sidecar::write_why_sidecar(
                        &job.source_path,
                        &reason,
                        self.config.scan.write_why_sidecars,
                    ) {
                        log::warn!("failed to write why sidecar: {}", e);
                    }
                    if let Err(e) = jobs::save_job(job, state_dir) {
                        log::warn!("failed to save job {}: {}", job.id, e);
                    }
                    executed += 1;
                    continue;
                }
            };

            // Refresh the profile selection from the fresh probe.
            let decision = classify_source(&job.source_path, &probe);
            job.is_web_like = decision.is_web_like();
            job.classification = decision;

            execute_job(job, &probe, &exec_cfg).await;
            executed += 1;
        }

        TickSummary { scan, executed }
    }

    /// Run the daemon loop: scan, drain, sleep, repeat.
    pub async fn run(&self) {
        if self.config.scan.library_roots.is_empty() {
            log::warn!("no library roots configured; the daemon will idle");
        }

        loop {
            self.run_once().await;

            log::info!(
                "sleeping {}s until next scan",
                self.config.scan.scan_interval_sec
            );
            tokio::time::sleep(Duration::from_secs(self.config.scan.scan_interval_sec)).await;
        }
    }
}
