//! av1qsvd
//!
//! Long-running transcoding daemon: surveys media library trees, admits
//! video files worth re-encoding to AV1, classifies each source as web-like
//! or disc-like, drives the hardware encoder, and atomically commits the
//! result back into the library. State lives in per-job JSON records that a
//! read-only dashboard can observe.

pub mod classify;
pub mod daemon;
pub mod encode;
pub mod estimate;
pub mod job_executor;
pub mod jobs;
pub mod probe;
pub mod replace;
pub mod scan;
pub mod sidecar;
pub mod size_gate;
pub mod stability;
pub mod startup;

pub use av1qsvd_config as config;
pub use av1qsvd_config::Config;
pub use classify::{classify_source, SourceClass, SourceDecision};
pub use daemon::{Daemon, DaemonError, TickSummary};
pub use encode::{
    build_transcode_args, quality_for_height, run_transcode, EncodeError, HwDevice,
};
pub use estimate::estimate_output_size;
pub use job_executor::{execute_job, ExecutorConfig};
pub use jobs::{find_by_source_path, load_jobs, save_job, Job, JobStatus};
pub use probe::{
    parse_probe_output, probe_file, FlexInt, FormatInfo, ProbeError, ProbeResult, StreamInfo,
};
pub use replace::{atomic_replace, ReplaceError};
pub use scan::{
    admit_candidate, collect_media_files, is_video_file, run_scan_pass, AdmissionConfig,
    AdmissionOutcome, ScanCandidate, ScanSummary,
};
pub use size_gate::{check_size_gate, SizeGateResult};
pub use stability::{check_stability, StabilityResult};
pub use startup::{create_state_dir, resolve_binaries, Binaries, StartupError};
