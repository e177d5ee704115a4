//! Job store module for persisting and querying transcoding jobs.
//!
//! One JSON record per job, keyed by a generated id, inside the configured
//! state directory. Writes go through a same-directory temp file plus rename
//! so a crash never leaves a partial record; the dashboard reads the same
//! files and always observes a self-consistent job.

use crate::classify::SourceDecision;
use crate::probe::ProbeResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for the executor.
    Pending,
    /// Job is currently transcoding.
    Running,
    /// Job completed and the original was replaced. Permanent.
    Success,
    /// Job failed; re-evaluated on a later scan.
    Failed,
    /// Job was skipped (admission rejection, size gate, instability);
    /// re-evaluated on a later scan unless a skip marker was written.
    Skipped,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One record per file the daemon has ever considered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique job identifier (UUID).
    pub id: String,
    /// Absolute path to the source file; the lookup key during scans.
    pub source_path: PathBuf,
    /// Temporary output path, recorded when the executor derives it.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Current status.
    pub status: JobStatus,
    /// Human-readable explanation of the current non-success status.
    #[serde(default)]
    pub reason: String,
    /// Unix timestamp (milliseconds) when the job was created.
    pub created_at: i64,
    /// Set on the transition to Running.
    #[serde(default)]
    pub started_at: Option<i64>,
    /// Set on any transition to a terminal status.
    #[serde(default)]
    pub finished_at: Option<i64>,
    /// Source size in bytes, captured at scan time.
    #[serde(default)]
    pub original_bytes: u64,
    /// Output size in bytes, captured post-encode.
    #[serde(default)]
    pub new_bytes: u64,
    /// Predicted output size; informational only.
    #[serde(default)]
    pub estimated_bytes: u64,
    /// Source video codec name.
    #[serde(default)]
    pub source_codec: String,
    /// Source resolution as "WxH".
    #[serde(default)]
    pub resolution: String,
    /// Source bit depth.
    #[serde(default)]
    pub bit_depth: i64,
    /// Source frame rate string as reported by the prober.
    #[serde(default)]
    pub frame_rate: String,
    /// Container format name.
    #[serde(default)]
    pub container: String,
    /// Number of audio tracks.
    #[serde(default)]
    pub audio_streams: usize,
    /// Number of subtitle tracks.
    #[serde(default)]
    pub subtitle_streams: usize,
    /// The classifier's decision at the last scan.
    #[serde(default)]
    pub classification: SourceDecision,
    /// Derived flag selecting the web-safe encoder profile.
    #[serde(default)]
    pub is_web_like: bool,
}

impl Job {
    /// Creates a new pending job for a source path.
    pub fn new(source_path: &Path) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path: source_path.to_path_buf(),
            output_path: None,
            status: JobStatus::Pending,
            reason: String::new(),
            created_at: current_timestamp_ms(),
            started_at: None,
            finished_at: None,
            original_bytes: 0,
            new_bytes: 0,
            estimated_bytes: 0,
            source_codec: String::new(),
            resolution: String::new(),
            bit_depth: 0,
            frame_rate: String::new(),
            container: String::new(),
            audio_streams: 0,
            subtitle_streams: 0,
            classification: SourceDecision::default(),
            is_web_like: false,
        }
    }

    /// Transition to Running and record the start time.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(current_timestamp_ms());
    }

    /// Transition to Success, recording the output size and finish time.
    pub fn mark_success(&mut self, new_bytes: u64) {
        self.status = JobStatus::Success;
        self.reason = String::new();
        self.new_bytes = new_bytes;
        self.finished_at = Some(current_timestamp_ms());
    }

    /// Transition to Failed with a reason.
    pub fn fail(&mut self, reason: &str) {
        self.status = JobStatus::Failed;
        self.reason = reason.to_string();
        self.finished_at = Some(current_timestamp_ms());
    }

    /// Transition to Skipped with a reason.
    pub fn skip(&mut self, reason: &str) {
        self.status = JobStatus::Skipped;
        self.reason = reason.to_string();
        self.finished_at = Some(current_timestamp_ms());
    }

    /// Reset a Failed or Skipped job to Pending for re-evaluation,
    /// clearing the reason and both transition timestamps.
    ///
    /// Success is permanent and never resets.
    pub fn reset_for_rescan(&mut self) {
        if matches!(self.status, JobStatus::Failed | JobStatus::Skipped) {
            self.status = JobStatus::Pending;
            self.reason = String::new();
            self.started_at = None;
            self.finished_at = None;
        }
    }

    /// Populate the informational source descriptors from a probe result.
    pub fn apply_probe_metadata(&mut self, probe: &ProbeResult) {
        self.container = probe.format.format_name.clone();
        self.audio_streams = probe.audio_stream_count();
        self.subtitle_streams = probe.subtitle_stream_count();

        if let Some(main) = probe.main_video.as_ref() {
            self.source_codec = main.codec_name.clone();
            self.resolution = format!("{}x{}", main.width.value(), main.height.value());
            self.bit_depth = main.bit_depth.value();
            self.frame_rate = if main.avg_frame_rate.is_empty() {
                main.r_frame_rate.clone()
            } else {
                main.avg_frame_rate.clone()
            };
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Success | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Saves a job record as `{job_id}.json` in the state directory.
///
/// The record is written to a temp file in the same directory and renamed
/// over the final name; after a crash either the prior record or the new
/// record is observed, never partial content.
pub fn save_job(job: &Job, state_dir: &Path) -> Result<(), io::Error> {
    fs::create_dir_all(state_dir)?;

    let json = serde_json::to_string_pretty(job)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let final_path = state_dir.join(format!("{}.json", job.id));
    let tmp_path = state_dir.join(format!(".{}.json.tmp", job.id));

    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, &final_path)
}

/// Loads all job records from the state directory.
///
/// Records that fail to parse are skipped with a warning so one corrupt
/// file cannot block the daemon.
pub fn load_jobs(state_dir: &Path) -> Result<Vec<Job>, io::Error> {
    if !state_dir.exists() {
        return Ok(Vec::new());
    }

    let mut jobs = Vec::new();

    for entry in fs::read_dir(state_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        match load_job_from_file(&path) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                log::warn!("failed to load job from {:?}: {}", path, e);
            }
        }
    }

    Ok(jobs)
}

/// Loads a single job from a JSON file.
fn load_job_from_file(path: &Path) -> Result<Job, io::Error> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Finds the index of the job whose source path matches, if any.
///
/// Linear scan; library sizes are bounded by files, not requests.
pub fn find_by_source_path(jobs: &[Job], path: &Path) -> Option<usize> {
    jobs.iter().position(|job| job.source_path == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SourceClass;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn make_job(path: &str) -> Job {
        Job::new(Path::new(path))
    }

    // Strategy for generating arbitrary job statuses
    fn job_status_strategy() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Running),
            Just(JobStatus::Success),
            Just(JobStatus::Failed),
            Just(JobStatus::Skipped),
        ]
    }

    fn source_class_strategy() -> impl Strategy<Value = SourceClass> {
        prop_oneof![
            Just(SourceClass::WebLike),
            Just(SourceClass::DiscLike),
            Just(SourceClass::Unknown),
        ]
    }

    // Strategy for generating jobs with arbitrary field values
    fn job_strategy() -> impl Strategy<Value = Job> {
        (
            (
                "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}",
                "[a-zA-Z0-9/_.-]{5,50}",
                job_status_strategy(),
                prop::option::of("[a-zA-Z0-9 ]{0,80}"),
                0i64..2_000_000_000_000i64,
                prop::option::of(0i64..2_000_000_000_000i64),
                prop::option::of(0i64..2_000_000_000_000i64),
            ),
            (
                0u64..100_000_000_000,
                0u64..100_000_000_000,
                0u64..100_000_000_000,
                "[a-z0-9]{2,10}",
                0i64..16,
                source_class_strategy(),
                -12.0f64..12.0,
                prop::collection::vec("[a-z '()+.0-9-]{1,40}", 0..5),
                proptest::bool::ANY,
            ),
        )
            .prop_map(
                |(
                    (id, source, status, reason, created, started, finished),
                    (orig, new, est, codec, depth, class, score, reasons, web),
                )| Job {
                    id,
                    source_path: PathBuf::from(source),
                    output_path: None,
                    status,
                    reason: reason.unwrap_or_default(),
                    created_at: created,
                    started_at: started,
                    finished_at: finished,
                    original_bytes: orig,
                    new_bytes: new,
                    estimated_bytes: est,
                    source_codec: codec,
                    resolution: "1920x1080".to_string(),
                    bit_depth: depth,
                    frame_rate: "24000/1001".to_string(),
                    container: "matroska,webm".to_string(),
                    audio_streams: 2,
                    subtitle_streams: 1,
                    classification: SourceDecision {
                        class,
                        score,
                        reasons,
                    },
                    is_web_like: web,
                },
            )
    }

    // Serializing any job to JSON and back preserves every field.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_job_json_round_trip(job in job_strategy()) {
            let json = serde_json::to_string(&job).expect("Job should serialize");
            let back: Job = serde_json::from_str(&json).expect("JSON should deserialize");
            prop_assert_eq!(job, back);
        }

        // Saving a loaded, unmutated job produces a bit-identical record.
        #[test]
        fn prop_save_load_save_is_bit_identical(job in job_strategy()) {
            let temp_dir = TempDir::new().unwrap();
            let state_dir = temp_dir.path();

            save_job(&job, state_dir).expect("first save");
            let record_path = state_dir.join(format!("{}.json", job.id));
            let first = fs::read(&record_path).expect("read first");

            let loaded = load_jobs(state_dir).expect("load");
            prop_assert_eq!(loaded.len(), 1);
            save_job(&loaded[0], state_dir).expect("second save");
            let second = fs::read(&record_path).expect("read second");

            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn test_new_job_initial_state() {
        let job = make_job("/media/movies/film.mkv");

        assert_eq!(job.id.len(), 36);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.reason.is_empty());
        assert!(job.created_at > 0);
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_mark_running_sets_started_at() {
        let mut job = make_job("/media/movies/film.mkv");
        job.mark_running();

        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_terminal_transitions_set_finished_at() {
        let mut job = make_job("/media/movies/film.mkv");
        job.mark_running();
        job.mark_success(1_800_000_000);
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.new_bytes, 1_800_000_000);
        assert!(job.finished_at.is_some());

        let mut job = make_job("/media/movies/film.mkv");
        job.fail("ffmpeg exit code 1");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.reason, "ffmpeg exit code 1");
        assert!(job.finished_at.is_some());

        let mut job = make_job("/media/movies/film.mkv");
        job.skip("file still copying");
        assert_eq!(job.status, JobStatus::Skipped);
        assert!(job.finished_at.is_some());
        // Skipped without ever running leaves started_at empty
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_reset_for_rescan() {
        let mut job = make_job("/media/movies/film.mkv");
        job.mark_running();
        job.fail("transient failure");

        job.reset_for_rescan();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.reason.is_empty());
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_reset_for_rescan_never_touches_success() {
        let mut job = make_job("/media/movies/film.mkv");
        job.mark_running();
        job.mark_success(1000);
        let finished = job.finished_at;

        job.reset_for_rescan();

        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.finished_at, finished);
    }

    #[test]
    fn test_save_and_load_job() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path();

        let mut job = make_job("/media/movies/film.mkv");
        job.original_bytes = 4_294_967_296;
        job.is_web_like = true;
        let job_id = job.id.clone();

        save_job(&job, state_dir).expect("Should save job");
        assert!(state_dir.join(format!("{}.json", job_id)).exists());

        let loaded = load_jobs(state_dir).expect("Should load jobs");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], job);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path();

        let job = make_job("/media/movies/film.mkv");
        save_job(&job, state_dir).expect("Should save job");

        let leftovers: Vec<_> = fs::read_dir(state_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_load_jobs_skips_corrupt_records() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path();

        let job = make_job("/media/movies/film.mkv");
        save_job(&job, state_dir).expect("Should save job");

        fs::write(state_dir.join("corrupt.json"), "{not valid json").unwrap();
        fs::write(state_dir.join("notes.txt"), "ignored").unwrap();

        let loaded = load_jobs(state_dir).expect("Should load despite corrupt record");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, job.id);
    }

    #[test]
    fn test_load_jobs_nonexistent_dir() {
        let jobs = load_jobs(Path::new("/nonexistent/path/that/does/not/exist"))
            .expect("Should return empty for nonexistent dir");
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_find_by_source_path() {
        let job1 = make_job("/media/movies/film1.mkv");
        let job2 = make_job("/media/movies/film2.mkv");
        let jobs = vec![job1.clone(), job2.clone()];

        assert_eq!(
            find_by_source_path(&jobs, Path::new("/media/movies/film1.mkv")),
            Some(0)
        );
        assert_eq!(
            find_by_source_path(&jobs, Path::new("/media/movies/film2.mkv")),
            Some(1)
        );
        assert_eq!(
            find_by_source_path(&jobs, Path::new("/media/movies/film3.mkv")),
            None
        );
    }

    #[test]
    fn test_apply_probe_metadata() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "hevc",
                 "width": 3840, "height": 2160, "avg_frame_rate": "24000/1001",
                 "r_frame_rate": "24000/1001", "bits_per_raw_sample": "10"},
                {"index": 1, "codec_type": "audio", "codec_name": "truehd"},
                {"index": 2, "codec_type": "audio", "codec_name": "ac3"},
                {"index": 3, "codec_type": "subtitle", "codec_name": "hdmv_pgs_subtitle"}
            ],
            "format": {"format_name": "matroska,webm", "duration": "7200.0", "size": "30000000000"}
        }"#;
        let probe = crate::probe::parse_probe_output(json).unwrap();

        let mut job = make_job("/media/movies/film.mkv");
        job.apply_probe_metadata(&probe);

        assert_eq!(job.source_codec, "hevc");
        assert_eq!(job.resolution, "3840x2160");
        assert_eq!(job.bit_depth, 10);
        assert_eq!(job.frame_rate, "24000/1001");
        assert_eq!(job.container, "matroska,webm");
        assert_eq!(job.audio_streams, 2);
        assert_eq!(job.subtitle_streams, 1);
    }
}
