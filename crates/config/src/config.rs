//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Filesystem locations used by the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Directory where job JSON records are persisted
    #[serde(default = "default_job_state_dir")]
    pub job_state_dir: PathBuf,
    /// Directory containing the ffmpeg/ffprobe binaries
    #[serde(default = "default_ffmpeg_install_dir")]
    pub ffmpeg_install_dir: PathBuf,
    /// Download source for the ffmpeg build (consumed by the installer)
    #[serde(default = "default_ffmpeg_url")]
    pub ffmpeg_url: String,
}

fn data_dir() -> PathBuf {
    let home = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".local").join("share").join("av1qsvd")
}

fn default_job_state_dir() -> PathBuf {
    data_dir().join("jobs")
}

fn default_ffmpeg_install_dir() -> PathBuf {
    data_dir().join("ffmpeg")
}

fn default_ffmpeg_url() -> String {
    "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-n8.0-latest-linux64-gpl-8.0.tar.xz"
        .to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            job_state_dir: default_job_state_dir(),
            ffmpeg_install_dir: default_ffmpeg_install_dir(),
            ffmpeg_url: default_ffmpeg_url(),
        }
    }
}

/// Library scanning configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Absolute paths of the media library roots to scan (may be empty)
    #[serde(default)]
    pub library_roots: Vec<PathBuf>,
    /// Seconds between scan passes
    #[serde(default = "default_scan_interval_sec")]
    pub scan_interval_sec: u64,
    /// Seconds between the two size samples of the stability gate
    #[serde(default = "default_stability_wait_secs")]
    pub stability_wait_secs: u64,
    /// Whether to write `.av1qsvd-why.txt` sidecars explaining skips
    #[serde(default = "default_write_why_sidecars")]
    pub write_why_sidecars: bool,
}

fn default_scan_interval_sec() -> u64 {
    60
}

fn default_stability_wait_secs() -> u64 {
    10
}

fn default_write_why_sidecars() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            library_roots: Vec::new(),
            scan_interval_sec: default_scan_interval_sec(),
            stability_wait_secs: default_stability_wait_secs(),
            write_why_sidecars: default_write_why_sidecars(),
        }
    }
}

/// Admission and size-gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatesConfig {
    /// Size floor in bytes; files at or below it are rejected
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
    /// Maximum output/original size ratio in (0, 1]
    #[serde(default = "default_max_size_ratio")]
    pub max_size_ratio: f64,
}

fn default_min_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_max_size_ratio() -> f64 {
    0.90
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            min_bytes: default_min_bytes(),
            max_size_ratio: default_max_size_ratio(),
        }
    }
}

/// Encoder-side policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    /// Language tags whose audio and subtitle tracks are dropped from the output
    #[serde(default = "default_strip_languages")]
    pub strip_languages: Vec<String>,
}

fn default_strip_languages() -> Vec<String> {
    vec!["rus".to_string(), "ru".to_string()]
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            strip_languages: default_strip_languages(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - AV1QSVD_JOB_STATE_DIR -> paths.job_state_dir
    /// - AV1QSVD_MIN_BYTES -> gates.min_bytes
    /// - AV1QSVD_MAX_SIZE_RATIO -> gates.max_size_ratio
    /// - AV1QSVD_SCAN_INTERVAL_SEC -> scan.scan_interval_sec
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("AV1QSVD_JOB_STATE_DIR") {
            if !val.is_empty() {
                self.paths.job_state_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("AV1QSVD_MIN_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.gates.min_bytes = bytes;
            }
        }

        if let Ok(val) = env::var("AV1QSVD_MAX_SIZE_RATIO") {
            if let Ok(ratio) = val.parse::<f64>() {
                self.gates.max_size_ratio = ratio;
            }
        }

        if let Ok(val) = env::var("AV1QSVD_SCAN_INTERVAL_SEC") {
            if let Ok(secs) = val.parse::<u64>() {
                self.scan.scan_interval_sec = secs;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}
