//! Probe module for collecting stream and format metadata via ffprobe.
//!
//! Runs the external prober on a media file and parses its JSON output into
//! a [`ProbeResult`], deriving the has-video / already-AV1 flags and the main
//! video stream selection used by the rest of the pipeline.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe binary is not present at the expected location.
    #[error("ffprobe not found at {0}")]
    BinaryMissing(PathBuf),

    /// ffprobe command failed to execute or exited non-zero.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Integer field that ffprobe emits as a JSON number, a numeric string, or null.
///
/// Null, absent, and empty-string values all normalize to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlexInt(pub i64);

impl FlexInt {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for FlexInt {
    fn from(v: i64) -> Self {
        FlexInt(v)
    }
}

impl<'de> Deserialize<'de> for FlexInt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FlexIntVisitor;

        impl<'de> Visitor<'de> for FlexIntVisitor {
            type Value = FlexInt;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer, a numeric string, or null")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FlexInt, E> {
                Ok(FlexInt(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FlexInt, E> {
                Ok(FlexInt(v as i64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FlexInt, E> {
                Ok(FlexInt(v as i64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FlexInt, E> {
                if v.is_empty() {
                    return Ok(FlexInt(0));
                }
                // Some builds emit integers as "25000000.0"
                v.parse::<i64>()
                    .or_else(|_| v.parse::<f64>().map(|f| f as i64))
                    .map(FlexInt)
                    .map_err(|_| E::custom(format!("invalid integer value {:?}", v)))
            }

            fn visit_unit<E: de::Error>(self) -> Result<FlexInt, E> {
                Ok(FlexInt(0))
            }

            fn visit_none<E: de::Error>(self) -> Result<FlexInt, E> {
                Ok(FlexInt(0))
            }

            fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<FlexInt, D2::Error> {
                d.deserialize_any(FlexIntVisitor)
            }
        }

        deserializer.deserialize_any(FlexIntVisitor)
    }
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FormatInfo {
    /// Container format name, e.g. "matroska,webm" or "mov,mp4,m4a,3gp,3g2,mj2".
    #[serde(default)]
    pub format_name: String,
    /// Duration in seconds as reported by the container (string form).
    #[serde(default)]
    pub duration: String,
    /// Total container size in bytes.
    #[serde(default)]
    pub size: FlexInt,
    /// Total container bitrate in bits per second.
    #[serde(default)]
    pub bit_rate: FlexInt,
    /// Container tags (muxing_app, writing_library, ...).
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl FormatInfo {
    /// Container duration in seconds, zero when unparseable.
    pub fn duration_secs(&self) -> f64 {
        self.duration.parse::<f64>().unwrap_or(0.0)
    }

    /// Case-insensitive lookup in the container tag map.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Stream-level metadata from ffprobe.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StreamInfo {
    #[serde(default)]
    pub index: FlexInt,
    #[serde(default)]
    pub codec_name: String,
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub width: FlexInt,
    #[serde(default)]
    pub height: FlexInt,
    #[serde(default)]
    pub avg_frame_rate: String,
    #[serde(default)]
    pub r_frame_rate: String,
    #[serde(default, rename = "bits_per_raw_sample")]
    pub bit_depth: FlexInt,
    #[serde(default)]
    pub bit_rate: FlexInt,
    #[serde(default)]
    pub disposition: HashMap<String, i64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl StreamInfo {
    pub fn is_video(&self) -> bool {
        self.codec_type == "video"
    }

    pub fn is_audio(&self) -> bool {
        self.codec_type == "audio"
    }

    pub fn is_subtitle(&self) -> bool {
        self.codec_type == "subtitle"
    }

    /// Average frame rate in frames per second, parsed from the "num/den"
    /// rational form ffprobe uses. None when absent or malformed.
    pub fn fps(&self) -> Option<f64> {
        parse_frame_rate(&self.avg_frame_rate).or_else(|| parse_frame_rate(&self.r_frame_rate))
    }
}

/// Parse a frame rate string of the form "24000/1001" or "25".
fn parse_frame_rate(s: &str) -> Option<f64> {
    if s.is_empty() || s == "0/0" {
        return None;
    }
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den > 0.0 && num > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => s.parse::<f64>().ok().filter(|f| *f > 0.0),
    }
}

/// Result of probing a media file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// Parsed format block.
    pub format: FormatInfo,
    /// All streams in container order.
    pub streams: Vec<StreamInfo>,
    /// Whether any video stream is present.
    pub has_video: bool,
    /// Whether the main video stream is already AV1.
    pub has_av1: bool,
    /// The main video stream: default disposition wins, else the first video stream.
    pub main_video: Option<StreamInfo>,
}

impl ProbeResult {
    pub fn audio_stream_count(&self) -> usize {
        self.streams.iter().filter(|s| s.is_audio()).count()
    }

    pub fn subtitle_stream_count(&self) -> usize {
        self.streams.iter().filter(|s| s.is_subtitle()).count()
    }

    /// Position of the main video stream among the video streams, for `-map 0:v:N`.
    pub fn main_video_position(&self) -> Option<usize> {
        let main = self.main_video.as_ref()?;
        self.streams
            .iter()
            .filter(|s| s.is_video())
            .position(|s| s.index == main.index)
    }
}

#[derive(Debug, Deserialize)]
struct RawProbeOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
    format: Option<FormatInfo>,
}

/// Parses ffprobe JSON output into a ProbeResult, deriving the
/// has-video/has-AV1 flags and the main video stream.
pub fn parse_probe_output(json_str: &str) -> Result<ProbeResult, ProbeError> {
    let raw: RawProbeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let format = raw.format.ok_or_else(|| {
        ProbeError::ParseError("missing format block in ffprobe output".to_string())
    })?;

    let streams = raw.streams;
    let has_video = streams.iter().any(|s| s.is_video());

    let main_video = streams
        .iter()
        .filter(|s| s.is_video())
        .find(|s| s.disposition.get("default").copied() == Some(1))
        .or_else(|| streams.iter().find(|s| s.is_video()))
        .cloned();

    let has_av1 = main_video
        .as_ref()
        .map(|s| s.codec_name.eq_ignore_ascii_case("av1"))
        .unwrap_or(false);

    Ok(ProbeResult {
        format,
        streams,
        has_video,
        has_av1,
        main_video,
    })
}

/// Probes a media file with the ffprobe binary at `ffprobe_bin`.
///
/// Runs `ffprobe -hide_banner -v quiet -print_format json -show_streams
/// -show_format <path>` and parses the JSON output.
pub fn probe_file(ffprobe_bin: &Path, path: &Path) -> Result<ProbeResult, ProbeError> {
    if !ffprobe_bin.exists() {
        return Err(ProbeError::BinaryMissing(ffprobe_bin.to_path_buf()));
    }

    let output = Command::new(ffprobe_bin)
        .args([
            "-hide_banner",
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_probe_output_basic() {
        let json = r#"{
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "hevc",
                    "width": 1920,
                    "height": 1080,
                    "avg_frame_rate": "24000/1001",
                    "r_frame_rate": "24000/1001",
                    "bits_per_raw_sample": "10",
                    "bit_rate": "25000000",
                    "disposition": {"default": 1}
                },
                {
                    "index": 1,
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "tags": {"language": "eng"}
                },
                {
                    "index": 2,
                    "codec_type": "subtitle",
                    "codec_name": "subrip"
                }
            ],
            "format": {
                "format_name": "matroska,webm",
                "duration": "7200.5",
                "size": "22548578304",
                "bit_rate": "25052864",
                "tags": {"muxing_app": "libebml v1.4.2 + libmatroska v1.6.4"}
            }
        }"#;

        let result = parse_probe_output(json).expect("Should parse valid JSON");

        assert!(result.has_video);
        assert!(!result.has_av1);
        assert_eq!(result.audio_stream_count(), 1);
        assert_eq!(result.subtitle_stream_count(), 1);

        let main = result.main_video.as_ref().expect("main video selected");
        assert_eq!(main.codec_name, "hevc");
        assert_eq!(main.width.value(), 1920);
        assert_eq!(main.height.value(), 1080);
        assert_eq!(main.bit_depth.value(), 10);
        assert!((main.fps().unwrap() - 23.976).abs() < 0.01);

        assert_eq!(result.format.size.value(), 22548578304);
        assert!((result.format.duration_secs() - 7200.5).abs() < 0.001);
        assert!(result.format.tag("muxing_app").unwrap().contains("libmatroska"));
    }

    // ffprobe builds disagree on whether numeric fields are numbers or
    // strings; both shapes must parse, and null becomes zero.
    #[test]
    fn test_parse_probe_output_mixed_numeric_shapes() {
        let json = r#"{
            "streams": [
                {
                    "index": "0",
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": "1920",
                    "height": 1080,
                    "bits_per_raw_sample": null,
                    "bit_rate": 4500000
                }
            ],
            "format": {
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "100.0",
                "size": 1000000,
                "bit_rate": null
            }
        }"#;

        let result = parse_probe_output(json).expect("Should parse mixed-shape payload");
        let main = result.main_video.as_ref().unwrap();

        assert_eq!(main.index.value(), 0);
        assert_eq!(main.width.value(), 1920);
        assert_eq!(main.height.value(), 1080);
        assert_eq!(main.bit_depth.value(), 0); // null -> 0
        assert_eq!(main.bit_rate.value(), 4500000);
        assert_eq!(result.format.size.value(), 1000000);
        assert_eq!(result.format.bit_rate.value(), 0); // null -> 0
    }

    #[test]
    fn test_parse_probe_output_no_streams() {
        let json = r#"{
            "streams": [],
            "format": {"format_name": "matroska,webm", "duration": "10.0", "size": "1000"}
        }"#;

        let result = parse_probe_output(json).expect("Should parse JSON with no streams");
        assert!(!result.has_video);
        assert!(!result.has_av1);
        assert!(result.main_video.is_none());
    }

    #[test]
    fn test_parse_probe_output_missing_format_is_error() {
        let json = r#"{"streams": []}"#;
        let err = parse_probe_output(json).unwrap_err();
        assert!(matches!(err, ProbeError::ParseError(_)));
    }

    #[test]
    fn test_main_video_prefers_default_disposition() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "mjpeg",
                 "disposition": {"default": 0, "attached_pic": 1}},
                {"index": 1, "codec_type": "video", "codec_name": "hevc",
                 "disposition": {"default": 1}}
            ],
            "format": {"format_name": "matroska,webm"}
        }"#;

        let result = parse_probe_output(json).unwrap();
        assert_eq!(result.main_video.as_ref().unwrap().codec_name, "hevc");
        // hevc is the second video stream in container order
        assert_eq!(result.main_video_position(), Some(1));
    }

    #[test]
    fn test_main_video_falls_back_to_first_video() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "audio", "codec_name": "aac"},
                {"index": 1, "codec_type": "video", "codec_name": "h264"},
                {"index": 2, "codec_type": "video", "codec_name": "hevc"}
            ],
            "format": {"format_name": "matroska,webm"}
        }"#;

        let result = parse_probe_output(json).unwrap();
        assert_eq!(result.main_video.as_ref().unwrap().codec_name, "h264");
        assert_eq!(result.main_video_position(), Some(0));
    }

    #[test]
    fn test_has_av1_from_main_video() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "av1"}
            ],
            "format": {"format_name": "matroska,webm"}
        }"#;

        let result = parse_probe_output(json).unwrap();
        assert!(result.has_av1);
    }

    #[test]
    fn test_parse_frame_rate_forms() {
        assert!((parse_frame_rate("24000/1001").unwrap() - 23.976).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate(""), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_probe_file_missing_binary() {
        let err = probe_file(
            Path::new("/nonexistent/ffprobe"),
            Path::new("/media/movie.mkv"),
        )
        .unwrap_err();
        assert!(matches!(err, ProbeError::BinaryMissing(_)));
    }

    // FlexInt accepts every shape ffprobe has been observed to emit.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_flexint_number_and_string_agree(v in -1_000_000_000i64..1_000_000_000) {
            let from_number: FlexInt =
                serde_json::from_str(&v.to_string()).expect("number form");
            let from_string: FlexInt =
                serde_json::from_str(&format!("\"{}\"", v)).expect("string form");

            prop_assert_eq!(from_number, from_string);
            prop_assert_eq!(from_number.value(), v);
        }

        #[test]
        fn prop_flexint_null_is_zero(_n in 0u8..1) {
            let parsed: FlexInt = serde_json::from_str("null").expect("null form");
            prop_assert_eq!(parsed.value(), 0);
        }
    }
}
