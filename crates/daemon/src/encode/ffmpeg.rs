//! ffmpeg command construction and execution for AV1 QSV transcodes.
//!
//! Builds the full argument vector for one encode: hardware device setup,
//! stream mapping with language-based track removal, the even-dimension
//! filter chain, quality selection by height, and Matroska muxing. Runs the
//! command with stderr captured so failures produce a concise reason.

use crate::probe::ProbeResult;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Error type for encoding operations.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The probe result has no video stream to map.
    #[error("no video stream found in probe result")]
    NoVideoStream,

    /// ffmpeg exited non-zero; reason is distilled from stderr.
    #[error("ffmpeg exit code {code}: {reason}")]
    FfmpegFailed { code: i32, reason: String },

    /// ffmpeg was terminated by a signal.
    #[error("ffmpeg terminated by signal: {reason}")]
    Terminated { reason: String },

    /// IO error spawning ffmpeg.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hardware device initialization directives.
///
/// Intel Arc initializes QSV most reliably by deriving it from a VAAPI
/// device, so both directives are emitted and filters bind to the QSV one.
#[derive(Debug, Clone)]
pub struct HwDevice {
    /// `-init_hw_device` value for the VAAPI device, e.g. `vaapi=va:/dev/dri/renderD128`.
    pub vaapi_init: String,
    /// `-init_hw_device` value deriving QSV from the VAAPI device.
    pub qsv_init: String,
    /// `-filter_hw_device` binding.
    pub filter_device: String,
}

impl Default for HwDevice {
    fn default() -> Self {
        Self {
            vaapi_init: "vaapi=va".to_string(),
            qsv_init: "qsv=qsv@va".to_string(),
            filter_device: "qsv".to_string(),
        }
    }
}

impl HwDevice {
    /// Detect the render node and build the device directives, falling back
    /// to ffmpeg auto-detection when no node is found.
    pub fn detect() -> Self {
        match find_render_node() {
            Some(node) => Self {
                vaapi_init: format!("vaapi=va:{}", node.display()),
                ..Self::default()
            },
            None => Self::default(),
        }
    }
}

/// Find a DRI render node for VAAPI/QSV.
fn find_render_node() -> Option<PathBuf> {
    for candidate in ["/dev/dri/renderD128", "/dev/dri/renderD129", "/dev/dri/renderD130"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    let entries = std::fs::read_dir("/dev/dri").ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("renderD"))
                .unwrap_or(false)
        })
}

/// Quality constant for the encoder, chosen by source height.
///
/// The tiers compensate for AV1's growing perceptual cost at higher
/// resolutions while keeping bitrate reasonable at low resolutions.
pub fn quality_for_height(height: i64) -> u32 {
    if height >= 1440 {
        23
    } else if height >= 1080 {
        24
    } else {
        25
    }
}

/// Surface pixel format for the hardware upload, by source bit depth.
fn surface_format(bit_depth: i64) -> &'static str {
    if bit_depth >= 10 {
        "p010"
    } else {
        "nv12"
    }
}

/// Build the full ffmpeg argument vector for one transcode.
///
/// `is_web_like` selects the timestamp-repair input/output flags;
/// `strip_languages` lists language tags whose audio and subtitle tracks
/// are removed from the output.
pub fn build_transcode_args(
    input_path: &Path,
    output_path: &Path,
    probe: &ProbeResult,
    is_web_like: bool,
    strip_languages: &[String],
    hw: &HwDevice,
) -> Result<Vec<String>, EncodeError> {
    let main = probe.main_video.as_ref().ok_or(EncodeError::NoVideoStream)?;
    let video_pos = probe.main_video_position().ok_or(EncodeError::NoVideoStream)?;

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-analyzeduration".into(),
        "50M".into(),
        "-probesize".into(),
        "50M".into(),
        "-init_hw_device".into(),
        hw.vaapi_init.clone(),
        "-init_hw_device".into(),
        hw.qsv_init.clone(),
        "-filter_hw_device".into(),
        hw.filter_device.clone(),
    ];

    // Web rips often carry broken or sparse timestamps; regenerate them on
    // the way in.
    if is_web_like {
        args.extend([
            "-fflags".into(),
            "+genpts".into(),
            "-copyts".into(),
            "-start_at_zero".into(),
        ]);
    }

    args.extend(["-i".into(), input_path.to_string_lossy().into_owned()]);

    // Stream mapping: everything, minus all video and attachments, plus the
    // main video stream back in.
    args.extend([
        "-map".into(),
        "0".into(),
        "-map".into(),
        "-0:v".into(),
        "-map".into(),
        "-0:t".into(),
        "-map".into(),
        format!("0:v:{}", video_pos),
        "-map".into(),
        "0:a?".into(),
    ]);
    for lang in strip_languages {
        args.extend(["-map".into(), format!("-0:a:m:language:{}", lang)]);
    }
    args.extend(["-map".into(), "0:s?".into()]);
    for lang in strip_languages {
        args.extend(["-map".into(), format!("-0:s:m:language:{}", lang)]);
    }
    args.extend(["-map_chapters".into(), "0".into()]);

    // Even dimensions, square pixels, hardware surface upload.
    let filter_chain = format!(
        "pad=ceil(iw/2)*2:ceil(ih/2)*2,setsar=1,format={},hwupload",
        surface_format(main.bit_depth.value())
    );
    args.extend(["-vf:v:0".into(), filter_chain]);

    let quality = quality_for_height(main.height.value());
    args.extend([
        "-c:v:0".into(),
        "av1_qsv".into(),
        "-global_quality:v:0".into(),
        quality.to_string(),
        "-preset".into(),
        "veryslow".into(),
        "-look_ahead".into(),
        "1".into(),
    ]);

    if is_web_like {
        args.extend([
            "-vsync".into(),
            "0".into(),
            "-avoid_negative_ts".into(),
            "make_zero".into(),
        ]);
    }

    args.extend([
        "-c:a".into(),
        "copy".into(),
        "-c:s".into(),
        "copy".into(),
        "-max_muxing_queue_size".into(),
        "2048".into(),
        "-map_metadata".into(),
        "0".into(),
        "-f".into(),
        "matroska".into(),
        "-movflags".into(),
        "+faststart".into(),
    ]);

    args.push(output_path.to_string_lossy().into_owned());

    Ok(args)
}

/// Substrings marking ffmpeg progress lines, which never explain a failure.
const PROGRESS_MARKERS: &[&str] = &["frame=", "fps=", "bitrate=", "speed=", "time="];

/// Substrings that mark a stderr line as the likely cause of a failure.
const ERROR_KEYWORDS: &[&str] = &[
    "error", "failed", "invalid", "cannot", "unable", "not found", "no such",
    "permission denied", "vaapi", "qsv", "encoder", "decoder",
];

/// Maximum length of a distilled failure reason.
const MAX_REASON_LEN: usize = 400;

fn is_progress_line(line: &str) -> bool {
    PROGRESS_MARKERS.iter().any(|m| line.contains(m))
}

/// Distill a concise failure reason from ffmpeg stderr.
///
/// Prefers the most recent lines matching an error keyword; falls back to
/// the last non-progress lines. Truncated to a reason-field-sized string.
pub fn distill_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .rev()
        .take(50)
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_progress_line(l))
        .collect();

    let error_lines: Vec<&str> = lines
        .iter()
        .filter(|l| {
            let lower = l.to_lowercase();
            ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .copied()
        .take(3)
        .collect();

    // lines are in reverse order; restore recency order for reading
    let picked: Vec<&str> = if error_lines.is_empty() {
        lines.into_iter().take(3).rev().collect()
    } else {
        error_lines.into_iter().rev().collect()
    };

    let mut reason = picked.join(" | ");
    if reason.len() > MAX_REASON_LEN {
        reason.truncate(MAX_REASON_LEN);
        reason.push_str("...");
    }
    reason
}

/// Run the transcode and wait for it, capturing stderr.
///
/// Non-zero exit produces an `FfmpegFailed` with the distilled stderr tail;
/// the encoder runs unbounded.
pub fn run_transcode(ffmpeg_bin: &Path, args: &[String]) -> Result<(), EncodeError> {
    let output = Command::new(ffmpeg_bin).args(args).output()?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = distill_stderr(&stderr);

    match output.status.code() {
        Some(code) => Err(EncodeError::FfmpegFailed { code, reason }),
        None => Err(EncodeError::Terminated { reason }),
    }
}
