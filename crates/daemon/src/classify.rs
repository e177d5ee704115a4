//! Classifier module for deciding whether a source is web-like or disc-like.
//!
//! Web rips need timestamp-repair flags that are wrong for clean disc remuxes,
//! so the decision selects the encoder argument profile. Each signal is a row
//! in a table (weight + predicate); the accumulated score and the ordered list
//! of fired reasons are persisted per job and to a sidecar for auditing.

use crate::probe::ProbeResult;
use crate::sidecar;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Classification of video source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    /// Web-sourced content (streaming rips, web downloads).
    WebLike,
    /// Disc-sourced content (Blu-ray remuxes and rips).
    DiscLike,
    /// Neither side of the threshold; treated as web-like downstream.
    Unknown,
}

impl Default for SourceClass {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for SourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceClass::WebLike => write!(f, "web_like"),
            SourceClass::DiscLike => write!(f, "disc_like"),
            SourceClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// The classifier's output: final class, cumulative score, fired reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDecision {
    pub class: SourceClass,
    pub score: f64,
    pub reasons: Vec<String>,
}

impl SourceDecision {
    /// Whether downstream consumers should apply the web-safe encoder flags.
    ///
    /// Unknown coerces to web-like: the web-safe flags are a superset that
    /// stays correct for disc content at a small cost.
    pub fn is_web_like(&self) -> bool {
        matches!(self.class, SourceClass::WebLike | SourceClass::Unknown)
    }
}

/// Score at or above which a file is WebLike.
const WEB_THRESHOLD: f64 = 2.0;
/// Score at or below which a file is DiscLike.
const DISC_THRESHOLD: f64 = -2.0;
/// Score applied by the `.websafe` / `.nowebsafe` operator overrides.
const OVERRIDE_SCORE: f64 = 10.0;

/// Release-name tokens that lean web.
const WEB_NAME_TOKENS: &[&str] = &[
    "web-dl", "webrip", "webhd", "webdl", "nf", "amzn", "dsnp", "hmax", "hulu", "atvp", "disney",
    "appletv",
];

/// Release-name tokens that lean disc.
const DISC_NAME_TOKENS: &[&str] = &[
    "bluray", "bdrip", "brrip", "remux", "uhd", "bd25", "bd50", "blu-ray", "bd-remux", "bdr",
];

/// Muxer names (in format tags) that lean web.
const WEB_MUXERS: &[&str] = &["shaka-packager", "libwebm", "applehttp", "dash", "hls", "ffmpeg"];

/// Muxer names (in format tags) that lean disc.
const DISC_MUXERS: &[&str] = &["mkvmerge", "libmatroska", "makemkv", "tsmuxer"];

const WEIGHT_FILENAME_WEB: f64 = 3.0;
const WEIGHT_FILENAME_DISC: f64 = -4.0;
const WEIGHT_DIRECTORY_WEB: f64 = 1.0;
const WEIGHT_DIRECTORY_DISC: f64 = -2.0;
const WEIGHT_EXT_WEB: f64 = 2.0;
const WEIGHT_EXT_MKV: f64 = -1.0;
const WEIGHT_FORMAT_WEB: f64 = 2.5;
const WEIGHT_FORMAT_MATROSKA: f64 = -1.5;
const WEIGHT_MUXER_WEB: f64 = 3.0;
const WEIGHT_MUXER_DISC: f64 = -3.0;
const WEIGHT_VFR: f64 = 2.5;
const WEIGHT_ODD_DIMENSION: f64 = 1.5;
const WEIGHT_ASPECT: f64 = 0.5;
const WEIGHT_BPP_LOW: f64 = 1.0;
const WEIGHT_BPP_HIGH: f64 = -1.0;

/// Inputs shared by every signal predicate.
struct SignalCtx<'a> {
    /// Lowercased file name (with extension).
    file_name: String,
    /// Lowercased parent directory path.
    dir_name: String,
    /// Lowercased extension without the dot.
    extension: String,
    probe: &'a ProbeResult,
    /// Matroska guard: disc remuxes are delivered in Matroska and
    /// legitimately carry VFR and odd dimensions.
    is_matroska: bool,
}

/// A fired signal: signed weight plus a human-readable reason.
type Fired = (f64, String);

/// One row of the signal table.
type Signal = fn(&SignalCtx) -> Vec<Fired>;

/// The signal table. Adding a signal is one row plus a predicate.
const SIGNALS: &[Signal] = &[
    filename_tokens,
    directory_tokens,
    extension_signal,
    container_signal,
    muxer_tag_signal,
    vfr_signal,
    odd_dimension_signal,
    aspect_ratio_signal,
    bits_per_pixel_signal,
];

/// Classifies a media file as web-like, disc-like, or unknown.
///
/// Operator overrides (`.websafe` / `.nowebsafe` siblings) short-circuit the
/// signal table. Apart from those two existence checks, the decision is a
/// pure function of the path and the probe result.
pub fn classify_source(path: &Path, probe: &ProbeResult) -> SourceDecision {
    if sidecar::websafe_path(path).exists() {
        return SourceDecision {
            class: SourceClass::WebLike,
            score: OVERRIDE_SCORE,
            reasons: vec![format!(".websafe override present ({})", fmt_weight(OVERRIDE_SCORE))],
        };
    }
    if sidecar::nowebsafe_path(path).exists() {
        return SourceDecision {
            class: SourceClass::DiscLike,
            score: -OVERRIDE_SCORE,
            reasons: vec![format!(
                ".nowebsafe override present ({})",
                fmt_weight(-OVERRIDE_SCORE)
            )],
        };
    }

    let ctx = SignalCtx {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
        dir_name: path
            .parent()
            .map(|p| p.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
        probe,
        is_matroska: probe.format.format_name.to_lowercase().contains("matroska"),
    };

    let mut score = 0.0;
    let mut reasons = Vec::new();
    for signal in SIGNALS {
        for (weight, reason) in signal(&ctx) {
            score += weight;
            reasons.push(reason);
        }
    }

    let class = if score >= WEB_THRESHOLD {
        SourceClass::WebLike
    } else if score <= DISC_THRESHOLD {
        SourceClass::DiscLike
    } else {
        SourceClass::Unknown
    };

    SourceDecision { class, score, reasons }
}

/// Format a weight as a signed reason suffix: +3, -4, +2.5.
fn fmt_weight(w: f64) -> String {
    if w.fract() == 0.0 {
        format!("{:+.0}", w)
    } else {
        format!("{:+.1}", w)
    }
}

fn filename_tokens(ctx: &SignalCtx) -> Vec<Fired> {
    let mut fired = Vec::new();
    for token in WEB_NAME_TOKENS {
        if ctx.file_name.contains(token) {
            fired.push((
                WEIGHT_FILENAME_WEB,
                format!("filename token '{}' ({})", token, fmt_weight(WEIGHT_FILENAME_WEB)),
            ));
        }
    }
    for token in DISC_NAME_TOKENS {
        if ctx.file_name.contains(token) {
            fired.push((
                WEIGHT_FILENAME_DISC,
                format!("filename token '{}' ({})", token, fmt_weight(WEIGHT_FILENAME_DISC)),
            ));
        }
    }
    fired
}

fn directory_tokens(ctx: &SignalCtx) -> Vec<Fired> {
    let mut fired = Vec::new();
    for token in WEB_NAME_TOKENS {
        if ctx.dir_name.contains(token) {
            fired.push((
                WEIGHT_DIRECTORY_WEB,
                format!("directory token '{}' ({})", token, fmt_weight(WEIGHT_DIRECTORY_WEB)),
            ));
        }
    }
    for token in DISC_NAME_TOKENS {
        if ctx.dir_name.contains(token) {
            fired.push((
                WEIGHT_DIRECTORY_DISC,
                format!("directory token '{}' ({})", token, fmt_weight(WEIGHT_DIRECTORY_DISC)),
            ));
        }
    }
    fired
}

fn extension_signal(ctx: &SignalCtx) -> Vec<Fired> {
    match ctx.extension.as_str() {
        "mp4" | "mov" | "webm" => vec![(
            WEIGHT_EXT_WEB,
            format!("extension .{} ({})", ctx.extension, fmt_weight(WEIGHT_EXT_WEB)),
        )],
        "mkv" => vec![(
            WEIGHT_EXT_MKV,
            format!("extension .mkv ({})", fmt_weight(WEIGHT_EXT_MKV)),
        )],
        _ => Vec::new(),
    }
}

fn container_signal(ctx: &SignalCtx) -> Vec<Fired> {
    let format_name = ctx.probe.format.format_name.to_lowercase();
    if format_name.is_empty() {
        return Vec::new();
    }
    // ffprobe reports "matroska,webm" for both; check matroska first so a
    // plain mkv never counts as webm.
    if format_name.contains("matroska") {
        return vec![(
            WEIGHT_FORMAT_MATROSKA,
            format!("container is matroska ({})", fmt_weight(WEIGHT_FORMAT_MATROSKA)),
        )];
    }
    if format_name.contains("mp4") || format_name.contains("mov") || format_name.contains("webm") {
        return vec![(
            WEIGHT_FORMAT_WEB,
            format!(
                "container format '{}' is mp4/mov/webm family ({})",
                format_name,
                fmt_weight(WEIGHT_FORMAT_WEB)
            ),
        )];
    }
    Vec::new()
}

fn muxer_tag_signal(ctx: &SignalCtx) -> Vec<Fired> {
    let mut fired = Vec::new();
    for tag_key in ["muxing_app", "writing_library"] {
        let Some(value) = ctx.probe.format.tag(tag_key) else {
            continue;
        };
        let value_lower = value.to_lowercase();
        for muxer in WEB_MUXERS {
            if value_lower.contains(muxer) {
                fired.push((
                    WEIGHT_MUXER_WEB,
                    format!("{} contains '{}' ({})", tag_key, muxer, fmt_weight(WEIGHT_MUXER_WEB)),
                ));
            }
        }
        for muxer in DISC_MUXERS {
            if value_lower.contains(muxer) {
                fired.push((
                    WEIGHT_MUXER_DISC,
                    format!("{} contains '{}' ({})", tag_key, muxer, fmt_weight(WEIGHT_MUXER_DISC)),
                ));
            }
        }
    }
    fired
}

fn vfr_signal(ctx: &SignalCtx) -> Vec<Fired> {
    if ctx.is_matroska {
        return Vec::new();
    }
    let vfr = ctx.probe.streams.iter().any(|s| {
        s.is_video()
            && !s.avg_frame_rate.is_empty()
            && !s.r_frame_rate.is_empty()
            && s.avg_frame_rate != s.r_frame_rate
    });
    if vfr {
        vec![(
            WEIGHT_VFR,
            format!("variable frame rate outside matroska ({})", fmt_weight(WEIGHT_VFR)),
        )]
    } else {
        Vec::new()
    }
}

fn odd_dimension_signal(ctx: &SignalCtx) -> Vec<Fired> {
    if ctx.is_matroska {
        return Vec::new();
    }
    let mut fired = Vec::new();
    let odd_width = ctx
        .probe
        .streams
        .iter()
        .any(|s| s.is_video() && s.width.value() > 0 && s.width.value() % 2 != 0);
    let odd_height = ctx
        .probe
        .streams
        .iter()
        .any(|s| s.is_video() && s.height.value() > 0 && s.height.value() % 2 != 0);
    if odd_width {
        fired.push((
            WEIGHT_ODD_DIMENSION,
            format!("odd width outside matroska ({})", fmt_weight(WEIGHT_ODD_DIMENSION)),
        ));
    }
    if odd_height {
        fired.push((
            WEIGHT_ODD_DIMENSION,
            format!("odd height outside matroska ({})", fmt_weight(WEIGHT_ODD_DIMENSION)),
        ));
    }
    fired
}

fn aspect_ratio_signal(ctx: &SignalCtx) -> Vec<Fired> {
    let Some(main) = ctx.probe.main_video.as_ref() else {
        return Vec::new();
    };
    let (w, h) = (main.width.value() as f64, main.height.value() as f64);
    if w <= 0.0 || h <= 0.0 {
        return Vec::new();
    }
    let aspect = w / h;
    if !(1.3..=2.5).contains(&aspect) {
        vec![(
            WEIGHT_ASPECT,
            format!("aspect ratio {:.2} outside [1.3, 2.5] ({})", aspect, fmt_weight(WEIGHT_ASPECT)),
        )]
    } else {
        Vec::new()
    }
}

fn bits_per_pixel_signal(ctx: &SignalCtx) -> Vec<Fired> {
    let Some(main) = ctx.probe.main_video.as_ref() else {
        return Vec::new();
    };
    let (w, h) = (main.width.value() as f64, main.height.value() as f64);
    if h < 1080.0 || w <= 0.0 {
        return Vec::new();
    }

    // Stream bitrate when ffprobe reports it, container bitrate otherwise.
    let bitrate = if main.bit_rate.value() > 0 {
        main.bit_rate.value() as f64
    } else {
        ctx.probe.format.bit_rate.value() as f64
    };
    let Some(fps) = main.fps() else {
        return Vec::new();
    };
    if bitrate <= 0.0 || fps <= 0.0 {
        return Vec::new();
    }

    let bpp = bitrate / (w * h * fps);
    if bpp < 0.1 {
        vec![(
            WEIGHT_BPP_LOW,
            format!("bits per pixel {:.3} below 0.1 at >=1080p ({})", bpp, fmt_weight(WEIGHT_BPP_LOW)),
        )]
    } else if bpp > 0.3 {
        vec![(
            WEIGHT_BPP_HIGH,
            format!("bits per pixel {:.3} above 0.3 at >=1080p ({})", bpp, fmt_weight(WEIGHT_BPP_HIGH)),
        )]
    } else {
        Vec::new()
    }
}
