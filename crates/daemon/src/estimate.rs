//! Output size estimation from bitrate analysis.
//!
//! Predicts the AV1 output size for the dashboard before the encode runs.
//! Informational only: the size gate judges the real output, never this.

use crate::probe::ProbeResult;

/// Assumed AV1 bits per pixel per frame for each quality tier.
fn bits_per_pixel_per_frame(quality: u32) -> f64 {
    match quality {
        23 => 0.15,
        24 => 0.12,
        25 => 0.10,
        _ => 0.12,
    }
}

/// Estimate the output size in bytes for a source at the given quality.
///
/// Splits the container bitrate into video and copied-stream shares, scales
/// the video share by the expected AV1 bitrate, and adds ~2% container
/// overhead. Returns 0 when the probe lacks the numbers to estimate from;
/// never exceeds 95% of the original.
pub fn estimate_output_size(original_bytes: u64, probe: &ProbeResult, quality: u32) -> u64 {
    let Some(main) = probe.main_video.as_ref() else {
        return 0;
    };

    let duration = probe.format.duration_secs();
    let total_bitrate = probe.format.bit_rate.value() as f64;
    if duration <= 0.0 || total_bitrate <= 0.0 {
        return 0;
    }

    // Video bitrate: container total minus parseable audio/subtitle rates.
    let mut video_bitrate = total_bitrate;
    for stream in &probe.streams {
        if (stream.is_audio() || stream.is_subtitle()) && stream.bit_rate.value() > 0 {
            video_bitrate -= stream.bit_rate.value() as f64;
        }
    }
    // When stream rates were unparseable, assume ~5% overhead for them.
    if video_bitrate >= total_bitrate * 0.95 {
        video_bitrate = total_bitrate * 0.95;
    }

    let pixels = main.width.value() as f64 * main.height.value() as f64;
    if pixels <= 0.0 {
        return 0;
    }
    let fps = main.fps().unwrap_or(24.0);

    let estimated_av1_bitrate = pixels * bits_per_pixel_per_frame(quality) * fps;
    let compression_ratio = estimated_av1_bitrate / video_bitrate;

    let original_video_bytes = original_bytes as f64 * (video_bitrate / total_bitrate);
    let estimated_video_bytes = original_video_bytes * compression_ratio;

    // Audio and subtitles are copied unchanged.
    let copied_bytes = original_bytes as f64 - original_video_bytes;

    let mut estimated_total = (estimated_video_bytes + copied_bytes) * 1.02;

    if estimated_total <= 0.0 {
        return 0;
    }
    if estimated_total > original_bytes as f64 {
        estimated_total = original_bytes as f64 * 0.95;
    }

    estimated_total as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::parse_probe_output;

    fn probe_1080p(total_bitrate: u64, audio_bitrate: u64) -> ProbeResult {
        let json = format!(
            r#"{{
            "streams": [
                {{"index": 0, "codec_type": "video", "codec_name": "h264",
                 "width": 1920, "height": 1080,
                 "avg_frame_rate": "24000/1001", "r_frame_rate": "24000/1001"}},
                {{"index": 1, "codec_type": "audio", "codec_name": "ac3",
                 "bit_rate": "{}"}}
            ],
            "format": {{"format_name": "matroska,webm", "duration": "7200.0",
                       "size": "0", "bit_rate": "{}"}}
        }}"#,
            audio_bitrate, total_bitrate
        );
        parse_probe_output(&json).unwrap()
    }

    #[test]
    fn test_estimate_is_below_original_for_high_bitrate_source() {
        // 25 Mbps 1080p source: AV1 at quality 24 should land well below it.
        let probe = probe_1080p(25_000_000, 640_000);
        let original = 22_000_000_000u64;

        let estimate = estimate_output_size(original, &probe, 24);

        assert!(estimate > 0);
        assert!(estimate < original);
    }

    #[test]
    fn test_estimate_capped_at_95_percent() {
        // A source already thinner than the AV1 target estimates above the
        // original; the cap keeps the prediction conservative.
        let probe = probe_1080p(2_000_000, 640_000);
        let original = 2_000_000_000u64;

        let estimate = estimate_output_size(original, &probe, 24);

        assert!(estimate <= (original as f64 * 0.95) as u64);
    }

    #[test]
    fn test_estimate_zero_without_bitrate() {
        let probe = probe_1080p(0, 0);
        assert_eq!(estimate_output_size(5_000_000_000, &probe, 24), 0);
    }

    #[test]
    fn test_estimate_zero_without_video_stream() {
        let json = r#"{
            "streams": [{"index": 0, "codec_type": "audio", "codec_name": "flac"}],
            "format": {"format_name": "flac", "duration": "300.0", "bit_rate": "900000"}
        }"#;
        let probe = parse_probe_output(json).unwrap();
        assert_eq!(estimate_output_size(30_000_000, &probe, 25), 0);
    }

    #[test]
    fn test_higher_quality_tier_estimates_larger() {
        let probe = probe_1080p(25_000_000, 640_000);
        let original = 22_000_000_000u64;

        let at_23 = estimate_output_size(original, &probe, 23);
        let at_25 = estimate_output_size(original, &probe, 25);

        assert!(at_23 > at_25);
    }
}
