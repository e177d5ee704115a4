//! Encoder integration: ffmpeg argument construction and execution.

mod ffmpeg;

pub use ffmpeg::{
    build_transcode_args, distill_stderr, quality_for_height, run_transcode, EncodeError,
    HwDevice,
};
