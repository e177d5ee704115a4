//! Configuration crate for the av1qsvd transcoding daemon

mod config;

pub use config::{
    Config, ConfigError, EncodeConfig, GatesConfig, PathsConfig, ScanConfig,
};
