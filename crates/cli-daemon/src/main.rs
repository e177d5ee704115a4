//! CLI entry point for the av1qsvd transcoding daemon.

use av1qsvd::{Config, Daemon};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// av1qsvd - re-encodes media libraries to AV1 on Intel QSV hardware
#[derive(Parser, Debug)]
#[command(name = "av1d")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/av1qsvd/config.toml")]
    config: PathBuf,

    /// Run a single scan-and-drain pass instead of looping
    #[arg(long, default_value = "false")]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // A missing config file falls back to defaults; a file that exists but
    // does not parse is a fatal startup error.
    let config = if args.config.exists() {
        match Config::load(&args.config) {
            Ok(config) => config,
            Err(e) => {
                log::error!("failed to load config from {:?}: {}", args.config, e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        log::warn!("config file {:?} not found, using defaults", args.config);
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    log::info!("job state dir: {:?}", config.paths.job_state_dir);
    log::info!("library roots configured: {}", config.scan.library_roots.len());
    for root in &config.scan.library_roots {
        log::info!("  {}", root.display());
    }

    let daemon = match Daemon::new(config) {
        Ok(daemon) => daemon,
        Err(e) => {
            log::error!("failed to initialize daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.once {
        let summary = daemon.run_once().await;
        log::info!(
            "pass complete: {} admitted, {} rejected, {} executed",
            summary.scan.admitted,
            summary.scan.rejected,
            summary.executed
        );
    } else {
        daemon.run().await;
    }

    ExitCode::SUCCESS
}
