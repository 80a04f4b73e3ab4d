// SPDX-License-Identifier: GPL-3.0-only

use clap::Parser;
use clap::error::ErrorKind;
use gazecursor::config::Config;
use gazecursor::constants::DetectionMode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod cli;

#[derive(Parser)]
#[command(name = "gazecursor")]
#[command(about = "Move the pointer by tracking the face or eye in a camera stream")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Detection mode: 1 = Face Detection, 2 = Eye Detection
    #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
    mode: u8,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture device node, overriding the configuration
    #[arg(short, long)]
    device: Option<String>,

    /// Use the synthetic camera instead of a V4L2 device
    #[arg(long = "virtual")]
    virtual_device: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let config = Config::load(cli.config.as_deref());

    // Set RUST_LOG to override the configured level, e.g. RUST_LOG=gazecursor=trace
    let default_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(device) = cli.device {
        config.capture.device_path = device;
    }

    let Some(mode) = DetectionMode::from_arg(cli.mode) else {
        return ExitCode::FAILURE;
    };

    let options = cli::RunOptions {
        virtual_device: cli.virtual_device,
        duration: cli.duration.map(std::time::Duration::from_secs),
    };
    match cli::run(&config, mode, options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            ExitCode::FAILURE
        }
    }
}
