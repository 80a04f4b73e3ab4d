// SPDX-License-Identifier: GPL-3.0-only

//! Run the tracking pipeline until interrupted

use gazecursor::backends::camera::open_device;
use gazecursor::config::Config;
use gazecursor::constants::{DetectionMode, SHUTDOWN_POLL_INTERVAL};
use gazecursor::errors::PipelineResult;
use gazecursor::pipelines::Pipeline;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

pub struct RunOptions {
    pub virtual_device: bool,
    pub duration: Option<Duration>,
}

/// Build the pipeline, run it until Ctrl+C or the optional duration, then
/// print the per-task timing reports
pub fn run(config: &Config, mode: DetectionMode, options: RunOptions) -> PipelineResult<()> {
    println!("Mode: {}", mode);

    let device = open_device(&config.capture, options.virtual_device)?;
    let mut pipeline = Pipeline::build(config, mode, device)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    pipeline.start()?;
    println!("Tracking... (press Ctrl+C to stop)");

    let start = Instant::now();
    while !stop_flag.load(Ordering::SeqCst) {
        if let Some(limit) = options.duration
            && start.elapsed() >= limit
        {
            info!(seconds = limit.as_secs(), "Run duration reached");
            break;
        }
        std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
    }

    println!();
    println!("Stopping...");
    let reports = pipeline.shutdown();
    for report in &reports {
        println!("{}", report);
    }
    Ok(())
}
