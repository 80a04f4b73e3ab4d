// SPDX-License-Identifier: GPL-3.0-only

//! Periodic tracking pipeline
//!
//! Every stage is a periodic task released by the scheduler. Frames travel
//! by reference; only short text messages are copied.
//!
//! ```text
//! ┌──────────┐  frames  ┌─────────────┐  FaceCenter:x,y  ┌──────────┐
//! │ capture  │ ───────▶ │  detection  │ ───────────────▶ │  cursor  │ ──▶ uinput
//! │ (pool)   │ ──┐      └─────────────┘                  └────┬─────┘
//! └──────────┘   │      ┌─────────────┐                       │ telemetry
//!                └────▶ │ compression │ ──▶ images/*.jpg      ▼
//!                       └─────────────┘                  ┌──────────┐
//!                                                        │ logging  │ ──▶ data_*.csv
//!                                                        └──────────┘
//! ```
//!
//! # Modules
//!
//! - [`capture`]: Device to distributor
//! - [`detection`]: Detector over the newest frame
//! - [`cursor`]: Calibration, smoothing and pointer output
//! - [`compression`]: JPEG snapshots
//! - [`csv_log`]: Telemetry CSV

pub mod actuator;
pub mod capture;
pub mod compression;
pub mod csv_log;
pub mod cursor;
pub mod detection;

pub use actuator::{Actuator, LoggingActuator, UinputActuator};
pub use capture::CaptureStage;
pub use compression::CompressionStage;
pub use csv_log::{CsvLogger, LoggingStage};
pub use cursor::{Calibration, CursorMapper, CursorStage};
pub use detection::DetectionStage;

use crate::backends::camera::{CaptureDevice, FrameBufferPool, FrameSource};
use crate::config::{Config, TaskSettings};
use crate::constants::DetectionMode;
use crate::errors::PipelineResult;
use crate::frame_processor::detector_for;
use crate::sched::{PeriodicTaskSpec, TaskScheduler, TimingReport};
use crate::transport::{ControlChannel, FrameDistributor};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Assembled pipeline: scheduler, stages and their shared resources
pub struct Pipeline {
    scheduler: TaskScheduler,
    pool: Arc<FrameBufferPool>,
    logger: Arc<Mutex<CsvLogger>>,
    mode: DetectionMode,
    stopped: bool,
}

impl Pipeline {
    /// Wire every stage and register it with a new scheduler
    ///
    /// Task threads are spawned here but stay parked until [`Pipeline::start`].
    pub fn build(
        config: &Config,
        mode: DetectionMode,
        device: Box<dyn CaptureDevice>,
    ) -> PipelineResult<Self> {
        let pool = FrameBufferPool::new(device)?;
        let format = pool.format();
        info!(format = %format, slots = pool.len(), mode = %mode, "Building pipeline");

        let mut distributor = FrameDistributor::new(config.transport.subscriber_hwm);
        let detection_frames = distributor.subscribe("detection");
        let compression_frames = config
            .output
            .image_dir
            .as_ref()
            .map(|_| distributor.subscribe("compression"));

        let (detections_tx, detections_rx) =
            ControlChannel::bounded("detections", config.transport.control_hwm);
        let (telemetry_tx, telemetry_rx) =
            ControlChannel::bounded("telemetry", config.transport.control_hwm);

        let calibration_path = config.cursor.calibration_dir.join(mode.calibration_file());
        let calibration = Calibration::load_or_default(&calibration_path);
        let mapper = CursorMapper::new(calibration, &config.cursor, format.width);
        let actuator = open_actuator(config);

        let logger = Arc::new(Mutex::new(CsvLogger::create(&config.output.csv_dir)?));

        let mut cursor = CursorStage::new(detections_rx, mapper, actuator, telemetry_tx);
        let mut capture = CaptureStage::new(FrameSource::new(Arc::clone(&pool)), distributor);
        let mut detection = DetectionStage::new(detection_frames, detector_for(mode), detections_tx);
        let mut logging = LoggingStage::new(telemetry_rx, Arc::clone(&logger));

        let mut compression = match (compression_frames, &config.output.image_dir) {
            (Some(frames), Some(dir)) => Some(CompressionStage::new(
                frames,
                dir.clone(),
                config.output.jpeg_quality,
            )?),
            _ => None,
        };

        let warm_up = config.scheduler.warm_up_activations;
        let spec = |name: &str, task: TaskSettings, work: Box<dyn FnMut() + Send>| {
            PeriodicTaskSpec::new(name, task.cpu, task.priority, task.period_ms, work)
                .map(|spec| spec.with_warm_up(warm_up))
        };

        let tasks = &config.tasks;
        let mut scheduler = TaskScheduler::new(config.max_sleep());
        scheduler.add_task(spec("cursor", tasks.cursor, Box::new(move || cursor.run_once()))?)?;
        scheduler.add_task(spec("capture", tasks.capture, Box::new(move || capture.run_once()))?)?;
        scheduler.add_task(spec(
            "detection",
            tasks.detection,
            Box::new(move || detection.run_once()),
        )?)?;
        if let Some(mut stage) = compression.take() {
            scheduler.add_task(spec(
                "compression",
                tasks.compression,
                Box::new(move || stage.run_once()),
            )?)?;
        } else {
            info!("No image directory configured, compression stage disabled");
        }
        scheduler.add_task(spec("logging", tasks.logging, Box::new(move || logging.run_once()))?)?;

        Ok(Self {
            scheduler,
            pool,
            logger,
            mode,
            stopped: false,
        })
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn pool(&self) -> &Arc<FrameBufferPool> {
        &self.pool
    }

    pub fn start(&mut self) -> PipelineResult<()> {
        self.scheduler.start()?;
        info!(mode = %self.mode, "Pipeline running");
        Ok(())
    }

    /// Stop every stage, flush the telemetry log and report timings
    ///
    /// Safe to call more than once; later calls return no reports.
    pub fn shutdown(&mut self) -> Vec<TimingReport> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;

        let reports = self.scheduler.stop();

        let mut logger = self.logger.lock();
        if let Err(e) = logger.flush() {
            warn!(path = %logger.path().display(), error = %e, "Failed to flush telemetry log");
        }
        info!(path = %logger.path().display(), rows = logger.rows(), "Telemetry log closed");
        drop(logger);

        let stats = self.pool.stats();
        info!(
            acquired = stats.acquired,
            reclaimed = stats.reclaimed,
            forced = stats.forced_reclaims,
            stale = stats.stale_releases,
            "Frame pool statistics"
        );
        reports
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// uinput pointer when enabled and available, otherwise a logging stand-in
fn open_actuator(config: &Config) -> Box<dyn Actuator> {
    let cursor = &config.cursor;
    if cursor.uinput {
        match UinputActuator::open(cursor.display_width, cursor.display_height) {
            Ok(actuator) => return Box::new(actuator),
            Err(e) => warn!(error = %e, "uinput unavailable, pointer positions will only be logged"),
        }
    }
    Box::new(LoggingActuator::default())
}
