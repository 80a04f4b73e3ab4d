// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the tracking pipeline
//!
//! Startup failures (device, configuration, task construction) are fatal and
//! propagate to `main`. Runtime conditions such as an empty device queue or a
//! full subscriber are not errors and never appear here.

use crate::backends::camera::types::{DeviceError, StreamFormat};
use crate::config::ConfigError;
use crate::sched::SchedError;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Top-level error raised while assembling or running the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Capture device could not be opened, configured or mapped
    #[error("Capture device error: {0}")]
    Device(#[from] DeviceError),
    /// Configuration file could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A periodic task could not be constructed or started
    #[error("Scheduler error: {0}")]
    Sched(#[from] SchedError),
    /// Output directories or log files could not be created
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    /// Signal handler installation failed
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Errors produced while decoding a frame message on the receiving side
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Header part shorter or longer than the fixed header size
    #[error("Invalid metadata size: expected {expected} bytes, received {received}")]
    HeaderSize { expected: usize, received: usize },
    /// Payload byte count disagrees with the header's declared length
    #[error("Frame data size mismatch: expected {expected}, received {received}")]
    PayloadSize { expected: u64, received: u64 },
    /// Header declares a negative or zero dimension
    #[error("Invalid frame dimensions {width}x{height}")]
    Dimensions { width: i32, height: i32 },
    /// Declared image does not fit in the declared payload
    #[error("Frame {width}x{height} {pixel_format:#010x} does not fit in {payload_len} bytes")]
    ImageSize {
        width: i32,
        height: i32,
        pixel_format: u32,
        payload_len: u64,
    },
    /// Payload references a slot that was reclaimed before it could be read
    #[error("Frame slot {index} was reclaimed before delivery")]
    Revoked { index: usize },
}

/// Errors produced while compressing a received frame
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Header FourCC has no RGB conversion
    #[error("Unsupported pixel format {0:#010x}")]
    PixelFormat(u32),
    /// Payload holds fewer bytes than the layout needs
    #[error("Payload too short for {0}")]
    ShortPayload(StreamFormat),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}
