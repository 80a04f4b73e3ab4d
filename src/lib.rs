// SPDX-License-Identifier: GPL-3.0-only

//! Gaze Cursor - camera-driven pointer control on Linux
//!
//! A camera stream is analysed for the user's face or eye, and the detected
//! position drives the system pointer. Each stage runs as a fixed-priority
//! periodic task; frames move between stages without copying.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`sched`]: Periodic tasks, the release loop and timing statistics
//! - [`backends`]: Capture devices and the zero-copy frame pool
//! - [`transport`]: Frame fan-out and control message channels
//! - [`frame_processor`]: Face and eye center detectors
//! - [`media`]: Pixel format conversions
//! - [`pipelines`]: The stages and their assembly
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! // Face tracking with the default camera:
//! // gazecursor 1
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame_processor;
pub mod media;
pub mod pipelines;
pub mod sched;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use constants::DetectionMode;
pub use errors::{EncodeError, FrameError, PipelineError, PipelineResult};
pub use pipelines::Pipeline;
