// SPDX-License-Identifier: GPL-3.0-only

//! Frame analysis
//!
//! Detectors turn a captured frame into at most one point of interest.

pub mod tasks;
pub mod types;

pub use tasks::{Detector, EyeCenterDetector, FaceCenterDetector, detector_for};
pub use types::Point;
