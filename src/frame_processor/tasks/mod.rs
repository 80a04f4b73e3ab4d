// SPDX-License-Identifier: GPL-3.0-only

//! Detection tasks
//!
//! A detector consumes one frame and yields at most one point. The
//! implementation is chosen once from the command-line mode.

pub mod eye;
pub mod face;

pub use eye::EyeCenterDetector;
pub use face::FaceCenterDetector;

use super::types::Point;
use crate::constants::DetectionMode;
use crate::media::LumaView;

/// Frame analysis producing zero or one coordinate
pub trait Detector: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &LumaView<'_>) -> Option<Point>;
}

/// Detector implementing `mode`
pub fn detector_for(mode: DetectionMode) -> Box<dyn Detector> {
    match mode {
        DetectionMode::Face => Box::new(FaceCenterDetector::default()),
        DetectionMode::Eye => Box::new(EyeCenterDetector::default()),
    }
}
