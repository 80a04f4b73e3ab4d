// SPDX-License-Identifier: GPL-3.0-only

//! Face center detection
//!
//! Treats the face as the largest region that stands out from the scene's
//! average brightness and reports the centroid of those pixels. Works on a
//! subsampled luma grid so a 640x480 frame costs about 19k reads.

use super::Detector;
use crate::frame_processor::types::{Centroid, Point};
use crate::media::LumaView;
use tracing::trace;

pub struct FaceCenterDetector {
    /// Sample every `step`-th pixel in both directions
    step: u32,
    /// Minimum |luma - mean| for a pixel to count as foreground
    contrast: u8,
    /// Minimum share of sampled pixels, in 1/1000, for a detection
    min_area_permille: u64,
}

impl Default for FaceCenterDetector {
    fn default() -> Self {
        Self {
            step: 4,
            contrast: 40,
            min_area_permille: 5,
        }
    }
}

impl FaceCenterDetector {
    pub fn new(step: u32, contrast: u8, min_area_permille: u64) -> Self {
        Self {
            step: step.max(1),
            contrast,
            min_area_permille,
        }
    }
}

impl Detector for FaceCenterDetector {
    fn name(&self) -> &'static str {
        "face"
    }

    fn detect(&mut self, frame: &LumaView<'_>) -> Option<Point> {
        let mean = frame.mean(self.step);
        let mut centroid = Centroid::default();
        let mut sampled = 0u64;

        for y in (0..frame.height()).step_by(self.step as usize) {
            for x in (0..frame.width()).step_by(self.step as usize) {
                sampled += 1;
                if frame.luma(x, y).abs_diff(mean) >= self.contrast {
                    centroid.add(x, y);
                }
            }
        }

        let min_count = (sampled * self.min_area_permille / 1000).max(1);
        let center = centroid.center(min_count);
        trace!(mean, selected = centroid.count(), sampled, ?center, "Face detection pass");
        center
    }
}
