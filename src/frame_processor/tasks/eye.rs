// SPDX-License-Identifier: GPL-3.0-only

//! Pupil center detection
//!
//! The pupil is the darkest blob in view. The detector finds the minimum
//! luma and averages the positions of every pixel within `tolerance` of it.

use super::Detector;
use crate::frame_processor::types::{Centroid, Point};
use crate::media::LumaView;

pub struct EyeCenterDetector {
    step: u32,
    tolerance: u8,
    /// Frames whose darkest pixel is brighter than this contain no pupil
    max_pupil_luma: u8,
}

impl Default for EyeCenterDetector {
    fn default() -> Self {
        Self {
            step: 2,
            tolerance: 25,
            max_pupil_luma: 90,
        }
    }
}

impl Detector for EyeCenterDetector {
    fn name(&self) -> &'static str {
        "eye"
    }

    fn detect(&mut self, frame: &LumaView<'_>) -> Option<Point> {
        let step = self.step.max(1) as usize;
        let rows = || (0..frame.height()).step_by(step);
        let cols = || (0..frame.width()).step_by(step);

        let darkest = rows()
            .flat_map(|y| cols().map(move |x| (x, y)))
            .map(|(x, y)| frame.luma(x, y))
            .min()?;
        if darkest > self.max_pupil_luma {
            return None;
        }

        let limit = darkest.saturating_add(self.tolerance);
        let mut centroid = Centroid::default();
        for y in rows() {
            for x in cols() {
                if frame.luma(x, y) <= limit {
                    centroid.add(x, y);
                }
            }
        }
        centroid.center(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{PixelFormat, StreamFormat};

    #[test]
    fn test_dark_spot_located() {
        let format = StreamFormat::packed(40, 30, PixelFormat::Gray8);
        let mut frame = vec![200u8; format.frame_size];
        for y in 10..14 {
            for x in 20..24 {
                frame[y * 40 + x] = 10;
            }
        }
        let view = LumaView::new(&frame, format).unwrap();
        assert_eq!(EyeCenterDetector::default().detect(&view), Some(Point::new(21, 11)));
    }

    #[test]
    fn test_bright_frame_has_no_pupil() {
        let format = StreamFormat::packed(8, 8, PixelFormat::Gray8);
        let frame = vec![180u8; format.frame_size];
        let view = LumaView::new(&frame, format).unwrap();
        assert_eq!(EyeCenterDetector::default().detect(&view), None);
    }
}
