// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Detection mode selected on the command line
///
/// The mode is fixed for the lifetime of the process: it picks the detector
/// implementation and the calibration file once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionMode {
    /// Track the center of the face (argument `1`)
    #[default]
    Face,
    /// Track the pupil of the left eye (argument `2`)
    Eye,
}

impl DetectionMode {
    /// All modes in command-line order
    pub const ALL: [DetectionMode; 2] = [DetectionMode::Face, DetectionMode::Eye];

    /// Map the positional command-line number to a mode
    pub fn from_arg(value: u8) -> Option<Self> {
        match value {
            1 => Some(DetectionMode::Face),
            2 => Some(DetectionMode::Eye),
            _ => None,
        }
    }

    /// Command-line number for this mode
    pub fn arg_value(&self) -> u8 {
        match self {
            DetectionMode::Face => 1,
            DetectionMode::Eye => 2,
        }
    }

    /// Display name for usage output and logs
    pub fn display_name(&self) -> &'static str {
        match self {
            DetectionMode::Face => "Face Detection",
            DetectionMode::Eye => "Eye Detection",
        }
    }

    /// Calibration file read at startup for this mode
    pub fn calibration_file(&self) -> &'static str {
        match self {
            DetectionMode::Face => "calibration_face.csv",
            DetectionMode::Eye => "calibration_eye.csv",
        }
    }
}

impl std::fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Frame pool and capture defaults
pub mod capture {
    /// Number of device-mapped buffers in the frame pool
    pub const POOL_SIZE: usize = 4;
    /// Requested capture width in pixels
    pub const WIDTH: u32 = 640;
    /// Requested capture height in pixels
    pub const HEIGHT: u32 = 480;
    /// Default capture device
    pub const DEVICE_PATH: &str = "/dev/video0";
}

/// Transport defaults
pub mod transport {
    /// Pending frame messages per subscriber before new ones are dropped
    pub const SUBSCRIBER_HWM: usize = 10;
    /// Pending control messages per channel before new ones are dropped
    pub const CONTROL_HWM: usize = 10;
}

/// Scheduler defaults
pub mod scheduler {
    /// Upper bound on one sleep of the release loop, in milliseconds
    pub const MAX_SLEEP_MS: u64 = 100;
    /// Initial activations excluded from min/max statistics
    pub const WARM_UP_ACTIVATIONS: u64 = 10;
    /// Lowest SCHED_FIFO priority on Linux
    pub const FIFO_PRIORITY_MIN: i32 = 1;
    /// Highest SCHED_FIFO priority on Linux
    pub const FIFO_PRIORITY_MAX: i32 = 99;
}

/// Cursor translation defaults
pub mod cursor {
    /// Display width the pointer is mapped onto
    pub const DISPLAY_WIDTH: i32 = 1920;
    /// Display height the pointer is mapped onto
    pub const DISPLAY_HEIGHT: i32 = 1080;
    /// Number of recent detections averaged before mapping
    pub const SMOOTHING_WINDOW: usize = 5;
    /// Default calibration bounds: image x seen when looking fully left
    pub const LEFT_X: i32 = 520;
    /// Default calibration bounds: image x seen when looking fully right
    pub const RIGHT_X: i32 = 120;
    /// Default calibration bounds: image y seen when looking fully up
    pub const TOP_Y: i32 = 80;
    /// Default calibration bounds: image y seen when looking fully down
    pub const BOTTOM_Y: i32 = 400;
}

/// Output defaults
pub mod output {
    /// JPEG quality for persisted frames
    pub const JPEG_QUALITY: u8 = 80;
    /// Directory for persisted frames
    pub const IMAGE_DIR: &str = "images";
}

/// Interval between shutdown-flag checks in the main thread
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_arg() {
        assert_eq!(DetectionMode::from_arg(1), Some(DetectionMode::Face));
        assert_eq!(DetectionMode::from_arg(2), Some(DetectionMode::Eye));
        assert_eq!(DetectionMode::from_arg(0), None);
        assert_eq!(DetectionMode::from_arg(3), None);
    }

    #[test]
    fn test_mode_arg_round_trip() {
        for mode in DetectionMode::ALL {
            assert_eq!(DetectionMode::from_arg(mode.arg_value()), Some(mode));
        }
    }

    #[test]
    fn test_default_calibration_bounds_are_not_degenerate() {
        assert_ne!(cursor::LEFT_X, cursor::RIGHT_X);
        assert_ne!(cursor::TOP_Y, cursor::BOTTOM_Y);
    }
}
