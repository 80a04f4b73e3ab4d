// SPDX-License-Identifier: GPL-3.0-only

//! Detection-to-pointer mapping
//!
//! Detected centers are mirrored (the camera faces the user), averaged over
//! a short window, normalised against the calibration bounds and scaled to
//! the display. Without new detections the pointer holds its last position.

use super::actuator::Actuator;
use crate::config::CursorSettings;
use crate::constants::{capture, cursor};
use crate::frame_processor::Point;
use crate::transport::control::{self, ControlReceiver, ControlSender};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info, warn};

/// Expected first line of a calibration file
pub const CALIBRATION_HEADER: &str = "straight_x,straight_y,left_x,right_x,top_y,bottom_y";

/// Image-space bounds of the user's gaze or head movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub straight_x: i32,
    pub straight_y: i32,
    /// x seen when looking at the left display edge
    pub left_x: i32,
    /// x seen when looking at the right display edge
    pub right_x: i32,
    pub top_y: i32,
    pub bottom_y: i32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            straight_x: capture::WIDTH as i32 / 2,
            straight_y: capture::HEIGHT as i32 / 2,
            left_x: cursor::LEFT_X,
            right_x: cursor::RIGHT_X,
            top_y: cursor::TOP_Y,
            bottom_y: cursor::BOTTOM_Y,
        }
    }
}

impl Calibration {
    /// Parse the header line plus one row of six integers
    pub fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next()? != CALIBRATION_HEADER {
            return None;
        }

        let values: Vec<i32> = lines
            .next()?
            .split(',')
            .map(|v| v.trim().parse().ok())
            .collect::<Option<_>>()?;
        let &[straight_x, straight_y, left_x, right_x, top_y, bottom_y] = values.as_slice() else {
            return None;
        };

        let calibration = Self {
            straight_x,
            straight_y,
            left_x,
            right_x,
            top_y,
            bottom_y,
        };
        calibration.is_usable().then_some(calibration)
    }

    /// Load `path`, falling back to defaults when missing or malformed
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Some(calibration) => {
                    info!(path = %path.display(), ?calibration, "Loaded calibration");
                    calibration
                }
                None => {
                    warn!(path = %path.display(), "Malformed calibration file, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "No calibration file, using defaults");
                Self::default()
            }
        }
    }

    /// Both axes span a non-empty range that fits in `i32`
    pub fn is_usable(&self) -> bool {
        let span = |a: i32, b: i32| a.checked_sub(b).is_some_and(|d| d != 0);
        span(self.left_x, self.right_x) && span(self.bottom_y, self.top_y)
    }
}

/// Turns detector centers into display coordinates
#[derive(Debug, Clone)]
pub struct CursorMapper {
    calibration: Calibration,
    display: (i32, i32),
    frame_width: i32,
    mirror: bool,
    window: usize,
    recent: VecDeque<Point>,
}

impl CursorMapper {
    pub fn new(calibration: Calibration, settings: &CursorSettings, frame_width: u32) -> Self {
        Self {
            calibration,
            display: (settings.display_width, settings.display_height),
            frame_width: frame_width as i32,
            mirror: settings.mirror,
            window: settings.smoothing_window.max(1),
            recent: VecDeque::with_capacity(settings.smoothing_window.max(1)),
        }
    }

    /// Add a detection and return the smoothed center
    pub fn push(&mut self, center: Point) -> Point {
        let x = if self.mirror {
            self.frame_width.saturating_sub(center.x)
        } else {
            center.x
        };

        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(Point::new(x, center.y));

        let n = self.recent.len() as i64;
        let (sx, sy) = self
            .recent
            .iter()
            .fold((0i64, 0i64), |(sx, sy), p| (sx + p.x as i64, sy + p.y as i64));
        Point::new((sx / n) as i32, (sy / n) as i32)
    }

    /// Map a smoothed center onto the display, clamped to its bounds
    pub fn to_display(&self, center: Point) -> Point {
        let c = &self.calibration;
        let x = scale(center.x, c.right_x, c.left_x, self.display.0);
        let y = scale(center.y, c.top_y, c.bottom_y, self.display.1);
        Point::new(x, y)
    }
}

/// Position of `value` between `from` and `to`, scaled onto `0..extent`
fn scale(value: i32, from: i32, to: i32, extent: i32) -> i32 {
    let extent = i64::from(extent.max(1));
    let span = i64::from(to) - i64::from(from);
    if span == 0 {
        return 0;
    }
    let ratio = (i64::from(value) - i64::from(from)) as f64 / span as f64;
    // Float to int casts saturate
    let scaled = (ratio * extent as f64) as i64;
    scaled.clamp(0, extent - 1) as i32
}

/// Periodic stage: consume detections, move the pointer, emit telemetry
pub struct CursorStage {
    inbox: ControlReceiver,
    mapper: CursorMapper,
    actuator: Box<dyn Actuator>,
    telemetry: ControlSender,
    position: Option<Point>,
    ignored: u64,
}

impl CursorStage {
    pub fn new(
        inbox: ControlReceiver,
        mapper: CursorMapper,
        actuator: Box<dyn Actuator>,
        telemetry: ControlSender,
    ) -> Self {
        info!(actuator = actuator.name(), "Cursor stage ready");
        Self {
            inbox,
            mapper,
            actuator,
            telemetry,
            position: None,
            ignored: 0,
        }
    }

    /// Last pointer position written
    pub fn position(&self) -> Option<Point> {
        self.position
    }

    /// Control messages that did not parse
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Consume at most one coordinate and move the pointer
    ///
    /// Unparseable messages are skipped. With nothing queued the pointer
    /// stays where it is.
    pub fn run_once(&mut self) {
        let Some(center) = self.next_center() else {
            return;
        };
        let smoothed = self.mapper.push(center);
        let target = self.mapper.to_display(smoothed);

        if let Err(e) = self.actuator.move_to(target) {
            warn!(error = %e, actuator = self.actuator.name(), "Failed to move pointer");
            return;
        }
        self.position = Some(target);
        self.telemetry.send(control::format_telemetry(
            (smoothed.x, smoothed.y),
            (target.x, target.y),
        ));
    }

    fn next_center(&mut self) -> Option<Point> {
        while let Some(message) = self.inbox.try_recv() {
            match control::parse_center(&message.text) {
                Some(center) => return Some(center.into()),
                None => {
                    self.ignored += 1;
                    debug!(text = %message.text, "Ignoring unparseable control message");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(window: usize, mirror: bool) -> CursorSettings {
        CursorSettings {
            smoothing_window: window,
            mirror,
            ..CursorSettings::default()
        }
    }

    #[test]
    fn test_parse_calibration() {
        let content = format!("{}\n320,240,500,140,90,380\n", CALIBRATION_HEADER);
        let c = Calibration::parse(&content).unwrap();
        assert_eq!((c.left_x, c.right_x, c.top_y, c.bottom_y), (500, 140, 90, 380));
    }

    #[test]
    fn test_malformed_calibration() {
        assert_eq!(Calibration::parse(""), None);
        assert_eq!(Calibration::parse("a,b\n1,2,3,4,5,6"), None);
        let short = format!("{}\n1,2,3", CALIBRATION_HEADER);
        assert_eq!(Calibration::parse(&short), None);
        let degenerate = format!("{}\n1,2,3,3,5,6", CALIBRATION_HEADER);
        assert_eq!(Calibration::parse(&degenerate), None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let c = Calibration::load_or_default(Path::new("/nonexistent/calibration_face.csv"));
        assert_eq!(c, Calibration::default());
    }

    #[test]
    fn test_smoothing_window() {
        let mut mapper = CursorMapper::new(Calibration::default(), &settings(2, false), 640);
        assert_eq!(mapper.push(Point::new(100, 100)), Point::new(100, 100));
        assert_eq!(mapper.push(Point::new(200, 300)), Point::new(150, 200));
        // Oldest sample leaves the window
        assert_eq!(mapper.push(Point::new(300, 300)), Point::new(250, 300));
    }

    #[test]
    fn test_mirror() {
        let mut mapper = CursorMapper::new(Calibration::default(), &settings(1, true), 640);
        assert_eq!(mapper.push(Point::new(100, 50)), Point::new(540, 50));
    }

    #[test]
    fn test_stage_moves_pointer_once_per_activation() {
        use crate::pipelines::actuator::LoggingActuator;
        use crate::transport::ControlChannel;

        let (detections_tx, detections_rx) = ControlChannel::bounded("detections", 8);
        let (telemetry_tx, telemetry_rx) = ControlChannel::bounded("telemetry", 8);
        let mapper = CursorMapper::new(Calibration::default(), &settings(1, false), 640);
        let mut stage = CursorStage::new(
            detections_rx,
            mapper,
            Box::new(LoggingActuator::default()),
            telemetry_tx,
        );

        detections_tx.send("garbage");
        detections_tx.send(control::format_center(320, 240));
        detections_tx.send(control::format_center(0, 0));

        stage.run_once();
        assert_eq!(stage.position(), Some(Point::new(960, 540)));
        assert_eq!(stage.ignored(), 1);
        stage.run_once();
        assert_eq!(stage.position(), Some(Point::new(0, 0)));

        // Nothing queued: the pointer holds
        stage.run_once();
        assert_eq!(stage.position(), Some(Point::new(0, 0)));

        let telemetry: Vec<_> = telemetry_rx.drain().into_iter().map(|m| m.text).collect();
        assert_eq!(
            telemetry,
            ["Center: 320 x 240 ,Cursor: 960 x 540", "Center: 0 x 0 ,Cursor: 0 x 0"]
        );
    }

    #[test]
    fn test_display_mapping_and_clamp() {
        let mapper = CursorMapper::new(Calibration::default(), &settings(1, false), 640);
        // Midway between right_x=120 and left_x=520, top_y=80 and bottom_y=400
        assert_eq!(mapper.to_display(Point::new(320, 240)), Point::new(960, 540));
        assert_eq!(mapper.to_display(Point::new(0, 0)), Point::new(0, 0));
        assert_eq!(mapper.to_display(Point::new(640, 480)), Point::new(1919, 1079));
    }

    #[test]
    fn test_extreme_calibration_rejected() {
        let overflowing = format!("{}\n0,0,2147483647,-2147483648,0,10", CALIBRATION_HEADER);
        assert_eq!(Calibration::parse(&overflowing), None);
    }

    #[test]
    fn test_extreme_values_stay_on_display() {
        let calibration = Calibration {
            straight_x: 0,
            straight_y: 0,
            left_x: i32::MAX,
            right_x: 1,
            top_y: i32::MIN + 1,
            bottom_y: -1,
        };
        let mapper = CursorMapper::new(calibration, &settings(1, false), 640);
        for center in [Point::new(i32::MIN, i32::MAX), Point::new(i32::MAX, i32::MIN)] {
            let p = mapper.to_display(center);
            assert!((0..1920).contains(&p.x) && (0..1080).contains(&p.y), "{p}");
        }

        let mut mirrored = CursorMapper::new(Calibration::default(), &settings(1, true), 640);
        mirrored.push(Point::new(i32::MIN, 0));
    }

    #[test]
    fn test_empty_display_does_not_panic() {
        let cursor = CursorSettings {
            display_width: 0,
            display_height: -5,
            ..settings(1, false)
        };
        let mapper = CursorMapper::new(Calibration::default(), &cursor, 640);
        assert_eq!(mapper.to_display(Point::new(320, 240)), Point::new(0, 0));
    }
}
