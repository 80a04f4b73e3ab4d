// SPDX-License-Identifier: GPL-3.0-only

//! Detection stage: newest frame in, one center message out

use crate::frame_processor::{Detector, Point};
use crate::media::LumaView;
use crate::transport::control::{self, ControlSender};
use crate::transport::{ReceivedFrame, Subscription};
use tracing::{debug, trace};

/// Periodic stage running a detector over the newest queued frame
pub struct DetectionStage {
    subscription: Subscription,
    detector: Box<dyn Detector>,
    results: ControlSender,
    detections: u64,
    misses: u64,
}

impl DetectionStage {
    pub fn new(subscription: Subscription, detector: Box<dyn Detector>, results: ControlSender) -> Self {
        debug!(detector = detector.name(), "Detection stage ready");
        Self {
            subscription,
            detector,
            results,
            detections: 0,
            misses: 0,
        }
    }

    pub fn detections(&self) -> u64 {
        self.detections
    }

    /// Frames analysed without a result
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn run_once(&mut self) {
        let Some(frame) = self.subscription.latest_frame() else {
            return;
        };

        match self.analyse(&frame) {
            Some(center) => {
                self.detections += 1;
                trace!(x = center.x, y = center.y, "Center detected");
                self.results.send(control::format_center(center.x, center.y));
            }
            None => self.misses += 1,
        }
    }

    fn analyse(&mut self, frame: &ReceivedFrame) -> Option<Point> {
        let format = frame.header.stream_format()?;
        let detector = &mut self.detector;
        frame
            .payload
            .with_bytes(|data| LumaView::new(data, format).and_then(|view| detector.detect(&view)))
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{PixelFormat, StreamFormat};
    use crate::backends::virtual_camera::{VirtualCamera, render_pattern};
    use crate::frame_processor::FaceCenterDetector;
    use crate::transport::{ControlChannel, FrameDistributor, FrameHeader, FrameMessage, FramePayload};

    fn frame_message(format: &StreamFormat, sequence: u32) -> FrameMessage {
        let mut data = vec![0u8; format.frame_size];
        render_pattern(format, sequence, &mut data);
        let header = FrameHeader {
            width: format.width as i32,
            height: format.height as i32,
            pixel_format: format.pixel_format.fourcc(),
            payload_len: data.len() as u64,
        };
        FrameMessage::from_parts(header.encode(), FramePayload::Copied(data.into()))
    }

    #[test]
    fn test_emits_center_of_newest_frame() {
        let format = StreamFormat::packed(160, 120, PixelFormat::YUYV);
        let mut distributor = FrameDistributor::new(4);
        let (tx, rx) = ControlChannel::bounded("detections", 4);
        let mut stage = DetectionStage::new(
            distributor.subscribe("detection"),
            Box::new(FaceCenterDetector::default()),
            tx,
        );

        distributor.publish_message(frame_message(&format, 0));
        distributor.publish_message(frame_message(&format, 40));
        stage.run_once();

        let messages = rx.drain();
        assert_eq!(messages.len(), 1);
        let (x, y) = control::parse_center(&messages[0].text).unwrap();
        let (ex, ey) = VirtualCamera::target_position(&format, 40);
        assert!((x - ex as i32).abs() <= 4, "x {x} vs {ex}");
        assert!((y - ey as i32).abs() <= 4, "y {y} vs {ey}");
    }

    #[test]
    fn test_no_frame_no_message() {
        let mut distributor = FrameDistributor::new(4);
        let (tx, rx) = ControlChannel::bounded("detections", 4);
        let mut stage = DetectionStage::new(
            distributor.subscribe("detection"),
            Box::new(FaceCenterDetector::default()),
            tx,
        );
        stage.run_once();
        assert_eq!(rx.pending(), 0);
        assert_eq!(stage.detections(), 0);
    }

    #[test]
    fn test_oversized_header_is_skipped() {
        let mut distributor = FrameDistributor::new(4);
        let (tx, rx) = ControlChannel::bounded("detections", 4);
        let mut stage = DetectionStage::new(
            distributor.subscribe("detection"),
            Box::new(FaceCenterDetector::default()),
            tx,
        );
        let header = FrameHeader {
            width: 1_500_000_000,
            height: 1,
            pixel_format: PixelFormat::RGB24.fourcc(),
            payload_len: 8,
        };
        distributor.publish_message(FrameMessage::from_parts(
            header.encode(),
            FramePayload::Copied(vec![0u8; 8].into()),
        ));

        stage.run_once();
        assert_eq!(rx.pending(), 0);
        assert_eq!(stage.detections(), 0);
    }
}
