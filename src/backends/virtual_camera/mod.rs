// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture device
//!
//! Renders a dark disk drifting over a mid-grey background into its own
//! buffers, following the same queue/dequeue protocol as a V4L2 mmap device.
//! Used by `--virtual` runs on machines without a webcam and by tests.
//!
//! ```text
//!   queue(i) ──▶ [ incoming FIFO ] ──dequeue──▶ render pattern into i ──▶ caller
//! ```

use crate::backends::camera::types::{
    CaptureDevice, Dequeued, PixelFormat, SlotRegion, StreamFormat,
};
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};
use tracing::debug;

/// Luma of the background
const BACKGROUND_LUMA: u8 = 170;
/// Luma of the moving target
const TARGET_LUMA: u8 = 30;
/// Neutral chroma
const NEUTRAL_CHROMA: u8 = 128;

/// Heap buffer standing in for a driver mapping
struct RawBuffer {
    ptr: *mut u8,
    len: usize,
}

impl RawBuffer {
    fn zeroed(len: usize) -> Self {
        let boxed = vec![0u8; len].into_boxed_slice();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        Self { ptr, len }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // Rebuild the box allocated in `zeroed`
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr, self.len,
            )));
        }
    }
}

/// In-process capture device producing a moving test pattern
pub struct VirtualCamera {
    format: StreamFormat,
    buffers: Vec<RawBuffer>,
    queued: VecDeque<usize>,
    streaming: bool,
    sequence: u32,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
}

// Buffers are only written while queued, when no slot view can exist
unsafe impl Send for VirtualCamera {}

impl VirtualCamera {
    /// Device with `buffer_count` buffers that fills a frame on every dequeue
    pub fn new(format: StreamFormat, buffer_count: usize) -> Self {
        let buffers = (0..buffer_count)
            .map(|_| RawBuffer::zeroed(format.frame_size))
            .collect();
        debug!(format = %format, buffer_count, "Created virtual camera");
        Self {
            format,
            buffers,
            queued: VecDeque::with_capacity(buffer_count),
            streaming: false,
            sequence: 0,
            frame_interval: None,
            last_frame: None,
        }
    }

    /// Deliver at most one frame per `interval`, like a real sensor
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_interval = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    /// Centre of the target in the frame with the given sequence number
    pub fn target_position(format: &StreamFormat, sequence: u32) -> (u32, u32) {
        let t = sequence as f32 * 0.05;
        let half_w = format.width as f32 / 2.0;
        let half_h = format.height as f32 / 2.0;
        let x = half_w + half_w * 0.6 * t.sin();
        let y = half_h + half_h * 0.6 * (t * 0.7).cos();
        (x as u32, y as u32)
    }

    /// Radius of the target disk in pixels
    pub fn target_radius(format: &StreamFormat) -> u32 {
        (format.width.min(format.height) / 10).max(1)
    }

    fn render(&self, index: usize, sequence: u32) -> usize {
        let buffer = &self.buffers[index];
        // Queued buffers are owned by this device; no reader holds them
        let out = unsafe { std::slice::from_raw_parts_mut(buffer.ptr, buffer.len) };
        render_pattern(&self.format, sequence, out)
    }
}

/// Draw the test pattern for `sequence` into `out`, returning bytes written
pub fn render_pattern(format: &StreamFormat, sequence: u32, out: &mut [u8]) -> usize {
    let (cx, cy) = VirtualCamera::target_position(format, sequence);
    let radius = VirtualCamera::target_radius(format) as i64;
    let r2 = radius * radius;
    let bpp = format.pixel_format.bytes_per_pixel();
    let stride = format.stride as usize;
    let used = format.frame_size.min(out.len());

    for y in 0..format.height as usize {
        let row = y * stride;
        if row + format.width as usize * bpp > used {
            break;
        }
        let dy = y as i64 - cy as i64;
        for x in 0..format.width as usize {
            let dx = x as i64 - cx as i64;
            let luma = if dx * dx + dy * dy <= r2 {
                TARGET_LUMA
            } else {
                BACKGROUND_LUMA
            };
            let px = row + x * bpp;
            match format.pixel_format {
                PixelFormat::YUYV => {
                    out[px] = luma;
                    out[px + 1] = NEUTRAL_CHROMA;
                }
                PixelFormat::UYVY => {
                    out[px] = NEUTRAL_CHROMA;
                    out[px + 1] = luma;
                }
                PixelFormat::Gray8 => out[px] = luma,
                PixelFormat::RGB24 => out[px..px + 3].fill(luma),
            }
        }
    }
    used
}

impl CaptureDevice for VirtualCamera {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn region(&self, index: usize) -> SlotRegion {
        let buffer = &self.buffers[index];
        SlotRegion {
            ptr: buffer.ptr as *const u8,
            len: buffer.len,
        }
    }

    fn queue(&mut self, index: usize) -> io::Result<()> {
        if index >= self.buffers.len() || self.queued.contains(&index) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.queued.push_back(index);
        Ok(())
    }

    fn dequeue(&mut self) -> io::Result<Option<Dequeued>> {
        if !self.streaming {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        let now = Instant::now();
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame)
            && now.duration_since(last) < interval
        {
            return Ok(None);
        }

        let Some(index) = self.queued.pop_front() else {
            return Ok(None);
        };

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        let bytes_used = self.render(index, sequence);
        self.last_frame = Some(now);

        Ok(Some(Dequeued {
            index,
            bytes_used,
            sequence,
            timestamp: now,
        }))
    }

    fn start(&mut self) -> io::Result<()> {
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> io::Result<()> {
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> StreamFormat {
        StreamFormat::packed(64, 48, PixelFormat::YUYV)
    }

    #[test]
    fn test_dequeue_follows_queue_order() {
        let mut camera = VirtualCamera::new(format(), 3);
        camera.start().unwrap();
        camera.queue(2).unwrap();
        camera.queue(0).unwrap();

        assert_eq!(camera.dequeue().unwrap().map(|d| d.index), Some(2));
        assert_eq!(camera.dequeue().unwrap().map(|d| d.index), Some(0));
        assert!(camera.dequeue().unwrap().is_none());
    }

    #[test]
    fn test_double_queue_rejected() {
        let mut camera = VirtualCamera::new(format(), 2);
        camera.queue(1).unwrap();
        assert!(camera.queue(1).is_err());
        assert!(camera.queue(5).is_err());
    }

    #[test]
    fn test_dequeue_before_start_fails() {
        let mut camera = VirtualCamera::new(format(), 1);
        camera.queue(0).unwrap();
        assert!(camera.dequeue().is_err());
    }

    #[test]
    fn test_pattern_marks_target() {
        let format = format();
        let mut frame = vec![0u8; format.frame_size];
        render_pattern(&format, 7, &mut frame);

        let (cx, cy) = VirtualCamera::target_position(&format, 7);
        let center = cy as usize * format.stride as usize + cx as usize * 2;
        assert_eq!(frame[center], TARGET_LUMA);
        assert_eq!(frame[0], BACKGROUND_LUMA);
        assert_eq!(frame[1], NEUTRAL_CHROMA);
    }

    #[test]
    fn test_frame_rate_limits_delivery() {
        let mut camera = VirtualCamera::new(format(), 2).with_frame_rate(1);
        camera.start().unwrap();
        camera.queue(0).unwrap();
        camera.queue(1).unwrap();
        assert!(camera.dequeue().unwrap().is_some());
        assert!(camera.dequeue().unwrap().is_none());
    }
}
