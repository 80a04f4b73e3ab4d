// SPDX-License-Identifier: GPL-3.0-only

//! Frame source: turns filled pool slots into [`Frame`] handles
//!
//! The source also owns the drop-oldest policy. When every slot is in flight
//! and the device queue has run dry, the slot at the rotation index is taken
//! back from its consumers and recycled so capture keeps going.

use super::pool::{FrameBufferPool, PinnedBytes, SlotLease, SlotState};
use super::types::{FrameMeta, StreamFormat};
use crate::errors::FrameError;
use std::sync::Arc;
use tracing::{debug, warn};

/// A captured frame borrowing one pool slot
///
/// Dropping the last owner of a `Frame` reclaims its slot.
#[derive(Debug)]
pub struct Frame {
    lease: SlotLease,
    meta: FrameMeta,
}

impl Frame {
    fn new(lease: SlotLease, format: &StreamFormat) -> Self {
        let meta = FrameMeta {
            width: format.width,
            height: format.height,
            pixel_format: format.pixel_format,
            payload_len: lease.bytes_used(),
            sequence: lease.sequence(),
            captured_at: lease.timestamp(),
        };
        Self { lease, meta }
    }

    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// Pool slot backing this frame
    pub fn slot_index(&self) -> usize {
        self.lease.index()
    }

    /// False once the slot was forcibly recycled
    pub fn is_valid(&self) -> bool {
        self.lease.is_valid()
    }

    /// Borrow the payload; fails if the slot was recycled under us
    pub fn bytes(&self) -> Result<PinnedBytes<'_>, FrameError> {
        self.lease.pin()
    }
}

/// Non-blocking producer of frames from a [`FrameBufferPool`]
pub struct FrameSource {
    pool: Arc<FrameBufferPool>,
    /// Next slot to overwrite when starving
    next_overwrite: usize,
    last_sequence: Option<u32>,
    lost_frames: u64,
}

impl FrameSource {
    pub fn new(pool: Arc<FrameBufferPool>) -> Self {
        Self {
            pool,
            next_overwrite: 0,
            last_sequence: None,
            lost_frames: 0,
        }
    }

    pub fn pool(&self) -> &Arc<FrameBufferPool> {
        &self.pool
    }

    /// Frames the driver reports as skipped, from sequence gaps
    pub fn lost_frames(&self) -> u64 {
        self.lost_frames
    }

    /// Take the next filled frame without blocking
    ///
    /// Returns `None` when no frame is ready. If the pool is starved, the
    /// oldest in-flight slot is recycled and the device polled once more.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.pool.requeue_free();

        if let Some(frame) = self.poll() {
            return Some(frame);
        }
        if self.relieve_starvation().is_some() {
            return self.poll();
        }
        None
    }

    fn poll(&mut self) -> Option<Frame> {
        match self.pool.acquire() {
            Ok(Some(lease)) => {
                self.track_sequence(lease.sequence());
                Some(Frame::new(lease, &self.pool.format()))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to dequeue frame");
                None
            }
        }
    }

    fn track_sequence(&mut self, sequence: u32) {
        if let Some(last) = self.last_sequence {
            let gap = sequence.wrapping_sub(last).wrapping_sub(1);
            if gap > 0 && gap < u32::MAX / 2 {
                self.lost_frames += u64::from(gap);
                debug!(last, sequence, gap, "Driver skipped frames");
            }
        }
        self.last_sequence = Some(sequence);
    }

    /// Recycle the oldest in-flight slot if nothing is queued to the device
    ///
    /// Slots are tried in rotation order starting at the overwrite index;
    /// a slot pinned by a reader is skipped. Returns the recycled index.
    pub fn relieve_starvation(&mut self) -> Option<usize> {
        if self.pool.count_in(SlotState::QueuedToDevice) > 0 {
            return None;
        }

        let slots = self.pool.len();
        for offset in 0..slots {
            let index = (self.next_overwrite + offset) % slots;
            if self.pool.force_reclaim(index) {
                self.next_overwrite = (index + 1) % slots;
                debug!(index, "All slots in flight, recycled oldest");
                return Some(index);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;
    use crate::backends::virtual_camera::VirtualCamera;

    fn source(slots: usize) -> FrameSource {
        let format = StreamFormat::packed(16, 8, PixelFormat::YUYV);
        let pool = FrameBufferPool::new(Box::new(VirtualCamera::new(format, slots))).unwrap();
        FrameSource::new(pool)
    }

    #[test]
    fn test_frame_metadata() {
        let mut source = source(2);
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.meta().width, 16);
        assert_eq!(frame.meta().height, 8);
        assert_eq!(frame.meta().payload_len, 256);
        assert_eq!(frame.bytes().unwrap().len(), 256);
    }

    #[test]
    fn test_no_starvation_while_slots_queued() {
        let mut source = source(2);
        let _held = source.next_frame().unwrap();
        assert_eq!(source.relieve_starvation(), None);
    }

    #[test]
    fn test_rotation_advances() {
        let mut source = source(2);
        let a = source.next_frame().unwrap();
        let b = source.next_frame().unwrap();
        assert_eq!((a.slot_index(), b.slot_index()), (0, 1));

        let c = source.next_frame().unwrap();
        assert_eq!(c.slot_index(), 0);
        assert!(!a.is_valid());

        let d = source.next_frame().unwrap();
        assert_eq!(d.slot_index(), 1);
        assert!(!b.is_valid());
        assert!(c.is_valid());
    }
}
