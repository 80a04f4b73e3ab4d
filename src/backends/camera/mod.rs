// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture and the zero-copy frame pool
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  CaptureDevice      │  ← V4L2 mmap node or virtual camera
//! └──────────┬──────────┘
//!            │ queue / dequeue
//!            ▼
//! ┌─────────────────────┐
//! │  FrameBufferPool    │  ← Slot states, generations, leases
//! └──────────┬──────────┘
//!            │ acquire
//!            ▼
//! ┌─────────────────────┐
//! │  FrameSource        │  ← Frame handles, drop-oldest on starvation
//! └─────────────────────┘
//! ```

pub mod pool;
pub mod source;
pub mod types;
pub mod v4l2_mmap;
pub mod v4l2_utils;

pub use pool::{FrameBufferPool, PinnedBytes, PoolStats, SlotLease, SlotState};
pub use source::{Frame, FrameSource};
pub use types::*;
pub use v4l2_mmap::V4l2MmapDevice;

use crate::backends::virtual_camera::VirtualCamera;
use crate::config::CaptureSettings;
use std::path::Path;
use tracing::info;

/// Frame rate of the synthetic camera
const VIRTUAL_FPS: u32 = 30;

/// Open the configured capture device
///
/// With `virtual_device` set, a synthetic camera replaces the V4L2 node.
pub fn open_device(
    settings: &CaptureSettings,
    virtual_device: bool,
) -> DeviceResult<Box<dyn CaptureDevice>> {
    if virtual_device {
        info!(
            width = settings.width,
            height = settings.height,
            "Using virtual camera"
        );
        let format = StreamFormat::packed(settings.width, settings.height, PixelFormat::YUYV);
        return Ok(Box::new(
            VirtualCamera::new(format, settings.pool_size).with_frame_rate(VIRTUAL_FPS),
        ));
    }

    let device = V4l2MmapDevice::open(
        Path::new(&settings.device_path),
        settings.width,
        settings.height,
        PixelFormat::YUYV,
        settings.pool_size,
    )?;
    Ok(Box::new(device))
}
