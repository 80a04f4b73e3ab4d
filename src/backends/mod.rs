// SPDX-License-Identifier: GPL-3.0-only

//! Capture backends
//!
//! - [`camera`]: device trait, V4L2 mmap backend, frame pool and source
//! - [`virtual_camera`]: synthetic device for runs without hardware

pub mod camera;
pub mod virtual_camera;
