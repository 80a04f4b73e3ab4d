// SPDX-License-Identifier: GPL-3.0-only

//! Pixel access and color conversion for captured frames

pub mod conversions;

pub use conversions::{LumaView, to_rgb24, yuv_to_rgb};
