// SPDX-License-Identifier: GPL-3.0-only

//! CPU pixel conversions for packed capture formats

use crate::backends::camera::types::{PixelFormat, StreamFormat};

/// Read-only view of a frame's luma channel
#[derive(Debug, Clone, Copy)]
pub struct LumaView<'a> {
    data: &'a [u8],
    format: StreamFormat,
}

impl<'a> LumaView<'a> {
    /// Wrap `data`; returns `None` if it is shorter than the format needs
    pub fn new(data: &'a [u8], format: StreamFormat) -> Option<Self> {
        let row = format.width as usize * format.pixel_format.bytes_per_pixel();
        let needed = format.stride as usize * format.height.saturating_sub(1) as usize + row;
        (format.width > 0 && format.height > 0 && data.len() >= needed)
            .then_some(Self { data, format })
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    /// Luma of pixel (x, y); RGB is reduced with BT.601 weights
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let base = y as usize * self.format.stride as usize;
        match self.format.pixel_format {
            PixelFormat::YUYV => self.data[base + x as usize * 2],
            PixelFormat::UYVY => self.data[base + x as usize * 2 + 1],
            PixelFormat::Gray8 => self.data[base + x as usize],
            PixelFormat::RGB24 => {
                let px = base + x as usize * 3;
                let (r, g, b) = (
                    self.data[px] as u32,
                    self.data[px + 1] as u32,
                    self.data[px + 2] as u32,
                );
                ((299 * r + 587 * g + 114 * b) / 1000) as u8
            }
        }
    }

    /// Mean luma over every `step`-th pixel in both directions
    pub fn mean(&self, step: u32) -> u8 {
        let step = step.max(1);
        let mut sum = 0u64;
        let mut count = 0u64;
        for y in (0..self.height()).step_by(step as usize) {
            for x in (0..self.width()).step_by(step as usize) {
                sum += u64::from(self.luma(x, y));
                count += 1;
            }
        }
        (sum / count.max(1)) as u8
    }
}

/// Convert a YUV (BT.601) triple to RGB
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

    (r, g, b)
}

/// Convert a full frame to tightly packed RGB24
///
/// Returns `None` if `data` is too short for the format.
pub fn to_rgb24(data: &[u8], format: &StreamFormat) -> Option<Vec<u8>> {
    LumaView::new(data, *format)?;

    let (width, height) = (format.width as usize, format.height as usize);
    let stride = format.stride as usize;
    let mut out = Vec::with_capacity(width * height * 3);

    for y in 0..height {
        let row = &data[y * stride..];
        for x in 0..width {
            let rgb = match format.pixel_format {
                PixelFormat::YUYV | PixelFormat::UYVY => {
                    // Two pixels share one chroma pair
                    let pair = (x & !1) * 2;
                    let (luma, u, v) = if format.pixel_format == PixelFormat::YUYV {
                        (row[x * 2], row[pair + 1], row[pair + 3])
                    } else {
                        (row[x * 2 + 1], row[pair], row[pair + 2])
                    };
                    yuv_to_rgb(luma, u, v)
                }
                PixelFormat::Gray8 => (row[x], row[x], row[x]),
                PixelFormat::RGB24 => (row[x * 3], row[x * 3 + 1], row[x * 3 + 2]),
            };
            out.extend_from_slice(&[rgb.0, rgb.1, rgb.2]);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_chroma_is_grey() {
        assert_eq!(yuv_to_rgb(100, 128, 128), (100, 100, 100));
    }

    #[test]
    fn test_yuyv_luma_and_rgb() {
        let format = StreamFormat::packed(2, 1, PixelFormat::YUYV);
        let data = [10, 128, 200, 128];
        let view = LumaView::new(&data, format).unwrap();
        assert_eq!(view.luma(0, 0), 10);
        assert_eq!(view.luma(1, 0), 200);
        assert_eq!(to_rgb24(&data, &format).unwrap(), vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let format = StreamFormat::packed(4, 4, PixelFormat::YUYV);
        assert!(LumaView::new(&[0u8; 16], format).is_none());
        assert!(to_rgb24(&[0u8; 16], &format).is_none());
    }
}
