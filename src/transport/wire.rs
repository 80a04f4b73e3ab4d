// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-size frame metadata header
//!
//! Layout, little-endian, matching the C struct `{int32 width; int32 height;
//! uint32 format; /* 4 bytes padding */ uint64 length;}` on 64-bit targets:
//!
//! | offset | size | field          |
//! |--------|------|----------------|
//! | 0      | 4    | width (i32)    |
//! | 4      | 4    | height (i32)   |
//! | 8      | 4    | FourCC (u32)   |
//! | 12     | 4    | zero padding   |
//! | 16     | 8    | payload length |

use crate::backends::camera::types::{FrameMeta, PixelFormat, StreamFormat};
use crate::errors::FrameError;

/// Encoded header size in bytes
pub const HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: i32,
    pub height: i32,
    pub pixel_format: u32,
    pub payload_len: u64,
}

impl FrameHeader {
    pub fn from_meta(meta: &FrameMeta) -> Self {
        Self {
            width: meta.width as i32,
            height: meta.height as i32,
            pixel_format: meta.pixel_format.fourcc(),
            payload_len: meta.payload_len as u64,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.width.to_le_bytes());
        out[4..8].copy_from_slice(&self.height.to_le_bytes());
        out[8..12].copy_from_slice(&self.pixel_format.to_le_bytes());
        out[16..24].copy_from_slice(&self.payload_len.to_le_bytes());
        out
    }

    /// Parse and sanity-check a received header
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let bytes: &[u8; HEADER_LEN] = bytes.try_into().map_err(|_| FrameError::HeaderSize {
            expected: HEADER_LEN,
            received: bytes.len(),
        })?;

        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        let mut length = [0u8; 8];
        length.copy_from_slice(&bytes[16..24]);

        let header = Self {
            width: i32::from_le_bytes(word(0)),
            height: i32::from_le_bytes(word(4)),
            pixel_format: u32::from_le_bytes(word(8)),
            payload_len: u64::from_le_bytes(length),
        };

        if header.width <= 0 || header.height <= 0 {
            return Err(FrameError::Dimensions {
                width: header.width,
                height: header.height,
            });
        }
        Ok(header)
    }

    /// Check the received payload against the declared length
    pub fn check_payload(&self, received: usize) -> Result<(), FrameError> {
        if received as u64 != self.payload_len {
            return Err(FrameError::PayloadSize {
                expected: self.payload_len,
                received: received as u64,
            });
        }
        Ok(())
    }

    /// Bytes of a packed image with these dimensions, `None` for an unknown
    /// FourCC or a size beyond `u64`
    pub fn image_len(&self) -> Option<u64> {
        let pixel_format = PixelFormat::from_fourcc(self.pixel_format)?;
        u64::try_from(self.width)
            .ok()?
            .checked_mul(u64::try_from(self.height).ok()?)?
            .checked_mul(pixel_format.bytes_per_pixel() as u64)
    }

    /// Check that a known-format image fits in the declared payload
    ///
    /// Unknown FourCCs pass through; consumers that need the layout skip them.
    pub fn check_image(&self) -> Result<(), FrameError> {
        if PixelFormat::from_fourcc(self.pixel_format).is_none() {
            return Ok(());
        }
        match self.image_len() {
            Some(len) if len <= self.payload_len => Ok(()),
            _ => Err(FrameError::ImageSize {
                width: self.width,
                height: self.height,
                pixel_format: self.pixel_format,
                payload_len: self.payload_len,
            }),
        }
    }

    /// Stream layout described by this header
    ///
    /// Row padding is inferred from the payload length. `None` for an
    /// unknown FourCC or dimensions whose size overflows.
    pub fn stream_format(&self) -> Option<StreamFormat> {
        let pixel_format = PixelFormat::from_fourcc(self.pixel_format)?;
        let width = u32::try_from(self.width).ok()?;
        let height = u32::try_from(self.height).ok()?;
        let mut format = StreamFormat::checked_packed(width, height, pixel_format)?;
        if height == 0 {
            return Some(format);
        }
        let stride = self.payload_len / self.height as u64;
        if stride > u64::from(format.stride) && stride <= u64::from(u32::MAX) {
            format.stride = stride as u32;
            format.frame_size = self.payload_len as usize;
        }
        Some(format)
    }
}
