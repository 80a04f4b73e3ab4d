// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture devices and the frame pool

//! Shared types for camera backends

use std::io;
use std::path::PathBuf;
use std::time::Instant;

/// Result type for capture device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors raised while opening or configuring a capture device
///
/// All of these are startup failures; once streaming, an empty device queue
/// is reported as "no frame" rather than as an error.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a streaming video capture device")]
    NotCaptureDevice { path: PathBuf },

    #[error("Format not supported: {0}")]
    FormatNotSupported(String),

    #[error("Buffer request failed: {0}")]
    RequestBuffers(#[source] io::Error),

    #[error("Device granted {granted} buffers, need at least {required}")]
    NotEnoughBuffers { granted: usize, required: usize },

    #[error("Failed to map buffer {index}: {source}")]
    Map {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to queue buffer {index}: {source}")]
    Queue {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start streaming: {0}")]
    StreamOn(#[source] io::Error),
}

/// Pixel format of captured frames
///
/// Only packed formats a webcam delivers uncompressed are listed; the frame
/// pool hands out raw device memory and never converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    /// Default raw format of UVC webcams
    YUYV,
    /// UYVY - Packed 4:2:2 (U Y0 V Y1 interleaved)
    UYVY,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
}

impl PixelFormat {
    /// V4L2 FourCC code, also used as the wire format tag
    pub fn fourcc(&self) -> u32 {
        let code = match self {
            Self::YUYV => b"YUYV",
            Self::UYVY => b"UYVY",
            Self::Gray8 => b"GREY",
            Self::RGB24 => b"RGB3",
        };
        u32::from_le_bytes(*code)
    }

    /// Parse a V4L2 FourCC code
    pub fn from_fourcc(code: u32) -> Option<Self> {
        match &code.to_le_bytes() {
            b"YUYV" => Some(Self::YUYV),
            b"UYVY" => Some(Self::UYVY),
            b"GREY" => Some(Self::Gray8),
            b"RGB3" => Some(Self::RGB24),
            _ => None,
        }
    }

    /// Whole bytes per pixel (packed 4:2:2 averages to two)
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::YUYV | Self::UYVY => 2,
            Self::Gray8 => 1,
            Self::RGB24 => 3,
        }
    }

    pub fn is_yuv(&self) -> bool {
        matches!(self, Self::YUYV | Self::UYVY)
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.fourcc().to_le_bytes();
        write!(f, "{}", String::from_utf8_lossy(&code))
    }
}

/// Negotiated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Bytes per row including driver padding
    pub stride: u32,
    /// Bytes of one complete image
    pub frame_size: usize,
}

impl StreamFormat {
    /// Tightly packed format with no row padding
    ///
    /// Sizes saturate on overflow; untrusted dimensions go through
    /// [`StreamFormat::checked_packed`].
    pub fn packed(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self::checked_packed(width, height, pixel_format).unwrap_or(Self {
            width,
            height,
            pixel_format,
            stride: u32::MAX,
            frame_size: usize::MAX,
        })
    }

    /// Packed format, or `None` if the row or image size overflows
    pub fn checked_packed(width: u32, height: u32, pixel_format: PixelFormat) -> Option<Self> {
        let stride = width.checked_mul(pixel_format.bytes_per_pixel() as u32)?;
        let frame_size = (stride as usize).checked_mul(height as usize)?;
        Some(Self {
            width,
            height,
            pixel_format,
            stride,
            frame_size,
        })
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.pixel_format)
    }
}

/// Metadata of one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Bytes of valid payload in the slot
    pub payload_len: usize,
    /// Driver frame counter; a jump larger than one means frames were lost
    pub sequence: u32,
    pub captured_at: Instant,
}

/// Raw memory of one device buffer
///
/// The region stays valid until the owning device is dropped.
#[derive(Debug, Clone, Copy)]
pub struct SlotRegion {
    pub ptr: *const u8,
    pub len: usize,
}

// The region is only read through pinned views while its slot is InFlight
unsafe impl Send for SlotRegion {}
unsafe impl Sync for SlotRegion {}

/// A filled buffer returned by the device
#[derive(Debug, Clone, Copy)]
pub struct Dequeued {
    pub index: usize,
    pub bytes_used: usize,
    pub sequence: u32,
    pub timestamp: Instant,
}

/// Streaming capture device with a fixed set of driver-owned buffers
///
/// Buffers move between the device's incoming queue (`queue`) and its
/// outgoing queue (`dequeue`). The frame pool is the only caller.
pub trait CaptureDevice: Send {
    /// Negotiated stream format
    fn format(&self) -> StreamFormat;

    /// Number of buffers, fixed for the device lifetime
    fn buffer_count(&self) -> usize;

    /// Memory of buffer `index`
    fn region(&self, index: usize) -> SlotRegion;

    /// Hand buffer `index` to the driver for filling
    fn queue(&mut self, index: usize) -> io::Result<()>;

    /// Take the next filled buffer, or `None` if none is ready yet
    fn dequeue(&mut self) -> io::Result<Option<Dequeued>>;

    /// Begin streaming; called once after all buffers are queued
    fn start(&mut self) -> io::Result<()>;

    /// Stop streaming; the driver gives up every queued buffer
    fn stop(&mut self) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_values() {
        // V4L2_PIX_FMT_YUYV = v4l2_fourcc('Y','U','Y','V')
        assert_eq!(PixelFormat::YUYV.fourcc(), 0x5659_5559);
        for format in [
            PixelFormat::YUYV,
            PixelFormat::UYVY,
            PixelFormat::Gray8,
            PixelFormat::RGB24,
        ] {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(0), None);
    }

    #[test]
    fn test_packed_format_size() {
        let format = StreamFormat::packed(640, 480, PixelFormat::YUYV);
        assert_eq!(format.stride, 1280);
        assert_eq!(format.frame_size, 614_400);
        assert_eq!(format.to_string(), "640x480 YUYV");
    }
}
