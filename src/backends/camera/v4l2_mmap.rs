// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture device with driver-allocated mmap buffers

use super::types::{
    CaptureDevice, Dequeued, DeviceError, DeviceResult, PixelFormat, SlotRegion, StreamFormat,
};
use super::v4l2_utils;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// One buffer mapped into our address space
struct MappedBuffer {
    ptr: *mut libc::c_void,
    len: usize,
}

/// Streaming V4L2 capture device
///
/// Owns the opened node and every mapping. Dropping it stops streaming and
/// unmaps; the frame pool keeps it alive as long as any slot view exists.
pub struct V4l2MmapDevice {
    // Held for the fd; buffers are managed through raw ioctls
    _device: Device,
    fd: RawFd,
    path: PathBuf,
    format: StreamFormat,
    buffers: Vec<MappedBuffer>,
    streaming: bool,
}

// The mappings are process memory; access is serialised by the pool
unsafe impl Send for V4l2MmapDevice {}

impl V4l2MmapDevice {
    /// Open `path`, negotiate the format and map `buffer_count` buffers
    pub fn open(
        path: &Path,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        buffer_count: usize,
    ) -> DeviceResult<Self> {
        let device = Device::with_path(path).map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let fd = device.handle().fd();

        let caps = v4l2_utils::query_capabilities(fd).map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let required = v4l2_utils::CAP_VIDEO_CAPTURE | v4l2_utils::CAP_STREAMING;
        if caps.node_caps() & required != required {
            return Err(DeviceError::NotCaptureDevice {
                path: path.to_path_buf(),
            });
        }

        v4l2_utils::set_nonblocking(fd).map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let format = negotiate_format(&device, width, height, pixel_format)?;
        info!(
            path = %path.display(),
            card = %caps.card_name(),
            driver = %caps.driver_name(),
            format = %format,
            "V4L2 capture format configured"
        );

        let granted = v4l2_utils::request_buffers(fd, buffer_count as u32)
            .map_err(DeviceError::RequestBuffers)? as usize;
        if granted < buffer_count {
            return Err(DeviceError::NotEnoughBuffers {
                granted,
                required: buffer_count,
            });
        }

        let mut this = Self {
            _device: device,
            fd,
            path: path.to_path_buf(),
            format,
            buffers: Vec::with_capacity(granted),
            streaming: false,
        };

        // Partially mapped buffers are unmapped by Drop on the error path
        for index in 0..granted {
            let mapped = map_buffer(fd, index).map_err(|source| DeviceError::Map { index, source })?;
            this.buffers.push(mapped);
        }

        debug!(path = %this.path.display(), buffers = granted, "Mapped capture buffers");
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn negotiate_format(
    device: &Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
) -> DeviceResult<StreamFormat> {
    let fourcc = FourCC::new(&pixel_format.fourcc().to_le_bytes());
    let requested = Format::new(width, height, fourcc);
    let actual = device
        .set_format(&requested)
        .map_err(|e| DeviceError::FormatNotSupported(format!("{}x{} {}: {}", width, height, pixel_format, e)))?;

    let actual_format = PixelFormat::from_fourcc(u32::from_le_bytes(actual.fourcc.repr))
        .ok_or_else(|| DeviceError::FormatNotSupported(format!("driver chose {}", actual.fourcc)))?;

    if actual.width != width || actual.height != height {
        warn!(
            requested = format!("{}x{}", width, height),
            actual = format!("{}x{}", actual.width, actual.height),
            "Driver adjusted capture resolution"
        );
    }

    Ok(StreamFormat {
        width: actual.width,
        height: actual.height,
        pixel_format: actual_format,
        stride: actual.stride,
        frame_size: actual.size as usize,
    })
}

fn map_buffer(fd: RawFd, index: usize) -> io::Result<MappedBuffer> {
    let desc = v4l2_utils::query_buffer(fd, index as u32)?;
    let len = desc.length as usize;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            desc.mmap_offset(),
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(MappedBuffer { ptr, len })
}

impl CaptureDevice for V4l2MmapDevice {
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
        if index >= self.buffers.len() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        v4l2_utils::queue_buffer(self.fd, index as u32)
    }

    fn dequeue(&mut self) -> io::Result<Option<Dequeued>> {
        let Some(buf) = v4l2_utils::dequeue_buffer(self.fd)? else {
            return Ok(None);
        };
        Ok(Some(Dequeued {
            index: buf.index as usize,
            bytes_used: buf.bytesused as usize,
            sequence: buf.sequence,
            timestamp: Instant::now(),
        }))
    }

    fn start(&mut self) -> io::Result<()> {
        v4l2_utils::stream_on(self.fd)?;
        self.streaming = true;
        info!(path = %self.path.display(), "Capture streaming started");
        Ok(())
    }

    fn stop(&mut self) -> io::Result<()> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        v4l2_utils::stream_off(self.fd)?;
        info!(path = %self.path.display(), "Capture streaming stopped");
        Ok(())
    }
}

impl Drop for V4l2MmapDevice {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(path = %self.path.display(), error = %e, "STREAMOFF failed");
        }
        for buffer in self.buffers.drain(..) {
            if unsafe { libc::munmap(buffer.ptr, buffer.len) } != 0 {
                warn!(error = %io::Error::last_os_error(), "munmap failed");
            }
        }
        // Release the driver's buffers before the fd closes
        if let Err(e) = v4l2_utils::request_buffers(self.fd, 0) {
            debug!(error = %e, "Failed to free driver buffers");
        }
    }
}
