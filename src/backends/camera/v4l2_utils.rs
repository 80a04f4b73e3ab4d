// SPDX-License-Identifier: GPL-3.0-only

//! Raw V4L2 ioctls for mmap streaming
//!
//! The `v4l` crate's stream types own their buffers and block on dequeue.
//! The frame pool needs per-index queue control and a non-blocking dequeue,
//! so buffer management talks to the driver directly.

use std::io;
use std::os::unix::io::RawFd;
use tracing::debug;

/// V4L2_BUF_TYPE_VIDEO_CAPTURE
pub const BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
/// V4L2_MEMORY_MMAP
pub const MEMORY_MMAP: u32 = 1;
/// V4L2_CAP_VIDEO_CAPTURE
pub const CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
/// V4L2_CAP_STREAMING
pub const CAP_STREAMING: u32 = 0x0400_0000;

const IOC_WRITE: libc::c_ulong = 1;
const IOC_READ: libc::c_ulong = 2;

/// `_IOC(dir, 'V', nr, size)`
const fn v4l2_ioc(dir: libc::c_ulong, nr: u8, size: usize) -> libc::c_ulong {
    (dir << 30) | ((size as libc::c_ulong) << 16) | ((b'V' as libc::c_ulong) << 8) | nr as libc::c_ulong
}

const VIDIOC_QUERYCAP: libc::c_ulong =
    v4l2_ioc(IOC_READ, 0, std::mem::size_of::<V4l2Capability>());
const VIDIOC_REQBUFS: libc::c_ulong = v4l2_ioc(
    IOC_READ | IOC_WRITE,
    8,
    std::mem::size_of::<V4l2RequestBuffers>(),
);
const VIDIOC_QUERYBUF: libc::c_ulong =
    v4l2_ioc(IOC_READ | IOC_WRITE, 9, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_QBUF: libc::c_ulong =
    v4l2_ioc(IOC_READ | IOC_WRITE, 15, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_DQBUF: libc::c_ulong =
    v4l2_ioc(IOC_READ | IOC_WRITE, 17, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_STREAMON: libc::c_ulong =
    v4l2_ioc(IOC_WRITE, 18, std::mem::size_of::<libc::c_int>());
const VIDIOC_STREAMOFF: libc::c_ulong =
    v4l2_ioc(IOC_WRITE, 19, std::mem::size_of::<libc::c_int>());

/// V4L2 capability structure for VIDIOC_QUERYCAP ioctl
#[repr(C)]
pub struct V4l2Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    reserved: [u32; 3],
}

impl V4l2Capability {
    /// Capabilities of the opened node, preferring `device_caps`
    pub fn node_caps(&self) -> u32 {
        if self.device_caps != 0 {
            self.device_caps
        } else {
            self.capabilities
        }
    }

    pub fn driver_name(&self) -> String {
        c_string(&self.driver)
    }

    pub fn card_name(&self) -> String {
        c_string(&self.card)
    }
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).to_string()
}

#[repr(C)]
struct V4l2RequestBuffers {
    count: u32,
    type_: u32,
    memory: u32,
    capabilities: u32,
    flags: u8,
    reserved: [u8; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct V4l2Timecode {
    type_: u32,
    flags: u32,
    frames: u8,
    seconds: u8,
    minutes: u8,
    hours: u8,
    userbits: [u8; 4],
}

/// `struct v4l2_buffer`; the `m` union is read as its widest member
#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Buffer {
    pub index: u32,
    type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    field: u32,
    pub timestamp: libc::timeval,
    timecode: V4l2Timecode,
    pub sequence: u32,
    memory: u32,
    m: libc::c_ulong,
    pub length: u32,
    reserved2: u32,
    request_fd: i32,
}

impl V4l2Buffer {
    /// Zeroed mmap capture buffer descriptor for `index`
    pub fn capture(index: u32) -> Self {
        let mut buf: Self = unsafe { std::mem::zeroed() };
        buf.index = index;
        buf.type_ = BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = MEMORY_MMAP;
        buf
    }

    /// Offset to pass to mmap, from the `m.offset` union member
    pub fn mmap_offset(&self) -> libc::off_t {
        (self.m as u32) as libc::off_t
    }
}

fn ioctl<T>(fd: RawFd, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
    loop {
        let result = unsafe { libc::ioctl(fd, request as _, arg as *mut T) };
        if result >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Query V4L2 capabilities for an open file descriptor
pub fn query_capabilities(fd: RawFd) -> io::Result<V4l2Capability> {
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    ioctl(fd, VIDIOC_QUERYCAP, &mut cap)?;
    debug!(
        driver = %cap.driver_name(),
        card = %cap.card_name(),
        caps = format!("{:#010x}", cap.node_caps()),
        "Queried V4L2 capabilities"
    );
    Ok(cap)
}

/// Ask the driver for `count` mmap buffers; returns how many it granted
pub fn request_buffers(fd: RawFd, count: u32) -> io::Result<u32> {
    let mut req: V4l2RequestBuffers = unsafe { std::mem::zeroed() };
    req.count = count;
    req.type_ = BUF_TYPE_VIDEO_CAPTURE;
    req.memory = MEMORY_MMAP;
    ioctl(fd, VIDIOC_REQBUFS, &mut req)?;
    Ok(req.count)
}

/// Describe buffer `index` (length and mmap offset)
pub fn query_buffer(fd: RawFd, index: u32) -> io::Result<V4l2Buffer> {
    let mut buf = V4l2Buffer::capture(index);
    ioctl(fd, VIDIOC_QUERYBUF, &mut buf)?;
    Ok(buf)
}

/// Hand buffer `index` to the driver
pub fn queue_buffer(fd: RawFd, index: u32) -> io::Result<()> {
    let mut buf = V4l2Buffer::capture(index);
    ioctl(fd, VIDIOC_QBUF, &mut buf)
}

/// Take a filled buffer; `Ok(None)` when the fd is non-blocking and none is ready
pub fn dequeue_buffer(fd: RawFd) -> io::Result<Option<V4l2Buffer>> {
    let mut buf = V4l2Buffer::capture(0);
    match ioctl(fd, VIDIOC_DQBUF, &mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn stream_on(fd: RawFd) -> io::Result<()> {
    let mut type_ = BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
    ioctl(fd, VIDIOC_STREAMON, &mut type_)
}

pub fn stream_off(fd: RawFd) -> io::Result<()> {
    let mut type_ = BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
    ioctl(fd, VIDIOC_STREAMOFF, &mut type_)
}

/// Make reads and dequeues on `fd` return EAGAIN instead of blocking
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK == 0
        && unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_querycap_number() {
        // _IOR('V', 0, struct v4l2_capability)
        assert_eq!(VIDIOC_QUERYCAP, 0x8068_5600);
        assert_eq!(VIDIOC_REQBUFS, 0xc014_5608);
        assert_eq!(VIDIOC_STREAMON, 0x4004_5612);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_buffer_layout_64bit() {
        assert_eq!(std::mem::size_of::<V4l2Buffer>(), 88);
        assert_eq!(VIDIOC_QBUF, 0xc058_560f);
        assert_eq!(VIDIOC_DQBUF, 0xc058_5611);
    }

    #[test]
    fn test_c_string_stops_at_nul() {
        assert_eq!(c_string(b"uvcvideo\0\0\0"), "uvcvideo");
        assert_eq!(c_string(b"full"), "full");
    }
}
