// SPDX-License-Identifier: GPL-3.0-only

//! Pointer actuators
//!
//! [`UinputActuator`] creates a virtual absolute pointing device through
//! `/dev/uinput`. [`LoggingActuator`] only records positions and is used when
//! uinput is unavailable (no permission, headless CI).

use crate::frame_processor::Point;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use tracing::{debug, info, trace};

/// Moves the platform pointer
pub trait Actuator: Send {
    fn name(&self) -> &'static str;

    /// Place the pointer at display coordinates
    fn move_to(&mut self, position: Point) -> io::Result<()>;
}

const UINPUT_PATH: &str = "/dev/uinput";
const DEVICE_NAME: &[u8] = b"gazecursor virtual pointer";

// _IOW('U', nr, int) and _IO('U', nr)
const UI_SET_EVBIT: libc::c_ulong = 0x4004_5564;
const UI_SET_KEYBIT: libc::c_ulong = 0x4004_5565;
const UI_SET_ABSBIT: libc::c_ulong = 0x4004_5567;
const UI_DEV_CREATE: libc::c_ulong = 0x5501;
const UI_DEV_DESTROY: libc::c_ulong = 0x5502;

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_ABS: u16 = 0x03;
const SYN_REPORT: u16 = 0;
const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;
const BTN_LEFT: u16 = 0x110;
const BUS_VIRTUAL: u16 = 0x06;
const ABS_CNT: usize = 64;

#[repr(C)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

/// Legacy `struct uinput_user_dev` setup record
#[repr(C)]
struct UinputUserDev {
    name: [u8; 80],
    id: InputId,
    ff_effects_max: u32,
    absmax: [i32; ABS_CNT],
    absmin: [i32; ABS_CNT],
    absfuzz: [i32; ABS_CNT],
    absflat: [i32; ABS_CNT],
}

#[repr(C)]
struct InputEvent {
    time: libc::timeval,
    type_: u16,
    code: u16,
    value: i32,
}

fn as_bytes<T>(value: &T) -> &[u8] {
    // Plain repr(C) records with no padding-sensitive readers
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>()) }
}

fn uinput_ioctl(file: &File, request: libc::c_ulong, arg: libc::c_int) -> io::Result<()> {
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, arg) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Absolute pointer backed by a uinput device
pub struct UinputActuator {
    file: File,
}

impl UinputActuator {
    /// Create a virtual pointer covering `width` x `height`
    pub fn open(width: i32, height: i32) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(UINPUT_PATH)?;

        uinput_ioctl(&file, UI_SET_EVBIT, EV_KEY.into())?;
        uinput_ioctl(&file, UI_SET_KEYBIT, BTN_LEFT.into())?;
        uinput_ioctl(&file, UI_SET_EVBIT, EV_ABS.into())?;
        uinput_ioctl(&file, UI_SET_ABSBIT, ABS_X.into())?;
        uinput_ioctl(&file, UI_SET_ABSBIT, ABS_Y.into())?;
        uinput_ioctl(&file, UI_SET_EVBIT, EV_SYN.into())?;

        let mut setup: UinputUserDev = unsafe { std::mem::zeroed() };
        setup.name[..DEVICE_NAME.len()].copy_from_slice(DEVICE_NAME);
        setup.id = InputId {
            bustype: BUS_VIRTUAL,
            vendor: 0x1234,
            product: 0x5678,
            version: 1,
        };
        setup.absmax[ABS_X as usize] = width - 1;
        setup.absmax[ABS_Y as usize] = height - 1;
        file.write_all(as_bytes(&setup))?;

        uinput_ioctl(&file, UI_DEV_CREATE, 0)?;
        info!(width, height, "Created uinput pointer device");
        Ok(Self { file })
    }

    fn emit(&mut self, type_: u16, code: u16, value: i32) -> io::Result<()> {
        let event = InputEvent {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            type_,
            code,
            value,
        };
        self.file.write_all(as_bytes(&event))
    }
}

impl Actuator for UinputActuator {
    fn name(&self) -> &'static str {
        "uinput"
    }

    fn move_to(&mut self, position: Point) -> io::Result<()> {
        self.emit(EV_ABS, ABS_X, position.x)?;
        self.emit(EV_ABS, ABS_Y, position.y)?;
        self.emit(EV_SYN, SYN_REPORT, 0)?;
        trace!(x = position.x, y = position.y, "Pointer moved");
        Ok(())
    }
}

impl Drop for UinputActuator {
    fn drop(&mut self) {
        if let Err(e) = uinput_ioctl(&self.file, UI_DEV_DESTROY, 0) {
            debug!(error = %e, "Failed to destroy uinput device");
        }
    }
}

/// Actuator that only logs and remembers positions
#[derive(Debug, Default)]
pub struct LoggingActuator {
    last: Option<Point>,
    moves: u64,
}

impl LoggingActuator {
    pub fn last(&self) -> Option<Point> {
        self.last
    }

    pub fn moves(&self) -> u64 {
        self.moves
    }
}

impl Actuator for LoggingActuator {
    fn name(&self) -> &'static str {
        "log"
    }

    fn move_to(&mut self, position: Point) -> io::Result<()> {
        debug!(x = position.x, y = position.y, "Pointer position");
        self.last = Some(position);
        self.moves += 1;
        Ok(())
    }
}
