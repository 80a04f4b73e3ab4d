// SPDX-License-Identifier: GPL-3.0-only

//! Thread placement: CPU affinity and SCHED_FIFO priority
//!
//! Both operations need privileges (CAP_SYS_NICE for FIFO) that are often
//! missing on developer machines, so callers log failures and keep running
//! under the default policy.

use crate::constants::scheduler::{FIFO_PRIORITY_MAX, FIFO_PRIORITY_MIN};
use std::io;
use tracing::{debug, warn};

/// Valid SCHED_FIFO priority range reported by the kernel
pub fn fifo_priority_range() -> (i32, i32) {
    let min = unsafe { libc::sched_get_priority_min(libc::SCHED_FIFO) };
    let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    if min < 0 || max < 0 || min > max {
        (FIFO_PRIORITY_MIN, FIFO_PRIORITY_MAX)
    } else {
        (min, max)
    }
}

/// Pin the calling thread to a single CPU core
pub fn pin_to_core(core: usize) -> io::Result<()> {
    let max_cpus = 8 * std::mem::size_of::<libc::cpu_set_t>();
    if core >= max_cpus {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core {} exceeds cpu_set_t capacity {}", core, max_cpus),
        ));
    }

    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        // pid 0 targets the calling thread
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Switch the calling thread to SCHED_FIFO at the given priority
pub fn set_fifo_priority(priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // pthread_setschedparam returns the error number instead of setting errno
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

/// Time since boot from CLOCK_MONOTONIC, as used for log and file stamps
pub fn monotonic_now() -> std::time::Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC cannot fail with a valid pointer
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    std::time::Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

/// Apply affinity and priority for a task thread, logging failures
///
/// Returns true when both settings took effect.
pub fn configure_current_thread(name: &str, core: usize, priority: i32) -> bool {
    let mut applied = true;

    if let Err(e) = pin_to_core(core) {
        warn!(task = %name, core, error = %e, "Failed to set CPU affinity, continuing unpinned");
        applied = false;
    }

    if let Err(e) = set_fifo_priority(priority) {
        warn!(
            task = %name,
            priority,
            error = %e,
            "Failed to set SCHED_FIFO priority, continuing under default policy"
        );
        applied = false;
    }

    if applied {
        debug!(task = %name, core, priority, "Thread pinned with real-time priority");
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let a = monotonic_now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(monotonic_now() > a);
    }

    #[test]
    fn test_fifo_range_is_ordered() {
        let (min, max) = fifo_priority_range();
        assert!(min >= 1);
        assert!(min <= max);
    }

    #[test]
    fn test_pin_rejects_core_beyond_set() {
        let err = pin_to_core(1 << 20).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_pin_to_core_zero() {
        let pinned = std::thread::spawn(|| -> io::Result<bool> {
            pin_to_core(0)?;
            let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
            let rc = unsafe {
                libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(unsafe { libc::CPU_ISSET(0, &set) && !libc::CPU_ISSET(1, &set) })
        })
        .join()
        .unwrap();

        match pinned {
            Ok(only_core_zero) => assert!(only_core_zero),
            // Containers may forbid the call or exclude core 0 from the cpuset
            Err(e) => assert!(
                matches!(
                    e.kind(),
                    io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
                ),
                "unexpected error {e}"
            ),
        }
    }
}
