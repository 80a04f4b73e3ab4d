// SPDX-License-Identifier: GPL-3.0-only

//! Fixed pool of device-backed frame buffers
//!
//! Every slot is in exactly one of three states:
//!
//! ```text
//!   Free ──queue──▶ QueuedToDevice ──acquire──▶ InFlight
//!    ▲                    ▲                         │
//!    └── queue failed ────┴──────── reclaim ◀───────┘
//! ```
//!
//! `acquire` hands out a [`SlotLease`], the single-use completion token of an
//! InFlight slot. Dropping the lease reclaims the slot exactly once. Each
//! grant bumps the slot's generation, so a lease whose slot was force-
//! reclaimed meanwhile is recognised as stale and ignored.

use super::types::{CaptureDevice, DeviceError, DeviceResult, SlotRegion, StreamFormat};
use crate::errors::FrameError;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// Owned by nobody; must be queued before the device can fill it
    Free = 0,
    /// Owned by the device driver
    QueuedToDevice = 1,
    /// Owned by a lease holder
    InFlight = 2,
}

impl SlotState {
    fn from_bits(value: u64) -> Self {
        match value & STATE_MASK {
            1 => SlotState::QueuedToDevice,
            2 => SlotState::InFlight,
            _ => SlotState::Free,
        }
    }
}

const STATE_BITS: u32 = 8;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

/// Generation and state packed into one word so every ownership change is a
/// single compare-exchange
fn pack(generation: u64, state: SlotState) -> u64 {
    (generation << STATE_BITS) | state as u64
}

fn generation_of(word: u64) -> u64 {
    word >> STATE_BITS
}

struct FrameSlot {
    region: SlotRegion,
    word: AtomicU64,
    /// Held shared while a consumer reads the region; forced reclaim needs it exclusive
    pin: RwLock<()>,
}

impl FrameSlot {
    fn load(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    fn state(&self) -> SlotState {
        SlotState::from_bits(self.load())
    }

    fn generation(&self) -> u64 {
        generation_of(self.load())
    }

    fn swap_word(&self, current: u64, new: u64) -> bool {
        self.word
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Counters describing pool health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: u64,
    pub reclaimed: u64,
    pub forced_reclaims: u64,
    pub stale_releases: u64,
}

/// Fixed set of device buffers with ownership tracking
pub struct FrameBufferPool {
    device: Mutex<Box<dyn CaptureDevice>>,
    slots: Box<[FrameSlot]>,
    format: StreamFormat,
    acquired: AtomicU64,
    reclaimed: AtomicU64,
    forced_reclaims: AtomicU64,
    stale_releases: AtomicU64,
}

impl FrameBufferPool {
    /// Take ownership of `device`, queue every buffer and start streaming
    pub fn new(mut device: Box<dyn CaptureDevice>) -> DeviceResult<Arc<Self>> {
        let count = device.buffer_count();
        if count == 0 {
            return Err(DeviceError::NotEnoughBuffers {
                granted: 0,
                required: 1,
            });
        }

        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            device
                .queue(index)
                .map_err(|source| DeviceError::Queue { index, source })?;
            slots.push(FrameSlot {
                region: device.region(index),
                word: AtomicU64::new(pack(0, SlotState::QueuedToDevice)),
                pin: RwLock::new(()),
            });
        }
        device.start().map_err(DeviceError::StreamOn)?;

        let format = device.format();
        info!(slots = count, format = %format, "Frame buffer pool ready");

        Ok(Arc::new(Self {
            device: Mutex::new(device),
            slots: slots.into_boxed_slice(),
            format,
            acquired: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            forced_reclaims: AtomicU64::new(0),
            stale_releases: AtomicU64::new(0),
        }))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// State of slot `index`, or `None` outside the pool
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(FrameSlot::state)
    }

    pub fn count_in(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|s| s.state() == state).count()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            forced_reclaims: self.forced_reclaims.load(Ordering::Relaxed),
            stale_releases: self.stale_releases.load(Ordering::Relaxed),
        }
    }

    /// Try to take a filled buffer from the device without blocking
    ///
    /// `Ok(None)` means no buffer is ready yet, which is the normal outcome
    /// when polling faster than the camera's frame rate.
    pub fn acquire(self: &Arc<Self>) -> io::Result<Option<SlotLease>> {
        let dequeued = match self.device.lock().dequeue()? {
            Some(d) => d,
            None => return Ok(None),
        };

        let Some(slot) = self.slots.get(dequeued.index) else {
            warn!(index = dequeued.index, slots = self.slots.len(), "Device returned buffer outside pool");
            return Ok(None);
        };

        let word = slot.load();
        let generation = generation_of(word) + 1;
        if SlotState::from_bits(word) != SlotState::QueuedToDevice
            || !slot.swap_word(word, pack(generation, SlotState::InFlight))
        {
            warn!(
                index = dequeued.index,
                state = ?slot.state(),
                "Device returned buffer that was not queued"
            );
            return Ok(None);
        }

        self.acquired.fetch_add(1, Ordering::Relaxed);
        trace!(index = dequeued.index, generation, sequence = dequeued.sequence, "Slot acquired");

        Ok(Some(SlotLease {
            pool: Arc::clone(self),
            index: dequeued.index,
            generation,
            bytes_used: dequeued.bytes_used.min(slot.region.len),
            sequence: dequeued.sequence,
            timestamp: dequeued.timestamp,
        }))
    }

    /// Return a slot to the device when its lease completes
    fn reclaim(&self, index: usize, generation: u64) {
        let slot = &self.slots[index];

        // Fails if a forced reclaim already took the slot from this lease
        if !slot.swap_word(
            pack(generation, SlotState::InFlight),
            pack(generation, SlotState::Free),
        ) {
            self.stale_releases.fetch_add(1, Ordering::Relaxed);
            debug!(index, generation, current = slot.generation(), "Ignoring stale slot release");
            return;
        }

        self.requeue(index);
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue a Free slot back to the device
    fn requeue(&self, index: usize) -> bool {
        let slot = &self.slots[index];
        let mut device = self.device.lock();

        let word = slot.load();
        if SlotState::from_bits(word) != SlotState::Free {
            return false;
        }
        let queued = pack(generation_of(word), SlotState::QueuedToDevice);
        if !slot.swap_word(word, queued) {
            return false;
        }

        match device.queue(index) {
            Ok(()) => {
                trace!(index, "Slot requeued");
                true
            }
            Err(e) => {
                // Left Free; requeue_free retries on the next capture cycle
                slot.word.store(word, Ordering::Release);
                warn!(index, error = %e, "Failed to requeue slot");
                false
            }
        }
    }

    /// Retry queueing any slot left Free by an earlier failure
    pub fn requeue_free(&self) -> usize {
        (0..self.slots.len())
            .filter(|&i| self.slots[i].state() == SlotState::Free && self.requeue(i))
            .count()
    }

    /// Take an InFlight slot away from its lease holder and requeue it
    ///
    /// Fails if the slot is not InFlight or a consumer is reading it right
    /// now. The outstanding lease becomes stale; its views report
    /// [`FrameError::Revoked`] and its drop is ignored.
    pub fn force_reclaim(&self, index: usize) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };
        let Some(_exclusive) = slot.pin.try_write() else {
            debug!(index, "Slot pinned by a reader, cannot force reclaim");
            return false;
        };

        let word = slot.load();
        if SlotState::from_bits(word) != SlotState::InFlight
            || !slot.swap_word(word, pack(generation_of(word) + 1, SlotState::Free))
        {
            return false;
        }

        self.forced_reclaims.fetch_add(1, Ordering::Relaxed);
        self.requeue(index);
        true
    }
}

impl Drop for FrameBufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.device.get_mut().stop() {
            warn!(error = %e, "Failed to stop capture device");
        }
        let stats = self.stats();
        debug!(
            acquired = stats.acquired,
            reclaimed = stats.reclaimed,
            forced = stats.forced_reclaims,
            stale = stats.stale_releases,
            "Frame buffer pool dropped"
        );
    }
}

/// Exclusive claim on one InFlight slot
///
/// Not `Clone`: there is exactly one lease per grant, and dropping it is the
/// only way the slot goes back through the normal reclaim path.
pub struct SlotLease {
    pool: Arc<FrameBufferPool>,
    index: usize,
    generation: u64,
    bytes_used: usize,
    sequence: u32,
    timestamp: Instant,
}

impl SlotLease {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Whether the slot still belongs to this lease
    pub fn is_valid(&self) -> bool {
        self.pool.slots[self.index].load() == pack(self.generation, SlotState::InFlight)
    }

    /// Pin the slot and borrow its filled bytes
    pub fn pin(&self) -> Result<PinnedBytes<'_>, FrameError> {
        let slot = &self.pool.slots[self.index];
        let guard = slot.pin.read();
        if slot.load() != pack(self.generation, SlotState::InFlight) {
            return Err(FrameError::Revoked { index: self.index });
        }
        // The region outlives the pool's device, and the read pin keeps forced
        // reclaim from handing it back to the driver while borrowed.
        let data = unsafe { std::slice::from_raw_parts(slot.region.ptr, self.bytes_used) };
        Ok(PinnedBytes {
            _guard: guard,
            data,
        })
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.reclaim(self.index, self.generation);
    }
}

impl std::fmt::Debug for SlotLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotLease")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .field("bytes_used", &self.bytes_used)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Borrowed view of a slot's bytes, valid while the pin is held
pub struct PinnedBytes<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    data: &'a [u8],
}

impl std::ops::Deref for PinnedBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl AsRef<[u8]> for PinnedBytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;
    use crate::backends::virtual_camera::VirtualCamera;

    fn pool(slots: usize) -> Arc<FrameBufferPool> {
        let format = StreamFormat::packed(8, 4, PixelFormat::YUYV);
        FrameBufferPool::new(Box::new(VirtualCamera::new(format, slots))).unwrap()
    }

    #[test]
    fn test_all_slots_queued_at_start() {
        let pool = pool(4);
        assert_eq!(pool.count_in(SlotState::QueuedToDevice), 4);
        assert_eq!(pool.slot_state(4), None);
    }

    #[test]
    fn test_lease_drop_requeues() {
        let pool = pool(2);
        let lease = pool.acquire().unwrap().unwrap();
        let index = lease.index();
        assert_eq!(pool.slot_state(index), Some(SlotState::InFlight));

        drop(lease);
        assert_eq!(pool.slot_state(index), Some(SlotState::QueuedToDevice));
        assert_eq!(pool.stats().reclaimed, 1);
    }

    #[test]
    fn test_exhausted_pool_returns_none() {
        let pool = pool(2);
        let _a = pool.acquire().unwrap().unwrap();
        let _b = pool.acquire().unwrap().unwrap();
        assert!(pool.acquire().unwrap().is_none());
    }

    #[test]
    fn test_forced_reclaim_revokes_lease() {
        let pool = pool(1);
        let lease = pool.acquire().unwrap().unwrap();
        assert!(pool.force_reclaim(lease.index()));
        assert!(!lease.is_valid());
        assert_eq!(lease.pin().err(), Some(FrameError::Revoked { index: 0 }));

        // The stale lease must not requeue a second time
        drop(lease);
        let stats = pool.stats();
        assert_eq!(stats.stale_releases, 1);
        assert_eq!(stats.reclaimed, 0);
        assert_eq!(pool.slot_state(0), Some(SlotState::QueuedToDevice));
    }

    #[test]
    fn test_pinned_slot_not_forced() {
        let pool = pool(1);
        let lease = pool.acquire().unwrap().unwrap();
        let bytes = lease.pin().unwrap();
        assert!(!pool.force_reclaim(0));
        assert_eq!(bytes.len(), 64);
        drop(bytes);
        assert!(pool.force_reclaim(0));
    }

    #[test]
    fn test_force_reclaim_ignores_queued_slot() {
        let pool = pool(2);
        assert!(!pool.force_reclaim(0));
        assert!(!pool.force_reclaim(7));
    }
}
