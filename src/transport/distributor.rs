// SPDX-License-Identifier: GPL-3.0-only

//! Frame fan-out to bounded subscriber queues
//!
//! Each published frame becomes one [`FrameMessage`] per subscriber: a
//! copy of the 24-byte header plus a shared reference to the frame. Payload
//! bytes are never copied. When the last message referencing a frame is
//! dropped, the frame's lease completes and its slot goes back to the device.
//!
//! Publishing never blocks. A subscriber whose queue is at its high-water
//! mark simply misses that message.

use super::wire::FrameHeader;
use crate::backends::camera::{Frame, FrameMeta};
use crate::errors::FrameError;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Payload carried after the header
#[derive(Clone)]
pub enum FramePayload {
    /// Zero-copy reference to a pool slot
    Mapped(Arc<Frame>),
    /// Owned bytes (tests, replays, frames from outside the pool)
    Copied(Arc<[u8]>),
}

impl FramePayload {
    /// Run `f` over the payload bytes
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, FrameError> {
        match self {
            FramePayload::Mapped(frame) => {
                let bytes = frame.bytes()?;
                Ok(f(&bytes))
            }
            FramePayload::Copied(data) => Ok(f(data)),
        }
    }

    /// Frame metadata when the payload is a pool frame
    pub fn frame_meta(&self) -> Option<&FrameMeta> {
        match self {
            FramePayload::Mapped(frame) => Some(frame.meta()),
            FramePayload::Copied(_) => None,
        }
    }
}

impl std::fmt::Debug for FramePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramePayload::Mapped(frame) => write!(f, "FramePayload::Mapped(slot {})", frame.slot_index()),
            FramePayload::Copied(data) => write!(f, "FramePayload::Copied({} bytes)", data.len()),
        }
    }
}

/// Header bytes followed by a payload, as queued to one subscriber
#[derive(Debug, Clone)]
pub struct FrameMessage {
    header: Vec<u8>,
    payload: FramePayload,
}

impl FrameMessage {
    /// Message for a pool frame
    pub fn from_frame(frame: Arc<Frame>) -> Self {
        let header = FrameHeader::from_meta(frame.meta()).encode();
        Self {
            header: header.to_vec(),
            payload: FramePayload::Mapped(frame),
        }
    }

    /// Message from raw parts; nothing is validated until receipt
    pub fn from_parts(header: impl Into<Vec<u8>>, payload: FramePayload) -> Self {
        Self {
            header: header.into(),
            payload,
        }
    }

    pub fn header_bytes(&self) -> &[u8] {
        &self.header
    }

    pub fn payload(&self) -> &FramePayload {
        &self.payload
    }

    /// Validate header and payload length together
    pub fn validate(&self) -> Result<FrameHeader, FrameError> {
        let header = FrameHeader::decode(&self.header)?;
        let received = self.payload.with_bytes(<[u8]>::len)?;
        header.check_payload(received)?;
        header.check_image()?;
        Ok(header)
    }
}

/// A validated message handed to a consumer
#[derive(Debug)]
pub struct ReceivedFrame {
    pub header: FrameHeader,
    pub payload: FramePayload,
}

/// Result of one publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

struct SubscriberQueue {
    name: String,
    sender: Sender<FrameMessage>,
    dropped: Arc<AtomicU64>,
}

/// Fans frames out to every subscriber without copying payloads
pub struct FrameDistributor {
    high_water_mark: usize,
    subscribers: Vec<SubscriberQueue>,
    published: AtomicU64,
}

impl FrameDistributor {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            high_water_mark: high_water_mark.max(1),
            subscribers: Vec::new(),
            published: AtomicU64::new(0),
        }
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Add a subscriber queue holding at most the high-water mark
    pub fn subscribe(&mut self, name: impl Into<String>) -> Subscription {
        let name = name.into();
        let (sender, receiver) = bounded(self.high_water_mark);
        let dropped = Arc::new(AtomicU64::new(0));
        debug!(subscriber = %name, hwm = self.high_water_mark, "Subscriber added");

        self.subscribers.push(SubscriberQueue {
            name: name.clone(),
            sender,
            dropped: Arc::clone(&dropped),
        });

        Subscription {
            name,
            receiver,
            dropped,
            rejected: 0,
            last_sequence: None,
            gaps: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Frames handed to `publish` so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Offer `frame` to every subscriber
    ///
    /// The slot is reclaimed once every queued copy has been consumed or
    /// dropped, or immediately if nobody accepted it.
    pub fn publish(&self, frame: Frame) -> PublishOutcome {
        self.published.fetch_add(1, Ordering::Relaxed);
        let message = FrameMessage::from_frame(Arc::new(frame));
        self.publish_message(message)
    }

    /// Offer a prepared message to every subscriber
    pub fn publish_message(&self, message: FrameMessage) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();

        for subscriber in &self.subscribers {
            match subscriber.sender.try_send(message.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                    outcome.dropped += 1;
                    trace!(subscriber = %subscriber.name, "Subscriber queue full, message dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                    outcome.dropped += 1;
                    trace!(subscriber = %subscriber.name, "Subscriber gone, message dropped");
                }
            }
        }
        outcome
    }
}

/// Receiving end of one subscriber queue
pub struct Subscription {
    name: String,
    receiver: Receiver<FrameMessage>,
    dropped: Arc<AtomicU64>,
    rejected: u64,
    last_sequence: Option<u32>,
    gaps: u64,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages currently queued
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Messages the publisher dropped because this queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages discarded on receipt as malformed
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Discontinuities seen in the capture sequence of received frames
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Next well-formed frame, skipping malformed ones, without blocking
    pub fn try_recv_frame(&mut self) -> Option<ReceivedFrame> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if let Some(frame) = self.accept(message) {
                        return Some(frame);
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Wait up to `timeout` for the next well-formed frame
    pub fn recv_frame_timeout(&mut self, timeout: Duration) -> Option<ReceivedFrame> {
        loop {
            match self.receiver.recv_timeout(timeout) {
                Ok(message) => {
                    if let Some(frame) = self.accept(message) {
                        return Some(frame);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Drop everything queued except the newest well-formed frame
    pub fn latest_frame(&mut self) -> Option<ReceivedFrame> {
        let mut latest = None;
        while let Some(frame) = self.try_recv_frame() {
            latest = Some(frame);
        }
        latest
    }

    fn accept(&mut self, message: FrameMessage) -> Option<ReceivedFrame> {
        let header = match message.validate() {
            Ok(header) => header,
            Err(e @ FrameError::Revoked { .. }) => {
                self.rejected += 1;
                debug!(subscriber = %self.name, error = %e, "Discarding recycled frame");
                return None;
            }
            Err(e) => {
                self.rejected += 1;
                warn!(subscriber = %self.name, error = %e, "Discarding malformed frame message");
                return None;
            }
        };

        if let Some(meta) = message.payload.frame_meta() {
            if let Some(last) = self.last_sequence
                && meta.sequence != last.wrapping_add(1)
            {
                self.gaps += 1;
            }
            self.last_sequence = Some(meta.sequence);
        }

        Some(ReceivedFrame {
            header,
            payload: message.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copied(len: usize, declared: u64) -> FrameMessage {
        let header = FrameHeader {
            width: 4,
            height: 2,
            pixel_format: 0,
            payload_len: declared,
        };
        FrameMessage::from_parts(
            header.encode(),
            FramePayload::Copied(vec![0u8; len].into()),
        )
    }

    #[test]
    fn test_publish_without_subscribers() {
        let distributor = FrameDistributor::new(4);
        let outcome = distributor.publish_message(copied(8, 8));
        assert_eq!(outcome, PublishOutcome::default());
    }

    #[test]
    fn test_full_queue_drops_only_that_subscriber() {
        let mut distributor = FrameDistributor::new(1);
        let slow = distributor.subscribe("slow");
        let mut fast = distributor.subscribe("fast");

        distributor.publish_message(copied(8, 8));
        assert!(fast.try_recv_frame().is_some());
        let outcome = distributor.publish_message(copied(8, 8));

        assert_eq!(outcome, PublishOutcome { delivered: 1, dropped: 1 });
        assert_eq!(slow.dropped(), 1);
        assert_eq!(fast.dropped(), 0);
    }

    #[test]
    fn test_malformed_message_skipped() {
        let mut distributor = FrameDistributor::new(4);
        let mut sub = distributor.subscribe("sub");

        distributor.publish_message(FrameMessage::from_parts(
            vec![0u8; 10],
            FramePayload::Copied(vec![0u8; 8].into()),
        ));
        distributor.publish_message(copied(8, 8));

        let frame = sub.try_recv_frame().unwrap();
        assert_eq!(frame.header.payload_len, 8);
        assert_eq!(sub.rejected(), 1);
    }

    #[test]
    fn test_dropped_subscription_counts_as_drop() {
        let mut distributor = FrameDistributor::new(2);
        drop(distributor.subscribe("gone"));
        let outcome = distributor.publish_message(copied(8, 8));
        assert_eq!(outcome.dropped, 1);
    }
}
