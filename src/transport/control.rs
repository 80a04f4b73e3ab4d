// SPDX-License-Identifier: GPL-3.0-only

//! Small bounded queues for derived results between stages
//!
//! Producers never block: a full channel drops the new message. Consumers
//! poll opportunistically. Payloads are short text tokens such as
//! `FaceCenter:<x>,<y>` or `Center: <x> x <y> ,Cursor: <x> x <y>`.

use crate::sched::monotonic_now;
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Prefix of detector results
pub const FACE_CENTER_PREFIX: &str = "FaceCenter:";
/// Shorter prefix accepted from older producers
pub const CENTER_PREFIX: &str = "Center:";

/// One message with the time it was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub text: String,
    pub created_at: Instant,
    /// CLOCK_MONOTONIC stamp written to logs
    pub stamp: Duration,
}

impl ControlMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            created_at: Instant::now(),
            stamp: monotonic_now(),
        }
    }
}

/// Named bounded channel; use [`ControlChannel::bounded`] to get both ends
pub struct ControlChannel;

impl ControlChannel {
    pub fn bounded(name: impl Into<String>, capacity: usize) -> (ControlSender, ControlReceiver) {
        let (sender, receiver) = bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let name: Arc<str> = Arc::from(name.into());
        (
            ControlSender {
                name: Arc::clone(&name),
                sender,
                dropped: Arc::clone(&dropped),
            },
            ControlReceiver {
                name,
                receiver,
                dropped,
            },
        )
    }
}

/// Producer end; cloneable
#[derive(Clone)]
pub struct ControlSender {
    name: Arc<str>,
    sender: Sender<ControlMessage>,
    dropped: Arc<AtomicU64>,
}

impl ControlSender {
    /// Enqueue without blocking; returns false if the message was dropped
    pub fn send(&self, text: impl Into<String>) -> bool {
        match self.sender.try_send(ControlMessage::new(text)) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(channel = %self.name, "Control channel full, message dropped");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer end
pub struct ControlReceiver {
    name: Arc<str>,
    receiver: Receiver<ControlMessage>,
    dropped: Arc<AtomicU64>,
}

impl ControlReceiver {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn try_recv(&self) -> Option<ControlMessage> {
        self.receiver.try_recv().ok()
    }

    /// Everything currently queued, oldest first
    pub fn drain(&self) -> Vec<ControlMessage> {
        self.receiver.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Messages producers dropped on a full channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Encode a detector result
pub fn format_center(x: i32, y: i32) -> String {
    format!("{}{},{}", FACE_CENTER_PREFIX, x, y)
}

/// Parse `FaceCenter:<x>,<y>` or `Center:<x>,<y>`
///
/// Anything else, including trailing garbage, yields `None`.
pub fn parse_center(text: &str) -> Option<(i32, i32)> {
    let text = text.trim();
    let coords = text
        .strip_prefix(FACE_CENTER_PREFIX)
        .or_else(|| text.strip_prefix(CENTER_PREFIX))?;
    let (x, y) = coords.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Encode a cursor telemetry record
pub fn format_telemetry(center: (i32, i32), cursor: (i32, i32)) -> String {
    format!(
        "Center: {} x {} ,Cursor: {} x {}",
        center.0, center.1, cursor.0, cursor.1
    )
}
