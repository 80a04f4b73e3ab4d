// SPDX-License-Identifier: GPL-3.0-only

//! Capture stage: device to distributor
//!
//! After each publish the device must still hold a buffer to fill. If every
//! slot is held by subscribers, the oldest one is recycled.

use crate::backends::camera::FrameSource;
use crate::transport::FrameDistributor;
use tracing::trace;

/// Periodic stage publishing at most one frame per activation
pub struct CaptureStage {
    source: FrameSource,
    distributor: FrameDistributor,
    idle: u64,
}

impl CaptureStage {
    pub fn new(source: FrameSource, distributor: FrameDistributor) -> Self {
        Self {
            source,
            distributor,
            idle: 0,
        }
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn distributor(&self) -> &FrameDistributor {
        &self.distributor
    }

    /// Activations that found no frame ready
    pub fn idle_activations(&self) -> u64 {
        self.idle
    }

    pub fn run_once(&mut self) {
        let Some(frame) = self.source.next_frame() else {
            self.idle += 1;
            return;
        };

        let sequence = frame.meta().sequence;
        let outcome = self.distributor.publish(frame);
        trace!(
            sequence,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Frame published"
        );

        // Keep at least one buffer with the driver
        self.source.relieve_starvation();
    }
}
