// SPDX-License-Identifier: GPL-3.0-only

//! In-process transport between pipeline stages
//!
//! - [`distributor`]: zero-copy frame fan-out with per-subscriber high-water marks
//! - [`control`]: bounded text channels for coordinates and telemetry
//! - [`wire`]: the fixed frame metadata header

pub mod control;
pub mod distributor;
pub mod wire;

pub use control::{ControlChannel, ControlMessage, ControlReceiver, ControlSender};
pub use distributor::{
    FrameDistributor, FrameMessage, FramePayload, PublishOutcome, ReceivedFrame, Subscription,
};
pub use wire::{FrameHeader, HEADER_LEN};
