// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Device Management API
//!
//! The device layer couples the RCU core to an audio driver:
//!
//! - **[`DeviceManager`]**: enumeration and the per-role lifecycle
//!   (initialise / start / stop / shutdown)
//! - **[`SubscriberSet`]**: RCU-protected, ordered callback lists, one per
//!   role
//! - **[`AudioSubscriber`]**: the contract DSP components implement to
//!   receive buffers
//!
//! ## Roles
//!
//! Playback, capture and duplex are independent state machines with
//! independent subscriber sets; a subscriber registered with one role is
//! never dispatched by another.

mod dispatch;
/// Backend-neutral device descriptors.
pub mod info;
mod manager;
/// Subscriber contract for audio dispatch.
pub mod subscriber;
/// RCU-protected subscriber lists.
pub mod subscribers;

pub use dispatch::{LogCallback, NotificationCallback};
pub use info::{AudioDeviceInfo, DeviceId, DeviceKind};
pub use manager::DeviceManager;
pub use subscriber::{AudioSubscriber, ClosureSubscriber, SubscriberHandle};
pub use subscribers::SubscriberSet;

/// One of the three independent audio roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Output-only dispatch.
    Playback,
    /// Input-only dispatch.
    Capture,
    /// Simultaneous input/output dispatch.
    Duplex,
}

impl Role {
    /// All roles, in initialisation order.
    pub const ALL: [Role; 3] = [Role::Playback, Role::Capture, Role::Duplex];

    pub(crate) fn index(self) -> usize {
        match self {
            Role::Playback => 0,
            Role::Capture => 1,
            Role::Duplex => 2,
        }
    }

    /// True if the role drives an output buffer.
    pub fn needs_output(self) -> bool {
        matches!(self, Role::Playback | Role::Duplex)
    }

    /// True if the role consumes an input buffer.
    pub fn needs_input(self) -> bool {
        matches!(self, Role::Capture | Role::Duplex)
    }

    /// Lowercase role name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Playback => "playback",
            Role::Capture => "capture",
            Role::Duplex => "duplex",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of device notifications delivered to the single
/// notification callback.
///
/// Dispatch happens on whichever thread the backend uses; the installed
/// callback must be thread-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceNotificationType {
    /// A role device began delivering buffers.
    Started,
    /// A role device ceased delivering buffers (including after a
    /// persistent backend failure).
    Stopped,
    /// The route changed; the next callback may carry a new frame count.
    Rerouted,
    /// The system interrupted the stream (e.g. a call); delivery paused.
    InterruptionBegan,
    /// The interruption ended; delivery resumed.
    InterruptionEnded,
    /// The audio session became available again.
    Unlocked,
}
