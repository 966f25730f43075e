// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Audio Subscriber Trait
//!
//! Subscribers receive buffer callbacks from a device role's dispatch path.
//! This is the seam between the device manager and external DSP components.
//!
//! # Usage
//!
//! ```ignore
//! use resound::{AudioSubscriber, DeviceManager};
//! use std::sync::Arc;
//!
//! struct Gain(f32);
//!
//! impl AudioSubscriber for Gain {
//!     fn process(&self, output: &mut [f32], _input: &[f32], _frames: u32,
//!                _in_channels: u32, _out_channels: u32) {
//!         for sample in output.iter_mut() {
//!             *sample *= self.0;
//!         }
//!     }
//! }
//!
//! manager.add_playback_callback(Arc::new(Gain(0.5)))?;
//! ```
//!
//! # Thread Safety
//!
//! `process` is invoked on the backend's real-time thread. `prepare` and
//! `release` are invoked on control threads. Implementations must be
//! `Send + Sync`.

use crate::error::Result;
use std::sync::Arc;

/// Shared handle to a subscriber.
///
/// The manager borrows the subscriber for dispatch; the application keeps
/// its own clone and passes a reference of it to `remove_*_callback`
/// (removal matches by pointer identity, first occurrence).
pub type SubscriberHandle = Arc<dyn AudioSubscriber>;

/// A participant in audio dispatch for one role.
///
/// `prepare` and `release` have default no-op implementations; override
/// them when the subscriber owns per-stream state.
pub trait AudioSubscriber: Send + Sync {
    /// Called on a control thread before the first `process` call after a
    /// (re)start, and before a mid-run registration is published. May
    /// allocate. Returning an error aborts the registration.
    fn prepare(&self, sample_rate: u32, buffer_frames: u32) -> Result<()> {
        let _ = (sample_rate, buffer_frames);
        Ok(())
    }

    /// Called on the backend's real-time thread for every buffer.
    ///
    /// `output` holds `frames * out_channels` interleaved samples (empty
    /// for capture-only roles); the first subscriber in a role sees the raw
    /// driver buffer and later subscribers see what their predecessors
    /// wrote. `input` holds `frames * in_channels` interleaved samples
    /// (empty for playback-only roles) and passes through unchanged.
    ///
    /// `frames` may vary between callbacks, e.g. after a route change.
    ///
    /// Must not allocate, block, or acquire locks.
    fn process(
        &self,
        output: &mut [f32],
        input: &[f32],
        frames: u32,
        in_channels: u32,
        out_channels: u32,
    );

    /// Called on a control thread after the last `process` call; symmetric
    /// to `prepare`.
    fn release(&self) {}
}

/// Closure-based subscriber for process-only participants.
///
/// # Example
///
/// ```ignore
/// let mute = ClosureSubscriber::new(|output: &mut [f32], _, _, _, _| {
///     output.fill(0.0);
/// });
/// manager.add_playback_callback(Arc::new(mute))?;
/// ```
pub struct ClosureSubscriber<F>
where
    F: Fn(&mut [f32], &[f32], u32, u32, u32) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureSubscriber<F>
where
    F: Fn(&mut [f32], &[f32], u32, u32, u32) + Send + Sync,
{
    /// Create a new closure-based subscriber.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> AudioSubscriber for ClosureSubscriber<F>
where
    F: Fn(&mut [f32], &[f32], u32, u32, u32) + Send + Sync,
{
    fn process(
        &self,
        output: &mut [f32],
        input: &[f32],
        frames: u32,
        in_channels: u32,
        out_channels: u32,
    ) {
        (self.callback)(output, input, frames, in_channels, out_channels);
    }
}
