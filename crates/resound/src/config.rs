// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration defaults - single source of truth.
//!
//! This module centralizes the stream defaults and the reclamation tuning
//! constants. **Never hardcode these values elsewhere!**
//!
//! # Levels
//!
//! - **Static**: compile-time constants below (defaults, thresholds, caps)
//! - **Dynamic**: [`StreamConfig`] carried through `DeviceManager::initialise`

// =======================================================================
// Stream Defaults
// =======================================================================

/// Default sample rate in Hz when `initialise` is given no explicit rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default buffer size in frames per driver callback.
pub const DEFAULT_BUFFER_FRAMES: u32 = 512;

/// Upper bound on frames per callback a backend may negotiate.
///
/// Backends preallocate their callback buffers against this cap so a route
/// change never allocates on the audio thread.
pub const MAX_BUFFER_FRAMES: u32 = 4_096;

/// Maximum size of the opaque backend device identifier blob.
pub const DEVICE_ID_CAP: usize = 256;

// =======================================================================
// RCU Reclamation Tuning
// =======================================================================

/// Soft high-water mark for an RCU retire list.
///
/// At or above this length the writer repeats the opportunistic scan (up to
/// [`RETIRE_SCAN_PASSES`] times) after each publish.
pub const RETIRE_SOFT_LIMIT: usize = 8;

/// Hard high-water mark for an RCU retire list.
///
/// At or above this length the writer blocks until all stale readers have
/// left their read sections, then drains the list. This is the only blocking
/// path on the writer and never runs on a reader thread.
pub const RETIRE_HARD_LIMIT: usize = 32;

/// Number of opportunistic scan passes performed at the soft limit.
pub const RETIRE_SCAN_PASSES: usize = 3;

// =======================================================================
// Stream Configuration
// =======================================================================

/// Logical stream configuration shared by every role a single
/// `initialise` call brings up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Desired sample rate in Hz.
    pub sample_rate: u32,
    /// Desired frames per driver callback.
    pub buffer_frames: u32,
    /// Capture channel count (0 = no capture side).
    pub in_channels: u32,
    /// Playback channel count (0 = no playback side).
    pub out_channels: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            in_channels: 0,
            out_channels: 2,
        }
    }
}

impl StreamConfig {
    /// Stereo output at the default rate, no capture side.
    pub fn playback_stereo() -> Self {
        Self::default()
    }
}
