// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # resound - Real-time audio I/O and dispatch
//!
//! A pure Rust coordination core for audio applications: a lock-free
//! Read-Copy-Update container for real-time readers, and a device manager
//! that uses it to dispatch driver callbacks to dynamically changing
//! subscriber lists without ever blocking the audio thread.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resound::backend::null::NullBackend;
//! use resound::{ClosureSubscriber, DeviceManager, Role, StreamConfig};
//! use std::sync::Arc;
//!
//! fn main() -> resound::Result<()> {
//!     let manager = DeviceManager::new(Box::new(NullBackend::new()));
//!
//!     let output = manager.enumerate_output_devices()[0].id;
//!     let config = StreamConfig { sample_rate: 48_000, buffer_frames: 256, ..Default::default() };
//!     manager.initialise(None, Some(&output), config)?;
//!
//!     manager.add_playback_callback(Arc::new(ClosureSubscriber::new(
//!         |out: &mut [f32], _in: &[f32], _frames, _in_ch, _out_ch| out.fill(0.0),
//!     )))?;
//!
//!     manager.start_role(Role::Playback)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |    DeviceManager -> initialise / start / stop / add subscribers    |
//! +--------------------------------------------------------------------+
//! |                         Dispatch Layer                             |
//! |  Per-role SubscriberSet (RCU) | C-ABI trampoline | panic firewall  |
//! +--------------------------------------------------------------------+
//! |                        Coordination Core                           |
//! |  Rcu<T>: lock-free readers | CoW writers | deferred reclamation    |
//! +--------------------------------------------------------------------+
//! |                         Backend Layer                              |
//! |      AudioBackend / BackendDevice seam | bundled null backend      |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DeviceManager`] | Device lifecycle and subscriber registration |
//! | [`Rcu`](crate::core::rcu::Rcu) | Lock-free read / copy-on-write shared container |
//! | [`AudioSubscriber`] | Contract DSP components implement |
//! | [`SubscriberSet`] | RCU-protected per-role callback list |
//! | [`StreamConfig`] | Sample rate / buffer / channel configuration |
//!
//! ## Threading Model
//!
//! Control threads initialise, start/stop and edit subscriber lists; they
//! may block and allocate. Backend audio threads run the trampoline only:
//! after reader pre-registration the dispatch path performs no allocation,
//! takes no lock and never waits on writers. Subscriber removal
//! synchronises with in-flight read sections, so `release` is guaranteed
//! to follow the subscriber's last `process` call.
//!
//! ## Modules Overview
//!
//! - [`device`] - Device manager and subscriber API (start here)
//! - [`core`](crate::core) - RCU container and reclamation machinery
//! - [`backend`] - Driver adapter seam and the bundled null backend
//! - [`config`] - Defaults and tuning constants
//! - [`logging`] - Feature-gated logging macros and sinks

pub mod backend;
pub mod config;
pub mod core;
pub mod device;
mod error;
pub mod logging;
pub mod prelude;

pub use crate::core::rcu::Rcu;
pub use config::StreamConfig;
pub use device::{
    AudioDeviceInfo, AudioSubscriber, ClosureSubscriber, DeviceId, DeviceKind, DeviceManager,
    DeviceNotificationType, LogCallback, NotificationCallback, Role, SubscriberHandle,
    SubscriberSet,
};
pub use error::{Error, Result};
