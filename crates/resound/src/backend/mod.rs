// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backend adapter seam.
//!
//! The device manager drives an audio driver exclusively through
//! [`AudioBackend`] and [`BackendDevice`]: enumerate devices, open a stream
//! for a role with a C-ABI data callback, start/stop it, observe its
//! events. A production adapter wraps a platform driver library; the
//! bundled [`null`] backend runs an in-process paced thread and backs the
//! integration tests and offline rendering.

pub mod null;

use crate::device::info::{AudioDeviceInfo, DeviceId, DeviceKind};
use crate::device::Role;
use crate::error::Result;
use crate::logging::LogLevel;
use std::ffi::c_void;
use std::sync::Arc;

/// C-ABI data callback the backend fires from its audio thread:
/// `(user_data, output, input, frames)`. Null pointers mark a side the
/// stream does not have.
pub type DataCallback =
    unsafe extern "C" fn(user_data: *mut c_void, output: *mut f32, input: *const f32, frames: u32);

/// Backend event callback, fired on a backend-owned thread.
pub type EventCallback = Arc<dyn Fn(&BackendEvent) + Send + Sync>;

/// Backend log callback: `(level, message)`.
pub type BackendLogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Opaque pointer handed back verbatim to the data callback.
///
/// The opener guarantees the pointee outlives the device.
#[derive(Clone, Copy)]
pub struct CallbackContext(*mut c_void);

// SAFETY: the context is an opaque token; the device manager only hands out
// pointers to state that is itself Sync and outlives the device.
unsafe impl Send for CallbackContext {}
unsafe impl Sync for CallbackContext {}

impl CallbackContext {
    pub fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

/// Backend-native event raised on a backend thread.
#[derive(Debug, Clone)]
pub struct BackendEvent {
    pub kind: BackendEventKind,
    /// Frames per callback after a `RouteChanged`; 0 otherwise.
    pub buffer_frames: u32,
    /// Human-readable detail for `RuntimeError`.
    pub detail: Option<String>,
}

impl BackendEvent {
    pub fn new(kind: BackendEventKind) -> Self {
        Self {
            kind,
            buffer_frames: 0,
            detail: None,
        }
    }
}

/// Kinds of events a backend can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEventKind {
    DeviceStarted,
    DeviceStopped,
    RouteChanged,
    InterruptionBegan,
    InterruptionEnded,
    SessionUnlocked,
    RuntimeError,
}

/// Everything a backend needs to open one stream.
pub struct StreamRequest {
    pub role: Role,
    /// Specific device to open; `None` selects the backend default for the
    /// role's direction.
    pub device: Option<DeviceId>,
    pub sample_rate: u32,
    pub buffer_frames: u32,
    pub in_channels: u32,
    pub out_channels: u32,
    pub data_callback: DataCallback,
    pub user_data: CallbackContext,
    pub event_callback: Option<EventCallback>,
    pub log_callback: Option<BackendLogCallback>,
}

/// Stream parameters the backend actually negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub buffer_frames: u32,
    pub in_channels: u32,
    pub out_channels: u32,
}

/// One opened driver stream.
///
/// Dropping the device uninitialises it; implementations stop any running
/// stream in `Drop`.
pub trait BackendDevice: Send {
    /// Begin callback delivery. Idempotent.
    fn start(&mut self) -> Result<()>;

    /// Cease callback delivery; returns only after no further data
    /// callback can be in flight. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// Parameters the backend negotiated at open time.
    fn params(&self) -> StreamParams;
}

/// A driver context capable of enumeration and stream creation.
pub trait AudioBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// False when the driver context failed to initialise; enumeration then
    /// yields nothing and opening streams fails.
    fn is_ready(&self) -> bool;

    /// All devices serving `kind`, with every supported sample rate.
    fn enumerate_devices(&self, kind: DeviceKind) -> Result<Vec<AudioDeviceInfo>>;

    /// Open one stream for a role.
    fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn BackendDevice>>;
}
