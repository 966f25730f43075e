// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Driver-less backend running a paced in-process audio thread.
//!
//! Each opened stream owns one thread that fires the data callback at the
//! buffer cadence over preallocated buffers, so the callback path never
//! allocates after start. A [`NullController`] can inject route changes and
//! interruptions, which is how the integration suite exercises the
//! notification paths without real hardware.

use super::{
    AudioBackend, BackendDevice, BackendEvent, BackendEventKind, BackendLogCallback,
    CallbackContext, DataCallback, EventCallback, StreamParams, StreamRequest,
};
use crate::config::MAX_BUFFER_FRAMES;
use crate::device::info::{AudioDeviceInfo, DeviceId, DeviceKind};
use crate::device::Role;
use crate::error::{Error, Result};
use crate::logging::LogLevel;
use crossbeam::channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Sample rates every synthetic device reports.
const NULL_SAMPLE_RATES: [u32; 3] = [44_100, 48_000, 96_000];

enum NullCommand {
    Reroute(u32),
    BeginInterruption,
    EndInterruption,
    Unlock,
    Stop,
}

struct NullShared {
    /// Control senders of all streams opened from this context. Stale
    /// senders (stopped streams) fail silently on broadcast.
    endpoints: Mutex<Vec<Sender<NullCommand>>>,
}

impl NullShared {
    fn broadcast(&self, make: impl Fn() -> NullCommand) {
        for endpoint in self.endpoints.lock().iter() {
            let _ = endpoint.send(make());
        }
    }
}

/// Test/control handle for injecting backend events into running streams.
#[derive(Clone)]
pub struct NullController {
    shared: Arc<NullShared>,
}

impl NullController {
    /// Simulate a route change: every stream switches to `buffer_frames`
    /// per callback and raises `RouteChanged`.
    pub fn reroute(&self, buffer_frames: u32) {
        self.shared
            .broadcast(|| NullCommand::Reroute(buffer_frames));
    }

    /// Pause callback delivery and raise `InterruptionBegan`.
    pub fn begin_interruption(&self) {
        self.shared.broadcast(|| NullCommand::BeginInterruption);
    }

    /// Resume callback delivery and raise `InterruptionEnded`.
    pub fn end_interruption(&self) {
        self.shared.broadcast(|| NullCommand::EndInterruption);
    }

    /// Raise `SessionUnlocked` on every stream.
    pub fn unlock(&self) {
        self.shared.broadcast(|| NullCommand::Unlock);
    }
}

/// In-process backend with synthetic devices.
pub struct NullBackend {
    ready: bool,
    devices: Vec<AudioDeviceInfo>,
    shared: Arc<NullShared>,
}

impl NullBackend {
    /// Context with the default synthetic device list.
    pub fn new() -> Self {
        Self::with_devices(Self::default_devices())
    }

    /// Context exposing exactly `devices`.
    pub fn with_devices(devices: Vec<AudioDeviceInfo>) -> Self {
        Self {
            ready: true,
            devices,
            shared: Arc::new(NullShared {
                endpoints: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Context plus an event-injection controller.
    pub fn with_controller() -> (Self, NullController) {
        let backend = Self::new();
        let controller = NullController {
            shared: Arc::clone(&backend.shared),
        };
        (backend, controller)
    }

    /// Context whose driver initialisation failed; enumeration yields
    /// nothing and every open reports `BackendInitFailed`.
    pub fn failing() -> Self {
        Self {
            ready: false,
            devices: Vec::new(),
            shared: Arc::new(NullShared {
                endpoints: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Controller bound to this context.
    pub fn controller(&self) -> NullController {
        NullController {
            shared: Arc::clone(&self.shared),
        }
    }

    fn default_devices() -> Vec<AudioDeviceInfo> {
        let device = |name: &str, kind, id: &[u8]| AudioDeviceInfo {
            name: name.to_string(),
            kind,
            sample_rates: NULL_SAMPLE_RATES.to_vec(),
            id: DeviceId::from_bytes(id).expect("static id fits the cap"),
        };
        vec![
            device("Null Output", DeviceKind::Playback, b"null-out"),
            device("Null Input", DeviceKind::Capture, b"null-in"),
            device("Null Duplex", DeviceKind::Duplex, b"null-duplex"),
        ]
    }

    fn kind_matches(kind: DeviceKind, wanted: DeviceKind) -> bool {
        match wanted {
            DeviceKind::Playback => kind.has_output(),
            DeviceKind::Capture => kind.has_input(),
            DeviceKind::Duplex => kind == DeviceKind::Duplex,
        }
    }

    fn validate(&self, request: &StreamRequest) -> Result<()> {
        if let Some(id) = request.device {
            let device = self
                .devices
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| Error::DeviceNotFound(format!("{:?}", id)))?;
            if request.role.needs_output() && !device.kind.has_output() {
                return Err(Error::FormatUnsupported(format!(
                    "{} has no output direction",
                    device.name
                )));
            }
            if request.role.needs_input() && !device.kind.has_input() {
                return Err(Error::FormatUnsupported(format!(
                    "{} has no input direction",
                    device.name
                )));
            }
            if !device.supports_rate(request.sample_rate) {
                return Err(Error::FormatUnsupported(format!(
                    "{} does not support {} Hz",
                    device.name, request.sample_rate
                )));
            }
        } else if !NULL_SAMPLE_RATES.contains(&request.sample_rate) {
            return Err(Error::FormatUnsupported(format!(
                "default device does not support {} Hz",
                request.sample_rate
            )));
        }
        Ok(())
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn enumerate_devices(&self, kind: DeviceKind) -> Result<Vec<AudioDeviceInfo>> {
        if !self.ready {
            return Ok(Vec::new());
        }
        Ok(self
            .devices
            .iter()
            .filter(|d| Self::kind_matches(d.kind, kind))
            .cloned()
            .collect())
    }

    fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn BackendDevice>> {
        if !self.ready {
            return Err(Error::BackendInitFailed("null context unavailable".into()));
        }
        self.validate(&request)?;

        let params = StreamParams {
            sample_rate: request.sample_rate,
            buffer_frames: request.buffer_frames.min(MAX_BUFFER_FRAMES),
            in_channels: request.in_channels,
            out_channels: request.out_channels,
        };
        Ok(Box::new(NullDevice {
            role: request.role,
            params,
            data_callback: request.data_callback,
            user_data: request.user_data,
            event_callback: request.event_callback,
            log_callback: request.log_callback,
            shared: Arc::clone(&self.shared),
            control: None,
            thread: None,
        }))
    }
}

/// One paced stream of the null backend.
pub struct NullDevice {
    role: Role,
    params: StreamParams,
    data_callback: DataCallback,
    user_data: CallbackContext,
    event_callback: Option<EventCallback>,
    log_callback: Option<BackendLogCallback>,
    shared: Arc<NullShared>,
    control: Option<Sender<NullCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl BackendDevice for NullDevice {
    fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        let (tx, rx) = unbounded();
        self.shared.endpoints.lock().push(tx.clone());

        let worker = StreamWorker {
            role: self.role,
            params: self.params,
            data_callback: self.data_callback,
            user_data: self.user_data,
            event_callback: self.event_callback.clone(),
            log_callback: self.log_callback.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(format!("resound-null-{}", self.role))
            .spawn(move || worker.run(rx))
            .map_err(|e| Error::BackendRuntime(format!("stream thread spawn failed: {}", e)))?;

        self.control = Some(tx);
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };
        if let Some(control) = self.control.take() {
            let _ = control.send(NullCommand::Stop);
        }
        handle
            .join()
            .map_err(|_| Error::BackendRuntime("stream thread panicked".into()))?;
        Ok(())
    }

    fn params(&self) -> StreamParams {
        self.params
    }
}

impl Drop for NullDevice {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// State moved onto the stream thread.
struct StreamWorker {
    role: Role,
    params: StreamParams,
    data_callback: DataCallback,
    user_data: CallbackContext,
    event_callback: Option<EventCallback>,
    log_callback: Option<BackendLogCallback>,
}

impl StreamWorker {
    fn emit(&self, kind: BackendEventKind, buffer_frames: u32) {
        if let Some(callback) = self.event_callback.as_deref() {
            callback(&BackendEvent {
                kind,
                buffer_frames,
                detail: None,
            });
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        if let Some(callback) = self.log_callback.as_deref() {
            callback(level, message);
        }
    }

    fn period(frames: u32, sample_rate: u32) -> Duration {
        Duration::from_micros(u64::from(frames) * 1_000_000 / u64::from(sample_rate.max(1)))
    }

    fn run(self, rx: crossbeam::channel::Receiver<NullCommand>) {
        let out_cap = (MAX_BUFFER_FRAMES * self.params.out_channels) as usize;
        let in_cap = (MAX_BUFFER_FRAMES * self.params.in_channels) as usize;
        let mut out_buf = vec![0.0f32; out_cap];
        let mut in_buf = vec![0.0f32; in_cap];

        let mut frames = self.params.buffer_frames;
        let mut interval = Self::period(frames, self.params.sample_rate);
        let mut paused = false;
        let mut tick: u64 = 0;

        self.log(
            LogLevel::Debug,
            &format!("null {} stream running at {} Hz", self.role, self.params.sample_rate),
        );
        self.emit(BackendEventKind::DeviceStarted, 0);

        loop {
            match rx.recv_timeout(interval) {
                Ok(NullCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(NullCommand::Reroute(new_frames)) => {
                    frames = new_frames.min(MAX_BUFFER_FRAMES);
                    interval = Self::period(frames, self.params.sample_rate);
                    self.emit(BackendEventKind::RouteChanged, frames);
                }
                Ok(NullCommand::BeginInterruption) => {
                    paused = true;
                    self.emit(BackendEventKind::InterruptionBegan, 0);
                }
                Ok(NullCommand::EndInterruption) => {
                    paused = false;
                    self.emit(BackendEventKind::InterruptionEnded, 0);
                }
                Ok(NullCommand::Unlock) => {
                    self.emit(BackendEventKind::SessionUnlocked, 0);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if paused {
                        continue;
                    }
                    self.fire_callback(&mut out_buf, &mut in_buf, frames, tick);
                    tick = tick.wrapping_add(1);
                }
            }
        }

        self.emit(BackendEventKind::DeviceStopped, 0);
        self.log(LogLevel::Debug, &format!("null {} stream stopped", self.role));
    }

    fn fire_callback(&self, out_buf: &mut [f32], in_buf: &mut [f32], frames: u32, tick: u64) {
        let out_len = (frames * self.params.out_channels) as usize;
        let in_len = (frames * self.params.in_channels) as usize;

        // Deterministic sawtooth on the capture side.
        for (i, sample) in in_buf[..in_len].iter_mut().enumerate() {
            let step = tick.wrapping_mul(u64::from(frames)).wrapping_add(i as u64);
            *sample = (step % 1000) as f32 / 1000.0;
        }

        let out_ptr = if self.params.out_channels == 0 {
            std::ptr::null_mut()
        } else {
            out_buf[..out_len].as_mut_ptr()
        };
        let in_ptr = if self.params.in_channels == 0 {
            std::ptr::null()
        } else {
            in_buf[..in_len].as_ptr()
        };

        // SAFETY: the buffers hold frames * channels samples and stay valid
        // for the duration of the call; the opener guarantees `user_data`
        // outlives the device per the StreamRequest contract.
        unsafe { (self.data_callback)(self.user_data.as_ptr(), out_ptr, in_ptr, frames) };
    }
}
