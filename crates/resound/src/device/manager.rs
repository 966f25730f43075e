// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device lifecycle coordination.
//!
//! One [`DeviceManager`] owns a backend context, up to three role devices
//! (playback, capture, duplex) and the per-role subscriber sets. Control
//! threads drive the role state machines; the backend's audio threads only
//! ever touch the dispatchers.
//!
//! # Role state machine
//!
//! ```text
//! Uninitialised --initialise--> Initialised --start_role--> Running
//!       ^                            |  ^                      |
//!       +--------- shutdown ---------+  +------ stop_role -----+
//! ```
//!
//! `initialise` is never partial: if any selected role fails to come up,
//! every role brought up by that call is torn down before the error
//! returns.

use crate::backend::{
    AudioBackend, BackendDevice, BackendEvent, BackendEventKind, CallbackContext, StreamRequest,
};
use crate::config::StreamConfig;
use crate::device::dispatch::{
    role_data_trampoline, LogCallback, LogSlot, NotificationCallback, NotificationSlot,
    RoleDispatcher,
};
use crate::device::info::{AudioDeviceInfo, DeviceId, DeviceKind};
use crate::device::subscriber::SubscriberHandle;
use crate::device::subscribers::SubscriberSet;
use crate::device::{DeviceNotificationType, Role};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::Arc;

struct ManagerState {
    /// Logical configuration of the current initialisation, with the
    /// sample rate / buffer size the backend actually negotiated.
    config: Option<StreamConfig>,
    devices: [Option<Box<dyn BackendDevice>>; 3],
}

/// Process-wide audio device coordinator.
///
/// # Example
///
/// ```rust,no_run
/// use resound::backend::null::NullBackend;
/// use resound::{DeviceManager, Role, StreamConfig};
///
/// let manager = DeviceManager::new(Box::new(NullBackend::new()));
/// let outputs = manager.enumerate_output_devices();
///
/// let config = StreamConfig { sample_rate: 48_000, buffer_frames: 256, ..Default::default() };
/// manager.initialise(None, Some(&outputs[0].id), config)?;
/// manager.start_role(Role::Playback)?;
/// # Ok::<(), resound::Error>(())
/// ```
pub struct DeviceManager {
    backend: Box<dyn AudioBackend>,
    state: Mutex<ManagerState>,
    subscribers: [Arc<SubscriberSet>; 3],
    dispatchers: [Arc<RoleDispatcher>; 3],
    notification: Arc<NotificationSlot>,
    log: Arc<LogSlot>,
}

impl DeviceManager {
    /// Create a manager over a backend context.
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        let log = Arc::new(LogSlot::new());
        let subscribers = [
            Arc::new(SubscriberSet::new()),
            Arc::new(SubscriberSet::new()),
            Arc::new(SubscriberSet::new()),
        ];
        let dispatchers = [
            Arc::new(RoleDispatcher::new(
                Role::Playback,
                Arc::clone(&subscribers[Role::Playback.index()]),
                Arc::clone(&log),
            )),
            Arc::new(RoleDispatcher::new(
                Role::Capture,
                Arc::clone(&subscribers[Role::Capture.index()]),
                Arc::clone(&log),
            )),
            Arc::new(RoleDispatcher::new(
                Role::Duplex,
                Arc::clone(&subscribers[Role::Duplex.index()]),
                Arc::clone(&log),
            )),
        ];
        Self {
            backend,
            state: Mutex::new(ManagerState {
                config: None,
                devices: [None, None, None],
            }),
            subscribers,
            dispatchers,
            notification: Arc::new(NotificationSlot::new()),
            log,
        }
    }

    // ====================================================================
    // Enumeration
    // ====================================================================

    /// All devices able to capture, with every supported sample rate.
    /// Empty when the backend context failed to initialise.
    pub fn enumerate_input_devices(&self) -> Vec<AudioDeviceInfo> {
        self.enumerate(DeviceKind::Capture)
    }

    /// All devices able to play, with every supported sample rate.
    /// Empty when the backend context failed to initialise.
    pub fn enumerate_output_devices(&self) -> Vec<AudioDeviceInfo> {
        self.enumerate(DeviceKind::Playback)
    }

    fn enumerate(&self, kind: DeviceKind) -> Vec<AudioDeviceInfo> {
        if !self.backend.is_ready() {
            return Vec::new();
        }
        match self.backend.enumerate_devices(kind) {
            Ok(devices) => devices,
            Err(err) => {
                self.log
                    .error(&format!("device enumeration failed: {}", err));
                Vec::new()
            }
        }
    }

    // ====================================================================
    // Lifecycle
    // ====================================================================

    /// Bring up the roles implied by the supplied devices.
    ///
    /// Only `input` selects capture; only `output` selects playback; both
    /// select playback, capture and duplex (three backend devices, one
    /// logical configuration). Supplying neither is `InvalidConfiguration`.
    /// Reconfiguring while any selected role runs is `AlreadyRunning`.
    pub fn initialise(
        &self,
        input: Option<&DeviceId>,
        output: Option<&DeviceId>,
        config: StreamConfig,
    ) -> Result<()> {
        if input.is_none() && output.is_none() {
            return Err(Error::InvalidConfiguration(
                "at least one of input/output device required".into(),
            ));
        }
        if !self.backend.is_ready() {
            return Err(Error::BackendInitFailed(format!(
                "backend '{}' context unavailable",
                self.backend.name()
            )));
        }

        let mut state = self.state.lock();
        for role in Role::ALL {
            if self.dispatchers[role.index()].running() {
                return Err(Error::AlreadyRunning(role));
            }
        }

        // Tear down any previous initialisation before building the new one.
        for slot in state.devices.iter_mut() {
            *slot = None;
        }
        state.config = None;

        let selected: &[Role] = if input.is_some() && output.is_some() {
            &[Role::Playback, Role::Capture, Role::Duplex]
        } else if output.is_some() {
            &[Role::Playback]
        } else {
            &[Role::Capture]
        };

        let mut negotiated = config;
        for &role in selected {
            let (in_channels, out_channels) = match role {
                Role::Playback => (0, config.out_channels),
                Role::Capture => (config.in_channels, 0),
                Role::Duplex => (config.in_channels, config.out_channels),
            };
            let device_id = match role {
                Role::Playback => output.copied(),
                Role::Capture => input.copied(),
                // The backend pairs its default duplex endpoints.
                Role::Duplex => None,
            };

            let dispatcher = &self.dispatchers[role.index()];
            dispatcher.configure(config.sample_rate, config.buffer_frames, in_channels, out_channels);

            let request = StreamRequest {
                role,
                device: device_id,
                sample_rate: config.sample_rate,
                buffer_frames: config.buffer_frames,
                in_channels,
                out_channels,
                data_callback: role_data_trampoline,
                // The dispatcher Arc lives in `self` for the manager's
                // lifetime and devices are dropped first on every path.
                user_data: CallbackContext::new(Arc::as_ptr(dispatcher) as *mut c_void),
                event_callback: Some(self.make_event_callback(role)),
                log_callback: Some({
                    let log = Arc::clone(&self.log);
                    Arc::new(move |level, message: &str| log.log(level, message))
                }),
            };

            let device = match self.backend.open_stream(request) {
                Ok(device) => device,
                Err(err) => {
                    // Never partial: roles opened by this call go back down.
                    for slot in state.devices.iter_mut() {
                        *slot = None;
                    }
                    self.log.error(&format!(
                        "initialise failed opening {} device: {}",
                        role, err
                    ));
                    return Err(err);
                }
            };

            let params = device.params();
            dispatcher.configure(
                params.sample_rate,
                params.buffer_frames,
                params.in_channels,
                params.out_channels,
            );
            negotiated.sample_rate = params.sample_rate;
            negotiated.buffer_frames = params.buffer_frames;
            state.devices[role.index()] = Some(device);
        }

        state.config = Some(negotiated);
        crate::info!(
            "initialised {} role(s) at {} Hz / {} frames",
            selected.len(),
            negotiated.sample_rate,
            negotiated.buffer_frames
        );
        Ok(())
    }

    /// Begin dispatch for an initialised role.
    ///
    /// Prepares every registered subscriber on this (control) thread before
    /// the backend starts delivering buffers. Starting a running role is a
    /// no-op; starting an uninitialised role is `NotInitialised`.
    pub fn start_role(&self, role: Role) -> Result<()> {
        let mut state = self.state.lock();
        let slot = state.devices[role.index()]
            .as_mut()
            .ok_or(Error::NotInitialised(role))?;
        let dispatcher = &self.dispatchers[role.index()];
        if dispatcher.running() {
            return Ok(());
        }

        self.subscribers[role.index()]
            .prepare_all(dispatcher.sample_rate(), dispatcher.buffer_frames())?;

        if let Err(err) = slot.start() {
            self.subscribers[role.index()].release_all();
            return Err(err);
        }
        dispatcher.set_running(true);
        crate::debug!("{} role started", role);
        Ok(())
    }

    /// Cease dispatch for a role and release its subscribers.
    ///
    /// Returns only after the backend guarantees no further data callback,
    /// so `release` follows the last `process`. Stopping a stopped or
    /// uninitialised role is a no-op.
    pub fn stop_role(&self, role: Role) -> Result<()> {
        let mut state = self.state.lock();
        let Some(slot) = state.devices[role.index()].as_mut() else {
            return Ok(());
        };
        let dispatcher = &self.dispatchers[role.index()];
        if !dispatcher.running() {
            return Ok(());
        }

        dispatcher.set_running(false);
        let stopped = slot.stop();
        self.subscribers[role.index()].release_all();
        crate::debug!("{} role stopped", role);
        stopped
    }

    /// Stop every role and tear down all devices and configuration.
    pub fn shutdown(&self) {
        for role in Role::ALL {
            if let Err(err) = self.stop_role(role) {
                self.log
                    .error(&format!("shutdown: stopping {} failed: {}", role, err));
            }
        }
        let mut state = self.state.lock();
        for slot in state.devices.iter_mut() {
            *slot = None;
        }
        state.config = None;
    }

    /// True when the role has a device (Initialised or Running).
    pub fn is_role_initialised(&self, role: Role) -> bool {
        self.state.lock().devices[role.index()].is_some()
    }

    /// True while the role dispatches buffers.
    pub fn is_role_running(&self, role: Role) -> bool {
        self.dispatchers[role.index()].running()
    }

    // ====================================================================
    // Subscribers
    // ====================================================================

    /// Register a playback subscriber; returns the new list length.
    pub fn add_playback_callback(&self, subscriber: SubscriberHandle) -> Result<usize> {
        self.add_callback(Role::Playback, subscriber)
    }

    /// Register a capture subscriber; returns the new list length.
    pub fn add_capture_callback(&self, subscriber: SubscriberHandle) -> Result<usize> {
        self.add_callback(Role::Capture, subscriber)
    }

    /// Register a duplex subscriber; returns the new list length.
    pub fn add_duplex_callback(&self, subscriber: SubscriberHandle) -> Result<usize> {
        self.add_callback(Role::Duplex, subscriber)
    }

    /// Unregister the first occurrence of a playback subscriber.
    pub fn remove_playback_callback(&self, subscriber: &SubscriberHandle) -> Result<usize> {
        self.remove_callback(Role::Playback, subscriber)
    }

    /// Unregister the first occurrence of a capture subscriber.
    pub fn remove_capture_callback(&self, subscriber: &SubscriberHandle) -> Result<usize> {
        self.remove_callback(Role::Capture, subscriber)
    }

    /// Unregister the first occurrence of a duplex subscriber.
    pub fn remove_duplex_callback(&self, subscriber: &SubscriberHandle) -> Result<usize> {
        self.remove_callback(Role::Duplex, subscriber)
    }

    fn add_callback(&self, role: Role, subscriber: SubscriberHandle) -> Result<usize> {
        // Serialise with start/stop so a subscriber is prepared exactly once.
        let _state = self.state.lock();
        let dispatcher = &self.dispatchers[role.index()];
        let stream = dispatcher
            .running()
            .then(|| (dispatcher.sample_rate(), dispatcher.buffer_frames()));
        self.subscribers[role.index()].add_with_lifecycle(subscriber, stream)
    }

    fn remove_callback(&self, role: Role, subscriber: &SubscriberHandle) -> Result<usize> {
        let _state = self.state.lock();
        let running = self.dispatchers[role.index()].running();
        self.subscribers[role.index()].remove_with_lifecycle(subscriber, running)
    }

    // ====================================================================
    // Callbacks & getters
    // ====================================================================

    /// Install (or clear with `None`) the single device-notification slot.
    /// The callback runs on backend threads and must be thread-safe.
    pub fn set_notification_callback(&self, callback: Option<NotificationCallback>) {
        self.notification.set(callback);
    }

    /// Install (or clear with `None`) the single log-callback slot.
    pub fn set_log_callback(&self, callback: Option<LogCallback>) {
        self.log.set(callback);
    }

    /// Negotiated sample rate of the active configuration.
    pub fn sample_rate(&self) -> Option<u32> {
        self.state.lock().config.map(|c| c.sample_rate)
    }

    /// Current frames per callback; reroutes are reflected here.
    pub fn buffer_frames(&self) -> Option<u32> {
        let state = self.state.lock();
        state.config?;
        for role in Role::ALL {
            if state.devices[role.index()].is_some() {
                return Some(self.dispatchers[role.index()].buffer_frames());
            }
        }
        None
    }

    /// Configured capture channel count.
    pub fn input_channels(&self) -> Option<u32> {
        self.state.lock().config.map(|c| c.in_channels)
    }

    /// Configured playback channel count.
    pub fn output_channels(&self) -> Option<u32> {
        self.state.lock().config.map(|c| c.out_channels)
    }

    fn make_event_callback(&self, role: Role) -> crate::backend::EventCallback {
        let dispatcher = Arc::clone(&self.dispatchers[role.index()]);
        let notification = Arc::clone(&self.notification);
        let log = Arc::clone(&self.log);
        Arc::new(move |event: &BackendEvent| match event.kind {
            BackendEventKind::DeviceStarted => {
                notification.notify(DeviceNotificationType::Started);
            }
            BackendEventKind::DeviceStopped => {
                notification.notify(DeviceNotificationType::Stopped);
            }
            BackendEventKind::RouteChanged => {
                dispatcher.on_reroute(event.buffer_frames);
                notification.notify(DeviceNotificationType::Rerouted);
            }
            BackendEventKind::InterruptionBegan => {
                notification.notify(DeviceNotificationType::InterruptionBegan);
            }
            BackendEventKind::InterruptionEnded => {
                notification.notify(DeviceNotificationType::InterruptionEnded);
            }
            BackendEventKind::SessionUnlocked => {
                notification.notify(DeviceNotificationType::Unlocked);
            }
            BackendEventKind::RuntimeError => {
                let detail = event.detail.as_deref().unwrap_or("unknown");
                log.error(&format!("backend runtime error on {}: {}", role, detail));
                notification.notify(DeviceNotificationType::Stopped);
            }
        })
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        // Devices must go down before the dispatchers their callbacks
        // reference.
        self.shutdown();
    }
}
