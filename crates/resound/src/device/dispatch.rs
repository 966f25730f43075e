// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Real-time dispatch from the backend's audio thread into subscriber code.
//!
//! The backend invokes [`role_data_trampoline`] with the role's dispatcher
//! as `user_data`. The trampoline enters the role's subscriber-set read
//! section and walks the snapshot in registration order. Panics inside a
//! subscriber are contained here: the output buffer is silenced, an
//! error-level log entry is emitted, and nothing propagates into the
//! backend.

use crate::device::subscribers::SubscriberSet;
use crate::device::{DeviceNotificationType, Role};
use crate::logging::LogLevel;
use arc_swap::ArcSwapOption;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Application log callback: `(level, message)`.
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Application device-notification callback.
pub type NotificationCallback = Box<dyn Fn(DeviceNotificationType) + Send + Sync>;

/// Single-slot log sink, swappable from any control thread.
///
/// Entries also flow into the global logger so console logging and the
/// application callback stay consistent.
pub(crate) struct LogSlot {
    callback: ArcSwapOption<LogCallback>,
}

impl LogSlot {
    pub(crate) fn new() -> Self {
        Self {
            callback: ArcSwapOption::from(None),
        }
    }

    pub(crate) fn set(&self, callback: Option<LogCallback>) {
        self.callback.store(callback.map(Arc::new));
    }

    pub(crate) fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => {
                crate::debug!("{}", message);
            }
            LogLevel::Info => {
                crate::info!("{}", message);
            }
            LogLevel::Warning => {
                crate::warn!("{}", message);
            }
            LogLevel::Error => {
                crate::error!("{}", message);
            }
        }
        if let Some(callback) = self.callback.load_full() {
            (*callback)(level, message);
        }
    }

    pub(crate) fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Single-slot device-notification sink.
///
/// Dispatch happens on whichever thread the backend raises the event; the
/// installed callback must be thread-safe.
pub(crate) struct NotificationSlot {
    callback: ArcSwapOption<NotificationCallback>,
}

impl NotificationSlot {
    pub(crate) fn new() -> Self {
        Self {
            callback: ArcSwapOption::from(None),
        }
    }

    pub(crate) fn set(&self, callback: Option<NotificationCallback>) {
        self.callback.store(callback.map(Arc::new));
    }

    pub(crate) fn notify(&self, kind: DeviceNotificationType) {
        if let Some(callback) = self.callback.load_full() {
            (*callback)(kind);
        }
    }
}

/// Per-role dispatch state referenced by the backend's `user_data`.
///
/// Control threads write the running flag and stream parameters; the audio
/// thread only loads atomics and walks the subscriber snapshot.
pub(crate) struct RoleDispatcher {
    role: Role,
    running: AtomicBool,
    sample_rate: AtomicU32,
    buffer_frames: AtomicU32,
    in_channels: AtomicU32,
    out_channels: AtomicU32,
    subscribers: Arc<SubscriberSet>,
    log: Arc<LogSlot>,
}

impl RoleDispatcher {
    pub(crate) fn new(role: Role, subscribers: Arc<SubscriberSet>, log: Arc<LogSlot>) -> Self {
        Self {
            role,
            running: AtomicBool::new(false),
            sample_rate: AtomicU32::new(0),
            buffer_frames: AtomicU32::new(0),
            in_channels: AtomicU32::new(0),
            out_channels: AtomicU32::new(0),
            subscribers,
            log,
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    pub(crate) fn configure(
        &self,
        sample_rate: u32,
        buffer_frames: u32,
        in_channels: u32,
        out_channels: u32,
    ) {
        self.sample_rate.store(sample_rate, Ordering::Release);
        self.buffer_frames.store(buffer_frames, Ordering::Release);
        self.in_channels.store(in_channels, Ordering::Release);
        self.out_channels.store(out_channels, Ordering::Release);
    }

    pub(crate) fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub(crate) fn buffer_frames(&self) -> u32 {
        self.buffer_frames.load(Ordering::Acquire)
    }

    pub(crate) fn in_channels(&self) -> u32 {
        self.in_channels.load(Ordering::Acquire)
    }

    pub(crate) fn out_channels(&self) -> u32 {
        self.out_channels.load(Ordering::Acquire)
    }

    /// Route change: the backend will deliver `buffer_frames` from its next
    /// callback on.
    pub(crate) fn on_reroute(&self, buffer_frames: u32) {
        self.buffer_frames.store(buffer_frames, Ordering::Release);
    }

    /// Walk the subscriber snapshot for one driver buffer.
    ///
    /// # Safety
    /// `output` must be valid for `frames * out_channels` writes (or null),
    /// `input` valid for `frames * in_channels` reads (or null), both for
    /// the duration of the call.
    pub(crate) unsafe fn dispatch(&self, output: *mut f32, input: *const f32, frames: u32) {
        let out_channels = self.out_channels.load(Ordering::Relaxed);
        let in_channels = self.in_channels.load(Ordering::Relaxed);

        let out: &mut [f32] = if output.is_null() || out_channels == 0 {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(output, (frames * out_channels) as usize)
        };
        let inp: &[f32] = if input.is_null() || in_channels == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(input, (frames * in_channels) as usize)
        };

        if !self.running.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }

        let walked = self.subscribers.read(|subs| {
            for sub in subs {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    sub.process(&mut *out, inp, frames, in_channels, out_channels);
                }));
                if outcome.is_err() {
                    // Silence whatever the panicking subscriber left behind;
                    // successors start from a clean buffer.
                    out.fill(0.0);
                    self.log.error(&format!(
                        "{} subscriber panicked in process; output silenced",
                        self.role
                    ));
                }
            }
        });

        if walked.is_err() {
            out.fill(0.0);
            self.log
                .error(&format!("{} dispatch could not register reader", self.role));
        }
    }
}

/// Static C-ABI entry point handed to the backend at device creation.
///
/// # Safety
/// `user_data` must be the `Arc<RoleDispatcher>` pointer the manager handed
/// to the backend, and the dispatcher must outlive the device (the manager
/// stops and drops devices before dropping dispatchers). Buffer pointers
/// follow the contract of [`RoleDispatcher::dispatch`].
pub(crate) unsafe extern "C" fn role_data_trampoline(
    user_data: *mut c_void,
    output: *mut f32,
    input: *const f32,
    frames: u32,
) {
    if user_data.is_null() {
        return;
    }
    let dispatcher = &*(user_data as *const RoleDispatcher);
    dispatcher.dispatch(output, input, frames);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::subscriber::{AudioSubscriber, SubscriberHandle};
    use crate::error::Result;
    use std::sync::atomic::AtomicU32 as TestCounter;

    struct CountingSubscriber {
        calls: TestCounter,
        fill: f32,
    }

    impl AudioSubscriber for CountingSubscriber {
        fn process(&self, output: &mut [f32], _: &[f32], _: u32, _: u32, _: u32) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            output.fill(self.fill);
        }
    }

    struct PanickingSubscriber;

    impl AudioSubscriber for PanickingSubscriber {
        fn prepare(&self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn process(&self, _: &mut [f32], _: &[f32], _: u32, _: u32, _: u32) {
            panic!("subscriber bug");
        }
    }

    fn dispatcher_with(subs: &[SubscriberHandle]) -> RoleDispatcher {
        let set = Arc::new(SubscriberSet::new());
        for sub in subs {
            set.add(sub.clone()).expect("Failed to add subscriber");
        }
        let dispatcher =
            RoleDispatcher::new(Role::Playback, set, Arc::new(LogSlot::new()));
        dispatcher.configure(48_000, 256, 0, 2);
        dispatcher
    }

    #[test]
    fn test_dispatch_when_stopped_silences() {
        let counting = Arc::new(CountingSubscriber {
            calls: TestCounter::new(0),
            fill: 1.0,
        });
        let dispatcher = dispatcher_with(&[counting.clone() as SubscriberHandle]);

        let mut buffer = [0.7f32; 8];
        // SAFETY: buffer holds frames * out_channels samples.
        unsafe { dispatcher.dispatch(buffer.as_mut_ptr(), std::ptr::null(), 4) };

        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_dispatch_invokes_in_order() {
        let first = Arc::new(CountingSubscriber {
            calls: TestCounter::new(0),
            fill: 0.25,
        });
        let second = Arc::new(CountingSubscriber {
            calls: TestCounter::new(0),
            fill: 0.5,
        });
        let dispatcher = dispatcher_with(&[
            first.clone() as SubscriberHandle,
            second.clone() as SubscriberHandle,
        ]);
        dispatcher.set_running(true);

        let mut buffer = [0.0f32; 8];
        // SAFETY: buffer holds frames * out_channels samples.
        unsafe { dispatcher.dispatch(buffer.as_mut_ptr(), std::ptr::null(), 4) };

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        // Last writer wins: registration order was preserved.
        assert!(buffer.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn test_panicking_subscriber_is_contained() {
        let panicking: SubscriberHandle = Arc::new(PanickingSubscriber);
        let after = Arc::new(CountingSubscriber {
            calls: TestCounter::new(0),
            fill: 0.125,
        });
        let dispatcher = dispatcher_with(&[panicking, after.clone() as SubscriberHandle]);
        dispatcher.set_running(true);

        let mut buffer = [0.9f32; 8];
        // SAFETY: buffer holds frames * out_channels samples.
        unsafe { dispatcher.dispatch(buffer.as_mut_ptr(), std::ptr::null(), 4) };

        // The successor still ran, over a silenced buffer.
        assert_eq!(after.calls.load(Ordering::SeqCst), 1);
        assert!(buffer.iter().all(|s| *s == 0.125));
    }

    #[test]
    fn test_trampoline_null_user_data() {
        // SAFETY: null user_data is the documented no-op case.
        unsafe { role_data_trampoline(std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null(), 64) };
    }
}
