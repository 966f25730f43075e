// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device manager integration tests
//!
//! End-to-end scenarios against the bundled null backend: dispatch order,
//! subscriber lifecycle while running, route changes and role isolation.

use resound::backend::null::NullBackend;
use resound::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[derive(Default)]
struct SpySubscriber {
    name: &'static str,
    prepared: AtomicU32,
    processed: AtomicU32,
    released: AtomicU32,
    last_frames: AtomicU32,
    last_prepare: Mutex<Option<(u32, u32)>>,
    order_log: Option<Arc<Mutex<Vec<&'static str>>>>,
    process_before_prepare: AtomicBool,
    process_after_release: AtomicBool,
}

impl SpySubscriber {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            ..Default::default()
        })
    }

    fn with_order_log(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            order_log: Some(log),
            ..Default::default()
        })
    }
}

impl AudioSubscriber for SpySubscriber {
    fn prepare(&self, sample_rate: u32, buffer_frames: u32) -> Result<()> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        *self.last_prepare.lock().expect("Spy mutex poisoned") =
            Some((sample_rate, buffer_frames));
        Ok(())
    }

    fn process(&self, _out: &mut [f32], _input: &[f32], frames: u32, _ic: u32, _oc: u32) {
        if self.prepared.load(Ordering::SeqCst) == 0 {
            self.process_before_prepare.store(true, Ordering::SeqCst);
        }
        if self.released.load(Ordering::SeqCst) > 0 {
            self.process_after_release.store(true, Ordering::SeqCst);
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.last_frames.store(frames, Ordering::SeqCst);
        if let Some(log) = &self.order_log {
            log.lock().expect("Order log poisoned").push(self.name);
        }
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spy that copies the output buffer it observes (placed after a producer
/// to capture what the producer wrote).
struct CaptureSpy {
    samples: Mutex<Vec<f32>>,
    frames_seen: AtomicU32,
    frame_sizes: Mutex<Vec<u32>>,
}

impl CaptureSpy {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            samples: Mutex::new(Vec::with_capacity(1 << 16)),
            frames_seen: AtomicU32::new(0),
            frame_sizes: Mutex::new(Vec::new()),
        })
    }
}

impl AudioSubscriber for CaptureSpy {
    fn process(&self, out: &mut [f32], _input: &[f32], frames: u32, _ic: u32, _oc: u32) {
        self.samples
            .lock()
            .expect("Capture mutex poisoned")
            .extend_from_slice(out);
        self.frame_sizes
            .lock()
            .expect("Capture mutex poisoned")
            .push(frames);
        self.frames_seen.fetch_add(frames, Ordering::SeqCst);
    }
}

fn playback_manager(sample_rate: u32, buffer_frames: u32) -> DeviceManager {
    let manager = DeviceManager::new(Box::new(NullBackend::new()));
    let out = manager.enumerate_output_devices()[0].id;
    let config = StreamConfig {
        sample_rate,
        buffer_frames,
        in_channels: 0,
        out_channels: 2,
    };
    manager
        .initialise(None, Some(&out), config)
        .expect("Failed to initialise playback");
    manager
}

#[test]
fn test_enumeration_reports_sample_rates() {
    let manager = DeviceManager::new(Box::new(NullBackend::new()));
    let outputs = manager.enumerate_output_devices();
    let inputs = manager.enumerate_input_devices();
    assert!(!outputs.is_empty());
    assert!(!inputs.is_empty());
    for device in outputs.iter().chain(inputs.iter()) {
        assert!(!device.sample_rates.is_empty(), "{} lacks rates", device.name);
        assert!(device.supports_rate(48_000));
    }
}

/// A sine producer plus a capture spy added second: the spy sees what the
/// producer wrote, sized by the requested frame count.
#[test]
fn test_playback_sine_reaches_second_subscriber() {
    let manager = playback_manager(48_000, 256);

    let rendered = Arc::new(AtomicU32::new(0));
    let rendered_clone = Arc::clone(&rendered);
    let sine = ClosureSubscriber::new(
        move |out: &mut [f32], _in: &[f32], frames: u32, _ic: u32, oc: u32| {
            let base = rendered_clone.fetch_add(frames, Ordering::Relaxed);
            for frame in 0..frames {
                let t = f64::from(base + frame) / 48_000.0;
                let sample = (2.0 * std::f64::consts::PI * 440.0 * t).sin() as f32;
                for ch in 0..oc {
                    out[(frame * oc + ch) as usize] = sample;
                }
            }
        },
    );
    manager
        .add_playback_callback(Arc::new(sine))
        .expect("Failed to add sine subscriber");

    let capture = CaptureSpy::new();
    manager
        .add_playback_callback(capture.clone())
        .expect("Failed to add capture spy");

    manager.start_role(Role::Playback).expect("Failed to start");
    assert!(
        wait_until(Duration::from_secs(2), || {
            capture.frames_seen.load(Ordering::SeqCst) >= 1024
        }),
        "capture spy never saw 1024 frames"
    );
    manager.stop_role(Role::Playback).expect("Failed to stop");

    let samples = capture.samples.lock().expect("Capture mutex poisoned");
    assert!(samples.len() >= 2048); // 1024 frames, stereo
    assert!(
        samples.iter().any(|s| s.abs() > 0.1),
        "sine output never reached the second subscriber"
    );
    let sizes = capture.frame_sizes.lock().expect("Capture mutex poisoned");
    assert!(sizes.iter().all(|&f| f == 256), "unexpected frame count");
}

/// Add A, B, C; remove B; every dispatch sees exactly A then C.
#[test]
fn test_dispatch_order_after_removal() {
    let manager = playback_manager(48_000, 128);
    let order = Arc::new(Mutex::new(Vec::new()));

    let a = SpySubscriber::with_order_log("A", Arc::clone(&order));
    let b = SpySubscriber::with_order_log("B", Arc::clone(&order));
    let c = SpySubscriber::with_order_log("C", Arc::clone(&order));

    manager.add_playback_callback(a.clone()).expect("Failed to add A");
    manager.add_playback_callback(b.clone()).expect("Failed to add B");
    manager.add_playback_callback(c.clone()).expect("Failed to add C");

    let b_handle: SubscriberHandle = b.clone();
    manager
        .remove_playback_callback(&b_handle)
        .expect("Failed to remove B");

    manager.start_role(Role::Playback).expect("Failed to start");
    assert!(
        wait_until(Duration::from_secs(2), || {
            a.processed.load(Ordering::SeqCst) >= 3
        }),
        "A never processed"
    );
    manager.stop_role(Role::Playback).expect("Failed to stop");

    assert_eq!(b.processed.load(Ordering::SeqCst), 0, "B was dispatched");

    let log = order.lock().expect("Order log poisoned");
    assert!(!log.is_empty());
    for (index, name) in log.iter().enumerate() {
        let expected = if index % 2 == 0 { "A" } else { "C" };
        assert_eq!(*name, expected, "dispatch order broke at {}", index);
    }
}

/// Subscriber added while running: prepare before first process, release
/// after last process, each exactly once.
#[test]
fn test_lifecycle_of_subscriber_added_while_running() {
    let manager = playback_manager(48_000, 256);
    manager.start_role(Role::Playback).expect("Failed to start");

    let d = SpySubscriber::new("D");
    manager.add_playback_callback(d.clone()).expect("Failed to add D");

    assert_eq!(d.prepared.load(Ordering::SeqCst), 1);
    assert_eq!(
        *d.last_prepare.lock().expect("Spy mutex poisoned"),
        Some((48_000, 256))
    );

    assert!(
        wait_until(Duration::from_secs(2), || {
            d.processed.load(Ordering::SeqCst) >= 2
        }),
        "D never processed"
    );

    manager.stop_role(Role::Playback).expect("Failed to stop");

    assert_eq!(d.released.load(Ordering::SeqCst), 1);
    assert!(!d.process_before_prepare.load(Ordering::SeqCst));
    let processed_at_stop = d.processed.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(
        d.processed.load(Ordering::SeqCst),
        processed_at_stop,
        "process after stop"
    );
    assert!(!d.process_after_release.load(Ordering::SeqCst));
}

/// Removing while running guarantees no further process after release.
#[test]
fn test_remove_while_running_releases_after_last_process() {
    let manager = playback_manager(48_000, 128);
    let spy = SpySubscriber::new("R");
    manager.add_playback_callback(spy.clone()).expect("Failed to add");
    manager.start_role(Role::Playback).expect("Failed to start");

    assert!(
        wait_until(Duration::from_secs(2), || {
            spy.processed.load(Ordering::SeqCst) >= 1
        }),
        "subscriber never processed"
    );

    let handle: SubscriberHandle = spy.clone();
    manager
        .remove_playback_callback(&handle)
        .expect("Failed to remove");

    assert_eq!(spy.released.load(Ordering::SeqCst), 1);
    let processed_at_removal = spy.processed.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(40));
    assert_eq!(
        spy.processed.load(Ordering::SeqCst),
        processed_at_removal,
        "dispatch after removal"
    );
    assert!(!spy.process_after_release.load(Ordering::SeqCst));

    manager.stop_role(Role::Playback).expect("Failed to stop");
    // Removed before stop: stop's release pass must not touch it again.
    assert_eq!(spy.released.load(Ordering::SeqCst), 1);
}

/// A route change mid-stream shows up as the next callback's frame count
/// and as a notification.
#[test]
fn test_reroute_changes_frame_count() {
    let (backend, controller) = NullBackend::with_controller();
    let manager = DeviceManager::new(Box::new(backend));
    let out = manager.enumerate_output_devices()[0].id;
    let config = StreamConfig {
        sample_rate: 48_000,
        buffer_frames: 256,
        in_channels: 0,
        out_channels: 2,
    };
    manager
        .initialise(None, Some(&out), config)
        .expect("Failed to initialise");

    let notifications = Arc::new(Mutex::new(Vec::new()));
    let notifications_clone = Arc::clone(&notifications);
    manager.set_notification_callback(Some(Box::new(move |kind| {
        notifications_clone
            .lock()
            .expect("Notification log poisoned")
            .push(kind);
    })));

    let spy = SpySubscriber::new("S");
    manager.add_playback_callback(spy.clone()).expect("Failed to add");
    manager.start_role(Role::Playback).expect("Failed to start");

    assert!(
        wait_until(Duration::from_secs(2), || {
            spy.processed.load(Ordering::SeqCst) >= 2
        }),
        "subscriber never processed"
    );
    assert_eq!(spy.last_frames.load(Ordering::SeqCst), 256);

    controller.reroute(512);
    assert!(
        wait_until(Duration::from_secs(2), || {
            spy.last_frames.load(Ordering::SeqCst) == 512
        }),
        "frame count never followed the reroute"
    );
    assert_eq!(manager.buffer_frames(), Some(512));

    manager.stop_role(Role::Playback).expect("Failed to stop");

    let log = notifications.lock().expect("Notification log poisoned");
    assert!(log.contains(&DeviceNotificationType::Rerouted));
    assert!(log.contains(&DeviceNotificationType::Started));
    assert!(log.contains(&DeviceNotificationType::Stopped));
}

/// A playback subscriber is never dispatched by capture or duplex roles.
#[test]
fn test_role_isolation() {
    let manager = DeviceManager::new(Box::new(NullBackend::new()));
    let out = manager.enumerate_output_devices()[0].id;
    let input = manager.enumerate_input_devices()[0].id;
    let config = StreamConfig {
        sample_rate: 48_000,
        buffer_frames: 128,
        in_channels: 1,
        out_channels: 2,
    };
    manager
        .initialise(Some(&input), Some(&out), config)
        .expect("Failed to initialise duplex setup");

    let playback_spy = SpySubscriber::new("P");
    let capture_spy = SpySubscriber::new("C");
    manager
        .add_playback_callback(playback_spy.clone())
        .expect("Failed to add playback spy");
    manager
        .add_capture_callback(capture_spy.clone())
        .expect("Failed to add capture spy");

    // Only capture and duplex run; the playback subscriber must stay idle.
    manager.start_role(Role::Capture).expect("Failed to start capture");
    manager.start_role(Role::Duplex).expect("Failed to start duplex");

    assert!(
        wait_until(Duration::from_secs(2), || {
            capture_spy.processed.load(Ordering::SeqCst) >= 2
        }),
        "capture spy never processed"
    );
    assert_eq!(playback_spy.processed.load(Ordering::SeqCst), 0);

    manager.start_role(Role::Playback).expect("Failed to start playback");
    assert!(
        wait_until(Duration::from_secs(2), || {
            playback_spy.processed.load(Ordering::SeqCst) >= 1
        }),
        "playback spy never processed after start"
    );

    manager.shutdown();
}

/// Capture roles deliver input samples; playback-only roles deliver none.
#[test]
fn test_capture_input_passthrough() {
    let manager = DeviceManager::new(Box::new(NullBackend::new()));
    let input = manager.enumerate_input_devices()[0].id;
    let config = StreamConfig {
        sample_rate: 48_000,
        buffer_frames: 128,
        in_channels: 1,
        out_channels: 0,
    };
    manager
        .initialise(Some(&input), None, config)
        .expect("Failed to initialise capture");

    let saw_input = Arc::new(AtomicBool::new(false));
    let saw_input_clone = Arc::clone(&saw_input);
    let probe = ClosureSubscriber::new(
        move |_out: &mut [f32], input: &[f32], frames: u32, ic: u32, _oc: u32| {
            assert_eq!(input.len(), (frames * ic) as usize);
            if input.iter().any(|s| *s != 0.0) {
                saw_input_clone.store(true, Ordering::SeqCst);
            }
        },
    );
    manager
        .add_capture_callback(Arc::new(probe))
        .expect("Failed to add capture probe");

    manager.start_role(Role::Capture).expect("Failed to start");
    assert!(
        wait_until(Duration::from_secs(2), || saw_input.load(Ordering::SeqCst)),
        "capture probe never saw input samples"
    );
    manager.stop_role(Role::Capture).expect("Failed to stop");
}

/// A subscriber whose prepare fails while the role runs is reported and
/// not added.
#[test]
fn test_failing_prepare_rejected_while_running() {
    struct RefusingSubscriber;
    impl AudioSubscriber for RefusingSubscriber {
        fn prepare(&self, _: u32, _: u32) -> Result<()> {
            Err(Error::SubscriberPrepareFailed("buffer too large".into()))
        }
        fn process(&self, _: &mut [f32], _: &[f32], _: u32, _: u32, _: u32) {}
    }

    let manager = playback_manager(48_000, 256);
    manager.start_role(Role::Playback).expect("Failed to start");

    let ok = SpySubscriber::new("ok");
    assert_eq!(
        manager.add_playback_callback(ok.clone()).expect("Failed to add"),
        1
    );

    let result = manager.add_playback_callback(Arc::new(RefusingSubscriber));
    assert!(matches!(result, Err(Error::SubscriberPrepareFailed(_))));

    // The refused subscriber is absent: the next add lands at slot 2.
    let second = SpySubscriber::new("second");
    assert_eq!(
        manager
            .add_playback_callback(second)
            .expect("Failed to add second"),
        2
    );

    manager.stop_role(Role::Playback).expect("Failed to stop");
}

/// Interruption events reach the notification callback and pause dispatch.
#[test]
fn test_interruption_round_trip() {
    let (backend, controller) = NullBackend::with_controller();
    let manager = DeviceManager::new(Box::new(backend));
    let out = manager.enumerate_output_devices()[0].id;
    manager
        .initialise(
            None,
            Some(&out),
            StreamConfig {
                sample_rate: 48_000,
                buffer_frames: 128,
                in_channels: 0,
                out_channels: 2,
            },
        )
        .expect("Failed to initialise");

    let notifications = Arc::new(Mutex::new(Vec::new()));
    let notifications_clone = Arc::clone(&notifications);
    manager.set_notification_callback(Some(Box::new(move |kind| {
        notifications_clone
            .lock()
            .expect("Notification log poisoned")
            .push(kind);
    })));

    let spy = SpySubscriber::new("I");
    manager.add_playback_callback(spy.clone()).expect("Failed to add");
    manager.start_role(Role::Playback).expect("Failed to start");

    assert!(wait_until(Duration::from_secs(2), || {
        spy.processed.load(Ordering::SeqCst) >= 1
    }));

    controller.begin_interruption();
    assert!(
        wait_until(Duration::from_secs(2), || {
            notifications
                .lock()
                .expect("Notification log poisoned")
                .contains(&DeviceNotificationType::InterruptionBegan)
        }),
        "interruption never surfaced"
    );

    controller.end_interruption();
    assert!(
        wait_until(Duration::from_secs(2), || {
            notifications
                .lock()
                .expect("Notification log poisoned")
                .contains(&DeviceNotificationType::InterruptionEnded)
        }),
        "interruption end never surfaced"
    );

    manager.stop_role(Role::Playback).expect("Failed to stop");
}
