// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RCU-protected subscriber list for one device role.
//!
//! The audio thread walks a snapshot without locks; control threads perform
//! copy-on-write updates. Removal synchronises with in-flight read sections
//! before reporting back, which is what lets the manager promise "no
//! `process` after `release`".

use crate::core::rcu::Rcu;
use crate::device::subscriber::SubscriberHandle;
use crate::error::Result;
use std::sync::Arc;

/// Ordered subscriber list behind an [`Rcu`].
///
/// Registration order is dispatch order. Duplicate handles are allowed;
/// removal deletes the first pointer-identical occurrence.
pub struct SubscriberSet {
    inner: Rcu<Vec<SubscriberHandle>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self {
            inner: Rcu::new(Vec::new()),
        }
    }

    /// Append a handle; returns the new list length.
    pub fn add(&self, handle: SubscriberHandle) -> Result<usize> {
        let mut len = 0;
        self.inner.update(|subs| {
            subs.push(Arc::clone(&handle));
            len = subs.len();
        })?;
        Ok(len)
    }

    /// Remove the first pointer-identical occurrence of `handle`.
    ///
    /// Returns `(new_length, removed)`; absence is a no-op. When a handle
    /// was removed, this waits for every read section that may still be
    /// walking the old snapshot, so the caller can run `release` knowing no
    /// further dispatch will reach the subscriber.
    pub fn remove(&self, handle: &SubscriberHandle) -> Result<(usize, bool)> {
        let mut len = 0;
        let mut removed = false;
        self.inner.update(|subs| {
            if let Some(pos) = subs.iter().position(|s| Arc::ptr_eq(s, handle)) {
                subs.remove(pos);
                removed = true;
            }
            len = subs.len();
        })?;
        if removed {
            self.inner.synchronize();
        }
        Ok((len, removed))
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.inner.read(|subs| subs.len()).unwrap_or(0)
    }

    /// True when no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock-free access to the current snapshot.
    ///
    /// This is the dispatch path: after `register_reader_thread` it performs
    /// no allocation and takes no lock.
    pub fn read<R>(&self, f: impl FnOnce(&[SubscriberHandle]) -> R) -> Result<R> {
        self.inner.read(|subs| f(subs.as_slice()))
    }

    /// Pre-register the calling thread for lock-free snapshots.
    pub fn register_reader_thread(&self) -> Result<()> {
        self.inner.register_current_thread()
    }

    /// Clone of the current snapshot, for control-path iteration.
    pub fn snapshot(&self) -> Result<Vec<SubscriberHandle>> {
        self.inner.read(|subs| subs.to_vec())
    }

    /// Lifecycle-aware add: when `stream` carries the running stream
    /// parameters, `prepare` runs before the handle is published so its
    /// first dispatch finds it ready. A failing `prepare` aborts the add.
    pub(crate) fn add_with_lifecycle(
        &self,
        handle: SubscriberHandle,
        stream: Option<(u32, u32)>,
    ) -> Result<usize> {
        if let Some((sample_rate, buffer_frames)) = stream {
            handle.prepare(sample_rate, buffer_frames)?;
        }
        self.add(handle)
    }

    /// Lifecycle-aware remove: after grace synchronisation, `release` runs
    /// on the removed handle when the role is running.
    pub(crate) fn remove_with_lifecycle(
        &self,
        handle: &SubscriberHandle,
        running: bool,
    ) -> Result<usize> {
        let (len, removed) = self.remove(handle)?;
        if removed && running {
            handle.release();
        }
        Ok(len)
    }

    /// Prepare every current handle for a stream start, in order.
    ///
    /// On failure the already-prepared prefix is released again and the
    /// error reported; the stream must not start.
    pub(crate) fn prepare_all(&self, sample_rate: u32, buffer_frames: u32) -> Result<()> {
        let snapshot = self.snapshot()?;
        for (index, handle) in snapshot.iter().enumerate() {
            if let Err(err) = handle.prepare(sample_rate, buffer_frames) {
                for prepared in &snapshot[..index] {
                    prepared.release();
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Release every current handle after a stream stop, in order.
    pub(crate) fn release_all(&self) {
        if let Ok(snapshot) = self.snapshot() {
            for handle in &snapshot {
                handle.release();
            }
        }
    }
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new()
    }
}
