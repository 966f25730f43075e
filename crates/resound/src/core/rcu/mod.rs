// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read-Copy-Update container for real-time readers.
//!
//! [`Rcu`] lets a real-time thread read shared data with a bounded sequence
//! of atomic operations: no locks, no allocation after pre-registration, no
//! waiting on writers. Writers clone the current version under a mutex,
//! mutate the clone, publish it atomically and defer reclamation of the
//! predecessor until no reader can still observe it.
//!
//! # Usage
//!
//! ```rust
//! use resound::core::rcu::Rcu;
//!
//! let gains = Rcu::new(vec![1.0f32; 16]);
//!
//! // Control thread: copy-on-write update.
//! gains.update(|g| g[3] = 0.5).expect("Failed to update gains");
//!
//! // Audio thread: lock-free read (pre-register once to avoid allocation).
//! gains.register_current_thread().expect("Failed to register reader");
//! let g3 = gains.read(|g| g[3]).expect("Failed to read gains");
//! assert_eq!(g3, 0.5);
//! ```
//!
//! # Reclamation
//!
//! Every publish appends the predecessor to a retire list tagged with the
//! generation at retirement, then runs tiered cleanup:
//!
//! - **Opportunistic** (every publish): free entries older than the minimum
//!   in-section reader generation; free everything when no reader is inside
//!   a read section.
//! - **Threshold** (list length >= soft limit): repeat the scan up to
//!   [`RETIRE_SCAN_PASSES`](crate::config::RETIRE_SCAN_PASSES) times,
//!   yielding between passes, stopping early below half the soft limit.
//! - **Emergency** (list length >= hard limit): block until all stale
//!   readers leave their sections, then drain the list. Writers only; a
//!   reader thread never takes this path.
//!
//! # Reentrancy
//!
//! A reader closure may issue a nested `read` on the same container; the
//! top-level generation mark is retained. A reader closure must NOT call
//! `update` or `synchronize` on the same container (writer-mutex
//! self-deadlock).

mod registry;
mod retire;

use crate::config::{RETIRE_HARD_LIMIT, RETIRE_SCAN_PASSES, RETIRE_SOFT_LIMIT};
use crate::error::{Error, Result};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use registry::ReaderRegistry;
use retire::RetireList;
use std::alloc::{alloc, Layout};
use std::sync::atomic::{fence, AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;

/// Writer-side state, serialised by the writer mutex.
struct WriterShared<T> {
    retired: RetireList<T>,
}

/// Lock-free-read, copy-on-write shared container.
///
/// All registry and reclamation state is per-instance: readers of one
/// container never contend with writers of another, and dropping a
/// container touches nothing else.
pub struct Rcu<T> {
    /// Currently published version. Readers take an acquire snapshot.
    current: AtomicPtr<T>,
    /// Monotonic publish counter. Starts at 1 so a reader mark of 0 always
    /// means "outside any read section".
    generation: AtomicU64,
    writer: Mutex<WriterShared<T>>,
    readers: Arc<ReaderRegistry>,
    soft_limit: usize,
    hard_limit: usize,
}

// SAFETY: readers on any thread receive `&T` (requires `T: Sync`) and
// versions are created and dropped on writer/owner threads (requires
// `T: Send`). All shared internals follow the atomic protocols documented
// in `registry`/`retire`.
unsafe impl<T: Send + Sync> Send for Rcu<T> {}
unsafe impl<T: Send + Sync> Sync for Rcu<T> {}

/// Fallible boxing so an exhausted allocator surfaces as `OutOfMemory`
/// instead of aborting the writer.
fn try_box<T>(value: T) -> Result<Box<T>> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        // Zero-sized payloads never allocate.
        return Ok(Box::new(value));
    }
    // SAFETY: layout is non-zero sized.
    let raw = unsafe { alloc(layout) }.cast::<T>();
    if raw.is_null() {
        return Err(Error::OutOfMemory);
    }
    // SAFETY: `raw` is valid for writes of one `T`; `from_raw` pairs with
    // the global allocator allocation above.
    unsafe {
        raw.write(value);
        Ok(Box::from_raw(raw))
    }
}

/// Clears the reader mark on scope exit so a panicking reader closure does
/// not wedge writers in the grace wait.
struct SectionGuard<'a> {
    node: &'a registry::ReaderNode,
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        self.node.exit();
    }
}

impl<T: Clone> Rcu<T> {
    /// Create a container holding `initial`, with the default retire-list
    /// thresholds.
    pub fn new(initial: T) -> Self {
        Self::with_thresholds(initial, RETIRE_SOFT_LIMIT, RETIRE_HARD_LIMIT)
    }

    /// Create a container with explicit soft/hard retire-list thresholds.
    ///
    /// # Panics
    /// Panics if `soft_limit` is 0 or exceeds `hard_limit`.
    pub fn with_thresholds(initial: T, soft_limit: usize, hard_limit: usize) -> Self {
        assert!(soft_limit > 0, "soft limit must be > 0");
        assert!(soft_limit <= hard_limit, "soft limit must be <= hard limit");
        Self {
            current: AtomicPtr::new(Box::into_raw(Box::new(initial))),
            generation: AtomicU64::new(1),
            writer: Mutex::new(WriterShared {
                retired: RetireList::new(),
            }),
            readers: Arc::new(ReaderRegistry::new()),
            soft_limit,
            hard_limit,
        }
    }

    /// Register the calling thread as a reader of this container.
    ///
    /// After registration, `read` performs no allocation and acquires no
    /// lock. Call this from a real-time thread (or on its behalf during
    /// warm-up) before the first deadline-bound read.
    pub fn register_current_thread(&self) -> Result<()> {
        registry::acquire_node(&self.readers).map(|_| ())
    }

    /// Invoke `f` with a stable reference to the current version.
    ///
    /// Never blocks on writers and never fails after the calling thread has
    /// been registered. Reentrant reads on the same container are permitted;
    /// calling `update`/`replace`/`synchronize` from inside `f` deadlocks.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let node_ptr = registry::acquire_node(&self.readers)?;
        // SAFETY: the node outlives this call: the thread-local slot pins it
        // for the thread's lifetime and `self.readers` pins the registry.
        let node = unsafe { &*node_ptr };

        node.enter(&self.generation);
        let guard = SectionGuard { node };
        let ptr = self.current.load(Ordering::Acquire);
        // SAFETY: the published mark keeps this version off the reclaimed
        // set until the section guard drops (see `enter` for the fence
        // pairing with writers).
        let result = f(unsafe { &*ptr });
        drop(guard);
        Ok(result)
    }

    /// Clone the current version, apply `mutate`, publish the result.
    ///
    /// On success the predecessor is retired and tiered cleanup runs. On
    /// allocation failure nothing is published. A panicking `mutate`
    /// propagates after the writer mutex is released, with the published
    /// state unchanged (strong guarantee).
    pub fn update(&self, mutate: impl FnOnce(&mut T)) -> Result<()> {
        let mut shared = self.writer.lock();

        let old = self.current.load(Ordering::Relaxed);
        // SAFETY: `old` is the live version; the writer mutex excludes
        // concurrent publication and retirement.
        let mut clone = try_box(unsafe { (*old).clone() })?;
        mutate(&mut *clone);

        let new = Box::into_raw(clone);
        self.current.store(new, Ordering::Release);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        // Make the publish visible before scanning reader marks; pairs with
        // the reader-side fence in `ReaderNode::enter`.
        fence(Ordering::SeqCst);

        shared.retired.push(old, generation);
        self.cleanup(&mut shared);
        Ok(())
    }

    /// Publish `value` as the new current version.
    pub fn replace(&self, value: T) -> Result<()> {
        self.update(move |slot| *slot = value)
    }

    /// Block until every live reader has left any read section opened
    /// before the current generation.
    ///
    /// Control threads only. Used by subscriber removal to guarantee no
    /// further dispatch before `release`, and by emergency cleanup.
    pub fn synchronize(&self) {
        let _guard = self.writer.lock();
        self.wait_for_stale_readers(self.generation.load(Ordering::Acquire));
    }

    /// Current publish generation (diagnostic).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of retired versions awaiting reclamation (diagnostic).
    pub fn retired_len(&self) -> usize {
        self.writer.lock().retired.len()
    }

    /// Number of live registered reader threads (diagnostic).
    pub fn reader_count(&self) -> usize {
        // Node traversal may race with pruning; hold the writer mutex.
        let _guard = self.writer.lock();
        self.readers.live_nodes()
    }

    fn cleanup(&self, shared: &mut WriterShared<T>) {
        self.opportunistic(shared);

        if shared.retired.len() >= self.soft_limit {
            for _ in 0..RETIRE_SCAN_PASSES {
                if shared.retired.len() < self.soft_limit / 2 {
                    break;
                }
                std::thread::yield_now();
                self.opportunistic(shared);
            }
        }

        if shared.retired.len() >= self.hard_limit {
            // Writers block here; readers never do. Once stale readers have
            // drained, everything on the list predates every remaining
            // section and can go.
            self.wait_for_stale_readers(self.generation.load(Ordering::Acquire));
            shared.retired.free_all();
        }

        self.readers.prune_dead();
    }

    fn opportunistic(&self, shared: &mut WriterShared<T>) {
        match self.readers.min_in_section_generation() {
            None => shared.retired.free_all(),
            Some(min) => shared.retired.free_older_than(min),
        }
    }

    fn wait_for_stale_readers(&self, generation: u64) {
        let backoff = Backoff::new();
        while self.readers.any_reader_older_than(generation) {
            backoff.snooze();
        }
    }
}

impl<T> Drop for Rcu<T> {
    fn drop(&mut self) {
        // Exclusive access: no read section can be open on this container.
        // Retired versions die with the writer state; the current version
        // is freed here. Reader nodes outlive us through the registry Arc
        // held by their threads' TLS slots.
        let current = *self.current.get_mut();
        // SAFETY: `current` was produced by `Box::into_raw` and is not on
        // the retire list (only predecessors are).
        unsafe { drop(Box::from_raw(current)) };
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Rcu<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let generation = self.generation();
        match self.read(|value| format!("{:?}", value)) {
            Ok(value) => f
                .debug_struct("Rcu")
                .field("generation", &generation)
                .field("current", &value)
                .finish(),
            Err(_) => f
                .debug_struct("Rcu")
                .field("generation", &generation)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_initial_value() {
        let rcu = Rcu::new(41u32);
        let value = rcu.read(|v| *v).expect("Failed to read");
        assert_eq!(value, 41);
        assert_eq!(rcu.generation(), 1);
    }

    #[test]
    fn test_update_publishes_new_version() {
        let rcu = Rcu::new(vec![1u32, 2, 3]);
        rcu.update(|v| v.push(4)).expect("Failed to update");
        let len = rcu.read(|v| v.len()).expect("Failed to read");
        assert_eq!(len, 4);
        assert_eq!(rcu.generation(), 2);
    }

    #[test]
    fn test_replace_overwrites() {
        let rcu = Rcu::new(String::from("old"));
        rcu.replace(String::from("new")).expect("Failed to replace");
        let value = rcu.read(|v| v.clone()).expect("Failed to read");
        assert_eq!(value, "new");
    }

    #[test]
    fn test_reentrant_read() {
        let rcu = Rcu::new(10u32);
        let sum = rcu
            .read(|outer| {
                let inner = rcu.read(|v| *v).expect("Failed nested read");
                outer + inner
            })
            .expect("Failed outer read");
        assert_eq!(sum, 20);
    }

    #[test]
    fn test_retire_list_drains_without_readers() {
        let rcu = Rcu::new(0u64);
        for i in 1..=100 {
            rcu.update(|v| *v = i).expect("Failed to update");
        }
        // No reader is in a section, so every cleanup ran free_all.
        assert_eq!(rcu.retired_len(), 0);
        assert_eq!(rcu.read(|v| *v).expect("Failed to read"), 100);
    }

    #[test]
    fn test_panicking_mutator_leaves_state_unchanged() {
        let rcu = Rcu::new(7u32);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = rcu.update(|_| panic!("mutator failure"));
        }));
        assert!(outcome.is_err());
        assert_eq!(rcu.read(|v| *v).expect("Failed to read"), 7);
        assert_eq!(rcu.generation(), 1);
        // Writer mutex was released during unwind.
        rcu.update(|v| *v = 8).expect("Failed to update after panic");
        assert_eq!(rcu.read(|v| *v).expect("Failed to read"), 8);
    }

    #[test]
    fn test_pre_registration_is_idempotent() {
        let rcu = Rcu::new(1u8);
        rcu.register_current_thread().expect("Failed to register");
        rcu.register_current_thread().expect("Failed to register twice");
        assert_eq!(rcu.reader_count(), 1);
    }

    #[test]
    fn test_reader_thread_exit_is_cleaned_up() {
        let rcu = Arc::new(Rcu::new(0u32));
        let rcu_clone = Arc::clone(&rcu);
        std::thread::spawn(move || {
            rcu_clone.read(|v| *v).expect("Failed to read in thread");
        })
        .join()
        .expect("Reader thread panicked");

        assert_eq!(rcu.reader_count(), 0);
        // Next update prunes the dead node.
        rcu.update(|v| *v += 1).expect("Failed to update");
        assert_eq!(rcu.reader_count(), 0);
    }

    #[test]
    fn test_synchronize_without_readers_returns() {
        let rcu = Rcu::new(0u32);
        rcu.synchronize();
    }

    #[test]
    fn test_debug_format() {
        let rcu = Rcu::new(5u32);
        let formatted = format!("{:?}", rcu);
        assert!(formatted.contains("generation"));
    }
}
