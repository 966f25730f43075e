// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-container reader registry.
//!
//! Each `(Rcu, thread)` pair owns one [`ReaderNode`] on a lock-free singly
//! linked list. Registration CAS-pushes at the head and may race with other
//! registering threads; unlinking happens only under the container's writer
//! mutex, so interior `next` pointers have a single mutator.
//!
//! Node lifetime spans the longer of the container and the owning thread:
//! the thread-local slot and the container each hold an `Arc` of the
//! registry, nodes marked dead are freed during writer cleanup, and whatever
//! is left is freed when the last `Arc` drops.

use crate::error::{Error, Result};
use std::alloc::{alloc, dealloc, Layout};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// One reader thread's entry on a container's reader list.
pub(crate) struct ReaderNode {
    /// Generation observed at read-section entry; 0 = outside any section.
    seen: AtomicU64,
    /// Set by the owning thread's TLS destructor when the thread exits.
    dead: AtomicBool,
    /// Read-section nesting depth. Touched only by the owning thread; atomic
    /// so the node stays `Sync` without an interior-mutability escape hatch.
    depth: AtomicU32,
    next: AtomicPtr<ReaderNode>,
}

impl ReaderNode {
    fn new() -> Self {
        Self {
            seen: AtomicU64::new(0),
            dead: AtomicBool::new(false),
            depth: AtomicU32::new(0),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Enter a read section, observing the container's generation counter.
    ///
    /// Nested entries keep the top-level mark: a writer computing the
    /// minimum in-section generation must keep honouring the oldest
    /// generation this thread may still dereference.
    #[inline]
    pub(crate) fn enter(&self, generation: &AtomicU64) {
        let depth = self.depth.load(Ordering::Relaxed);
        self.depth.store(depth + 1, Ordering::Relaxed);
        if depth == 0 {
            let current = generation.load(Ordering::Acquire);
            self.seen.store(current, Ordering::Relaxed);
            // Publish the mark before the pointer load that follows in the
            // caller. Pairs with the writer-side fence after publish; without
            // the StoreLoad barrier a writer could miss this mark and free
            // the version this reader is about to dereference.
            fence(Ordering::SeqCst);
        }
    }

    /// Leave a read section; clears the mark on the top-level exit.
    #[inline]
    pub(crate) fn exit(&self) {
        let depth = self.depth.load(Ordering::Relaxed) - 1;
        if depth == 0 {
            self.seen.store(0, Ordering::Release);
        }
        self.depth.store(depth, Ordering::Relaxed);
    }
}

fn free_node(node: *mut ReaderNode) {
    // SAFETY: `node` was allocated by `push_new_node` with this exact layout
    // and is reachable from exactly one place when freed (list unlink under
    // the writer mutex, or registry drop with exclusive access).
    unsafe {
        ptr::drop_in_place(node);
        dealloc(node.cast::<u8>(), Layout::new::<ReaderNode>());
    }
}

/// Lock-free list of reader nodes for one RCU container.
pub(crate) struct ReaderRegistry {
    head: AtomicPtr<ReaderNode>,
}

// SAFETY: nodes are reached only through atomic pointers with the protocol
// above; all structural mutation besides head pushes happens under the
// owning container's writer mutex.
unsafe impl Send for ReaderRegistry {}
unsafe impl Sync for ReaderRegistry {}

impl ReaderRegistry {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Allocate a node and CAS-push it onto the list head.
    fn push_new_node(&self) -> Result<*const ReaderNode> {
        let layout = Layout::new::<ReaderNode>();
        // SAFETY: ReaderNode is not zero-sized.
        let raw = unsafe { alloc(layout) }.cast::<ReaderNode>();
        if raw.is_null() {
            return Err(Error::OutOfMemory);
        }
        // SAFETY: `raw` is valid for writes of one ReaderNode.
        unsafe { raw.write(ReaderNode::new()) };

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            // SAFETY: `raw` is not yet shared; plain field store via atomic.
            unsafe { (*raw).next.store(head, Ordering::Relaxed) };
            match self
                .head
                .compare_exchange_weak(head, raw, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(raw),
                Err(current) => head = current,
            }
        }
    }

    /// Smallest non-zero last-seen generation across live nodes.
    ///
    /// `None` means no live reader is inside a read section.
    pub(crate) fn min_in_section_generation(&self) -> Option<u64> {
        let mut min: Option<u64> = None;
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: nodes are never freed while the registry is alive and
            // the caller holds the writer mutex (no concurrent unlink).
            let node = unsafe { &*cur };
            if !node.dead.load(Ordering::Acquire) {
                let seen = node.seen.load(Ordering::Acquire);
                if seen != 0 {
                    min = Some(min.map_or(seen, |m| m.min(seen)));
                }
            }
            cur = node.next.load(Ordering::Acquire);
        }
        min
    }

    /// True if any live reader sits in a read section opened before
    /// `generation`.
    pub(crate) fn any_reader_older_than(&self, generation: u64) -> bool {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: as in `min_in_section_generation`.
            let node = unsafe { &*cur };
            if !node.dead.load(Ordering::Acquire) {
                let seen = node.seen.load(Ordering::Acquire);
                if seen != 0 && seen < generation {
                    return true;
                }
            }
            cur = node.next.load(Ordering::Acquire);
        }
        false
    }

    /// Number of live (not yet pruned, not dead) reader nodes.
    pub(crate) fn live_nodes(&self) -> usize {
        let mut count = 0;
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: as in `min_in_section_generation`.
            let node = unsafe { &*cur };
            if !node.dead.load(Ordering::Acquire) {
                count += 1;
            }
            cur = node.next.load(Ordering::Acquire);
        }
        count
    }

    /// Unlink and free nodes whose owning thread has exited.
    ///
    /// Must be called under the owning container's writer mutex: interior
    /// `next` pointers have no other mutator, and only head detachment races
    /// with concurrent registrations.
    pub(crate) fn prune_dead(&self) {
        // Detach dead nodes at the head; CAS races only with registration.
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return;
            }
            // SAFETY: head node is alive (registry held by caller) and no
            // concurrent prune exists.
            let node = unsafe { &*head };
            if !node.dead.load(Ordering::Acquire) {
                break;
            }
            let next = node.next.load(Ordering::Acquire);
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                free_node(head);
            }
            // On CAS failure a registration won the head; retry.
        }

        // Interior nodes: predecessor is live, links are ours alone.
        let prev_ptr = self.head.load(Ordering::Acquire);
        if prev_ptr.is_null() {
            return;
        }
        // SAFETY: see above; traversal below only touches nodes still linked.
        let mut prev = unsafe { &*prev_ptr };
        let mut cur = prev.next.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: `cur` is linked and cannot be freed concurrently.
            let node = unsafe { &*cur };
            let next = node.next.load(Ordering::Acquire);
            if node.dead.load(Ordering::Acquire) {
                prev.next.store(next, Ordering::Release);
                free_node(cur);
            } else {
                prev = node;
            }
            cur = next;
        }
    }
}

impl Drop for ReaderRegistry {
    fn drop(&mut self) {
        // Last Arc holder: every thread slot referencing this registry is
        // gone, so remaining nodes (dead or not) have no readers left.
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            // SAFETY: exclusive access in Drop.
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) };
            free_node(cur);
            cur = next;
        }
    }
}

/// Thread-local slot keeping a reader node (and its registry) alive for the
/// owning thread's lifetime.
struct ThreadSlot {
    /// Keeps node memory valid even if the container is dropped first.
    _registry: Arc<ReaderRegistry>,
    node: *const ReaderNode,
}

struct ThreadReaderMap {
    entries: HashMap<usize, ThreadSlot>,
}

impl Drop for ThreadReaderMap {
    fn drop(&mut self) {
        for slot in self.entries.values() {
            // SAFETY: the slot's Arc keeps the node allocation alive; the
            // writer frees it only after observing the dead flag.
            unsafe { (*slot.node).dead.store(true, Ordering::Release) };
        }
    }
}

thread_local! {
    static THREAD_READERS: RefCell<ThreadReaderMap> = RefCell::new(ThreadReaderMap {
        entries: HashMap::new(),
    });
}

/// Find or create the calling thread's node for `registry`.
///
/// Keyed by registry identity: one thread can read from many containers
/// without cross-contamination. The returned pointer stays valid for the
/// rest of the thread's lifetime.
pub(crate) fn acquire_node(registry: &Arc<ReaderRegistry>) -> Result<*const ReaderNode> {
    let key = Arc::as_ptr(registry) as usize;
    THREAD_READERS
        .try_with(|map| {
            let mut map = map.borrow_mut();
            if let Some(slot) = map.entries.get(&key) {
                return Ok(slot.node);
            }
            let node = registry.push_new_node()?;
            map.entries.insert(
                key,
                ThreadSlot {
                    _registry: Arc::clone(registry),
                    node,
                },
            );
            Ok(node)
        })
        // TLS already destructed: the thread is exiting and can no longer
        // register as a reader.
        .unwrap_or(Err(Error::OutOfMemory))
}
