// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Bounded lock-free MPMC ring with per-slot sequence numbers
//! INVARIANTS:
//!   - `N` is a power of two (rejected at compile time otherwise)
//!   - slot `i` is writable when `seq == pos`, readable when `seq == pos + 1`
//!   - a full ring drops the pushed value; nothing blocks or allocates
//!
//! Producers and consumers may run concurrently on any core, including from trap
//! handlers. The claim/publish protocol: a producer wins a CAS on `tail`, writes the
//! payload, then publishes `seq = tail + 1`; a consumer wins a CAS on `head`, copies
//! the payload out and republishes `seq = head + N` for the next lap.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

#[repr(align(64))]
struct CachePadded(AtomicUsize);

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub struct RingBuffer<T, const N: usize> {
    head: CachePadded,
    tail: CachePadded,
    slots: [Slot<T>; N],
}

unsafe impl<T: Send, const N: usize> Send for RingBuffer<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for RingBuffer<T, N> {}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    const MASK: usize = N - 1;
    const POWER_OF_TWO: () = assert!(N.is_power_of_two(), "ring capacity must be a power of two");

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::POWER_OF_TWO;
        Self {
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
            slots: core::array::from_fn(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            }),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Appends `value`; returns `false` when `N` unread values are already queued.
    pub fn push(&self, value: T) -> bool {
        let mut tail = self.tail.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[tail & Self::MASK];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(tail) as isize;
            if diff == 0 {
                match self.tail.0.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the CAS grants exclusive write access to this slot
                        // until the sequence is published below.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(tail.wrapping_add(1), Ordering::Release);
                        return true;
                    }
                    Err(current) => tail = current,
                }
            } else if diff < 0 {
                return false;
            } else {
                tail = self.tail.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Removes the oldest value, or `None` when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        let mut head = self.head.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head & Self::MASK];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(head.wrapping_add(1)) as isize;
            if diff == 0 {
                match self.head.0.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: sequence == head + 1 means a producer published this slot
                        // and the CAS above made this consumer its only reader.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence.store(head.wrapping_add(N), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => head = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                head = self.head.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Drops every queued value.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }

    /// Snapshot of queued values; exact only when no producer or consumer is active.
    pub fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
