//! Bounded single-producer / single-consumer ring.
//!
//! The decoupling primitive between a simulation worker and a downstream
//! consumer thread (e.g. a durable event writer). One thread owns the
//! `Producer`, one thread owns the `Consumer`; the type system enforces the
//! single-writer constraint on each end.
//!
//! Publication protocol:
//! - the producer constructs the value in its slot, then advances `head`
//!   with a release store, publishing the construction;
//! - the consumer loads `head` with acquire before touching the slot, so a
//!   popped value is always fully constructed;
//! - the consumer moves the value out, then advances `tail` with a release
//!   store, publishing the freed slot;
//! - the producer loads `tail` with acquire before reusing a slot.
//!
//! Indices are monotone and wrap with `usize` arithmetic; `head - tail`
//! stays in `[0, capacity]`, so full is `head - tail == capacity` and empty
//! is `head == tail`. Head and tail live on separate cache lines. There are
//! no timeouts; callers busy-wait or yield externally.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

struct Shared<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
}

// Safety: slot access is partitioned by the head/tail protocol above; each
// slot is touched by exactly one side at a time.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Both handles are gone; drop whatever was pushed but never popped.
        let mut tail = *self.tail.get_mut();
        let head = *self.head.get_mut();
        while tail != head {
            // Safety: slots in [tail, head) hold initialized values.
            unsafe { (*self.slots[tail & self.mask].get()).assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Create a ring with at least `capacity` slots (rounded up to a power of
/// two, minimum 2) and split it into its two endpoint handles.
pub fn ring<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let cap = capacity.max(2).next_power_of_two();
    let slots: Box<[UnsafeCell<MaybeUninit<T>>]> =
        (0..cap).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
    let shared = Arc::new(Shared {
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        slots,
        mask: cap - 1,
    });
    (
        Producer { shared: Arc::clone(&shared) },
        Consumer { shared },
    )
}

/// Writing end of the ring. Owned by exactly one thread.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Producer<T> {
    /// Push a value; on a full ring the value is handed back unchanged.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == self.capacity() {
            return Err(value);
        }
        // Safety: the slot at `head` is free (tail acquire above) and only
        // this producer writes it.
        unsafe { (*self.shared.slots[head & self.shared.mask].get()).write(value) };
        self.shared.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) == self.capacity()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.mask + 1
    }
}

/// Reading end of the ring. Owned by exactly one thread.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Consumer<T> {
    /// Pop the oldest value, or `None` when the ring is empty.
    pub fn try_pop(&mut self) -> Option<T> {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        // Safety: the slot at `tail` was published by the head release
        // store and only this consumer reads it.
        let value = unsafe { (*self.shared.slots[tail & self.shared.mask].get()).assume_init_read() };
        self.shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        tail == head
    }

    /// Number of values currently buffered.
    pub fn len(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.mask + 1
    }
}
