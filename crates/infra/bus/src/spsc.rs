//! Bounded SPSC ring
//!
//! COMPLIANCE:
//! - Zero allocations after construction
//! - Single producer, single consumer (enforced by non-`Clone` halves)
//! - Head and tail on separate cache lines to prevent false sharing
//! - Wait-free push and pop

use crate::RingError;
use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Storage shared by both halves
///
/// `head` and `tail` are free-running counters; a slot index is the counter
/// masked by `capacity - 1`. The ring is empty when `head == tail` and full
/// when `tail - head == capacity`.
struct Shared<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next slot to read, written only by the consumer
    head: CachePadded<AtomicUsize>,
    /// Next slot to write, written only by the producer
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: a slot is written only by the producer before it publishes `tail`
// and read only by the consumer after it observes that `tail`, so no slot is
// ever accessed from two threads at once.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline(always)]
    const fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut pos = head;
        while pos != tail {
            // SAFETY: every slot in [head, tail) was initialised by a push and
            // not yet consumed; both halves are gone so access is exclusive.
            unsafe { self.slots[pos & self.mask].get_mut().assume_init_drop() };
            pos = pos.wrapping_add(1);
        }
    }
}

/// Create a ring with room for `capacity` items
///
/// # Errors
/// Returns [`RingError::InvalidCapacity`] unless `capacity` is a non-zero
/// power of two
pub fn channel<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), RingError> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(RingError::InvalidCapacity { capacity });
    }

    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        slots,
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
    });

    debug!(capacity, "SPSC ring created");

    Ok((
        Producer {
            shared: Arc::clone(&shared),
            tail: 0,
            cached_head: 0,
        },
        Consumer {
            shared,
            head: 0,
            cached_tail: 0,
        },
    ))
}

/// Writing half of the ring
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of the tail, only this half advances it
    tail: usize,
    /// Last observed head, refreshed only when the ring looks full
    cached_head: usize,
}

impl<T> Producer<T> {
    /// Push a value without blocking
    ///
    /// # Errors
    /// Hands the value back when the ring is full
    #[inline(always)]
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let capacity = self.shared.capacity();

        if self.tail.wrapping_sub(self.cached_head) == capacity {
            self.cached_head = self.shared.head.load(Ordering::Acquire);
            if self.tail.wrapping_sub(self.cached_head) == capacity {
                return Err(value);
            }
        }

        let slot = &self.shared.slots[self.tail & self.shared.mask];
        // SAFETY: the slot lies outside [head, tail), so the consumer is not
        // reading it and it holds no live value.
        unsafe { (*slot.get()).write(value) };

        self.tail = self.tail.wrapping_add(1);
        self.shared.tail.store(self.tail, Ordering::Release);
        Ok(())
    }

    /// Number of items waiting to be consumed
    #[inline]
    pub fn len(&self) -> usize {
        self.tail.wrapping_sub(self.shared.head.load(Ordering::Acquire))
    }

    /// Check if the consumer has drained everything pushed so far
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// Reading half of the ring
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of the head, only this half advances it
    head: usize,
    /// Last observed tail, refreshed only when the ring looks empty
    cached_tail: usize,
}

impl<T> Consumer<T> {
    /// Pop the oldest value without blocking, `None` when empty
    #[inline(always)]
    pub fn pop(&mut self) -> Option<T> {
        if self.head == self.cached_tail {
            self.cached_tail = self.shared.tail.load(Ordering::Acquire);
            if self.head == self.cached_tail {
                return None;
            }
        }

        let slot = &self.shared.slots[self.head & self.shared.mask];
        // SAFETY: head < tail, so the producer initialised this slot and
        // published it with the release store we just acquired.
        let value = unsafe { (*slot.get()).assume_init_read() };

        self.head = self.head.wrapping_add(1);
        self.shared.head.store(self.head, Ordering::Release);
        Some(value)
    }

    /// Number of items available to pop
    #[inline]
    pub fn len(&self) -> usize {
        self.shared
            .tail
            .load(Ordering::Acquire)
            .wrapping_sub(self.head)
    }

    /// Check if nothing is available to pop
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}
