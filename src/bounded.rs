//! Fixed-capacity blocking SPSC ring.
//!
//! The ring is rounded up to a power of two so positions are a cheap
//! `counter & mask`, and two counting semaphores carry the entire occupancy
//! protocol: `free_slots` gates the producer, `ready_items` gates the
//! consumer. All producer-to-consumer ordering is inherited from the
//! semaphore's internal release/acquire pairing; no other atomics are
//! needed. Both sides can choose try, wait, or wait-with-timeout behavior.

use crate::error::{self, PushError};
use crate::mem;
use crate::sema::Semaphore;
use crossbeam_utils::CachePadded;
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Create a blocking ring that holds up to `cap` elements and return its two
/// ends.
///
/// ## Panics
/// When `cap` is zero.
///
/// ## Examples
/// ```
/// use std::time::Duration;
///
/// let (mut writer, mut reader) = unicast::bounded::queue::<u64>(2);
///
/// writer.push(7);
/// assert_eq!(Some(7), reader.wait_pop_timeout(Duration::from_millis(10)));
/// assert_eq!(None, reader.wait_pop_timeout(Duration::from_millis(10)));
/// ```
pub fn queue<T>(cap: usize) -> (Writer<T>, Reader<T>) {
    assert!(cap >= 1, "capacity must be at least 1");
    let mask = cap.next_power_of_two() - 1;
    let shared = Arc::new(Shared {
        free_slots: Semaphore::new(cap),
        ready_items: Semaphore::new(0),
        slots: mem::alloc_array::<T>(mask + 1),
        mask,
        max_cap: cap,
        next_slot: CachePadded::new(Cell::new(0)),
        next_item: CachePadded::new(Cell::new(0)),
    });
    (
        Writer {
            shared: Arc::clone(&shared),
        },
        Reader { shared },
    )
}

struct Shared<T> {
    free_slots: Semaphore,  // gates the producer
    ready_items: Semaphore, // gates the consumer
    slots: *mut T,
    mask: usize,
    max_cap: usize,
    next_slot: CachePadded<Cell<usize>>, // owned by the producer
    next_item: CachePadded<Cell<usize>>, // owned by the consumer
}

// SAFETY: `next_slot` is only touched by the producer after winning a
// `free_slots` permit and `next_item` only by the consumer after winning a
// `ready_items` permit, so the plain cells are never raced. The slot bytes
// are handed between the sides by the semaphores' release/acquire pairing.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    // Caller must hold a `free_slots` permit.
    fn place(&self, value: T) {
        let slot = self.next_slot.get();
        self.next_slot.set(slot.wrapping_add(1));
        unsafe { self.slots.add(slot & self.mask).write(value) };
        self.ready_items.signal();
    }

    // Caller must hold a `ready_items` permit.
    fn take(&self) -> T {
        let item = self.next_item.get();
        self.next_item.set(item.wrapping_add(1));
        let value = unsafe { self.slots.add(item & self.mask).read() };
        self.free_slots.signal();
        value
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let item = self.next_item.get();
        for i in 0..self.ready_items.available_approx() {
            unsafe { self.slots.add(item.wrapping_add(i) & self.mask).drop_in_place() };
        }
        unsafe { mem::dealloc_array(self.slots, self.mask + 1) };
    }
}

/// Producer end of a blocking ring.
pub struct Writer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Writer<T> {
    /// Append a value without blocking. Fails with [`PushError::Full`] when
    /// no slot is free.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        if !self.shared.free_slots.try_wait() {
            return Err(error::full(value));
        }
        self.shared.place(value);
        Ok(())
    }

    /// Append a value, blocking until a slot is free.
    pub fn push(&mut self, value: T) {
        while !self.shared.free_slots.wait() {}
        self.shared.place(value);
    }

    /// Append a value, blocking up to `timeout` for a slot to become free.
    /// Fails with [`PushError::Timeout`] when the deadline passes, handing
    /// the value back; the queue is unchanged.
    pub fn push_timeout(&mut self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        if !self.shared.free_slots.wait_timeout(timeout) {
            return Err(error::timeout(value));
        }
        self.shared.place(value);
        Ok(())
    }

    /// Number of elements the queue appeared to hold.
    #[inline]
    pub fn size_approx(&self) -> usize {
        self.shared.ready_items.available_approx()
    }

    /// Maximum number of elements the queue can hold at once.
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.shared.max_cap
    }
}

impl<T> fmt::Debug for Writer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("max_capacity", &self.max_capacity())
            .finish_non_exhaustive()
    }
}

/// Consumer end of a blocking ring.
pub struct Reader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Reader<T> {
    /// Remove and return the front element without blocking, or `None` when
    /// the queue is empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        if !self.shared.ready_items.try_wait() {
            return None;
        }
        Some(self.shared.take())
    }

    /// Remove and return the front element, blocking until one is available.
    pub fn wait_pop(&mut self) -> T {
        while !self.shared.ready_items.wait() {}
        self.shared.take()
    }

    /// Remove and return the front element, blocking up to `timeout`.
    /// Returns `None` when the deadline passes first; the queue is
    /// unchanged.
    pub fn wait_pop_timeout(&mut self, timeout: Duration) -> Option<T> {
        if !self.shared.ready_items.wait_timeout(timeout) {
            return None;
        }
        Some(self.shared.take())
    }

    /// Number of elements the queue appeared to hold.
    #[inline]
    pub fn size_approx(&self) -> usize {
        self.shared.ready_items.available_approx()
    }

    /// Maximum number of elements the queue can hold at once.
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.shared.max_cap
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("max_capacity", &self.max_capacity())
            .finish_non_exhaustive()
    }
}
