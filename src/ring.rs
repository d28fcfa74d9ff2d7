//! Fixed-capacity SPSC slot ring.
//!
//! A single circular array of `size + 1` slots with one atomic index per
//! side. The spare slot keeps "empty" (`read == write`) and "full"
//! (`write + 1 == read`) distinguishable without extra state. Never
//! allocates after construction and never blocks; a full queue rejects the
//! push, an empty queue returns `None`.

use crate::error::{self, PushError};
use crate::mem;
use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Create a slot ring that holds up to `size` elements and return its two
/// ends. The writer end moves to the producer thread, the reader end to the
/// consumer thread.
///
/// ## Panics
/// When `size` is zero.
///
/// ## Examples
/// ```
/// let (mut writer, mut reader) = unicast::ring::queue::<u64>(4);
///
/// writer.push(1).unwrap();
/// writer.push(2).unwrap();
///
/// assert_eq!(Some(1), reader.try_pop());
/// assert_eq!(Some(2), reader.try_pop());
/// assert_eq!(None, reader.try_pop());
/// ```
pub fn queue<T>(size: usize) -> (Writer<T>, Reader<T>) {
    assert!(size >= 1, "size must be at least 1");
    let capacity = size + 1; // one slot always stays empty
    let shared = Arc::new(Shared {
        write_index: CachePadded::new(AtomicUsize::new(0)),
        read_index: CachePadded::new(AtomicUsize::new(0)),
        slots: mem::alloc_array::<T>(capacity),
        capacity,
    });
    (
        Writer {
            shared: Arc::clone(&shared),
        },
        Reader { shared },
    )
}

struct Shared<T> {
    write_index: CachePadded<AtomicUsize>, // owned by the producer
    read_index: CachePadded<AtomicUsize>,  // owned by the consumer
    slots: *mut T,
    capacity: usize,
}

// SAFETY: every slot is exclusively owned by one side at a time. The producer
// owns a slot until it publishes the write index advance with release; the
// consumer owns it until it publishes the read index advance. The acquire
// load of the peer index is what transfers that ownership.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    /// Successor of `index` in the ring.
    #[inline]
    fn next_index(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.capacity {
            0
        } else {
            next
        }
    }

    fn is_empty(&self) -> bool {
        self.read_index.load(Ordering::Acquire) == self.write_index.load(Ordering::Acquire)
    }

    fn is_full(&self) -> bool {
        let next = self.next_index(self.write_index.load(Ordering::Acquire));
        next == self.read_index.load(Ordering::Acquire)
    }

    fn size_guess(&self) -> usize {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            write + self.capacity - read
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut read = self.read_index.load(Ordering::Relaxed);
        let write = self.write_index.load(Ordering::Relaxed);
        while read != write {
            unsafe { self.slots.add(read).drop_in_place() };
            read = self.next_index(read);
        }
        unsafe { mem::dealloc_array(self.slots, self.capacity) };
    }
}

/// Producer end of a slot ring. Only a single thread may hold it at a time.
pub struct Writer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Writer<T> {
    /// Append a value to the back of the queue. Fails with
    /// [`PushError::Full`] when no slot is free, handing the value back.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        let shared = &*self.shared;
        let write = shared.write_index.load(Ordering::Relaxed);
        let next = shared.next_index(write);
        if next == shared.read_index.load(Ordering::Acquire) {
            return Err(error::full(value));
        }
        unsafe { shared.slots.add(write).write(value) };
        shared.write_index.store(next, Ordering::Release);
        Ok(())
    }

    /// Whether the queue looked empty. Approximate under concurrent use.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Whether the queue looked full. Approximate under concurrent use.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    /// Number of elements the queue appeared to hold. From the producer side
    /// the true size may be less, because the consumer may be removing
    /// elements concurrently.
    #[inline]
    pub fn size_guess(&self) -> usize {
        self.shared.size_guess()
    }

    /// Maximum number of elements the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity - 1
    }
}

impl<T> fmt::Debug for Writer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer").field("capacity", &self.capacity()).finish_non_exhaustive()
    }
}

/// Consumer end of a slot ring. Only a single thread may hold it at a time.
pub struct Reader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Reader<T> {
    /// Remove and return the element at the front of the queue, or `None`
    /// when the queue looked empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let read = shared.read_index.load(Ordering::Relaxed);
        if read == shared.write_index.load(Ordering::Acquire) {
            return None;
        }
        let value = unsafe { shared.slots.add(read).read() };
        shared.read_index.store(shared.next_index(read), Ordering::Release);
        Some(value)
    }

    /// Borrow the element at the front of the queue without removing it.
    /// The borrow ends before any other queue operation can run.
    #[inline]
    pub fn peek(&mut self) -> Option<&T> {
        let shared = &*self.shared;
        let read = shared.read_index.load(Ordering::Relaxed);
        if read == shared.write_index.load(Ordering::Acquire) {
            return None;
        }
        Some(unsafe { &*shared.slots.add(read) })
    }

    /// Drop the element at the front of the queue without returning it.
    ///
    /// ## Panics
    /// When the queue is empty.
    pub fn pop_front(&mut self) {
        let shared = &*self.shared;
        let read = shared.read_index.load(Ordering::Relaxed);
        assert!(
            read != shared.write_index.load(Ordering::Acquire),
            "pop_front on an empty queue"
        );
        unsafe { shared.slots.add(read).drop_in_place() };
        shared.read_index.store(shared.next_index(read), Ordering::Release);
    }

    /// Whether the queue looked empty. Approximate under concurrent use.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Whether the queue looked full. Approximate under concurrent use.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    /// Number of elements the queue appeared to hold. From the consumer side
    /// the true size may be more, because the producer may be adding
    /// elements concurrently.
    #[inline]
    pub fn size_guess(&self) -> usize {
        self.shared.size_guess()
    }

    /// Maximum number of elements the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity - 1
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").field("capacity", &self.capacity()).finish_non_exhaustive()
    }
}
