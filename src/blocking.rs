//! Blocking wrapper over the growable queue.
//!
//! Pairs an [`unbounded`](crate::unbounded) queue with one counting
//! semaphore that tracks ready items. Every successful push signals the
//! semaphore after the inner push returns, so a consumer that won a permit
//! is guaranteed to find an element visible; the inner pop after a
//! successful wait therefore cannot fail.

use crate::error::PushError;
use crate::sema::Semaphore;
use crate::unbounded;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Create a growable queue with blocking dequeue support and return its two
/// ends.
///
/// ## Examples
/// ```
/// use std::time::Duration;
///
/// let (mut writer, mut reader) = unicast::blocking::queue::<u64>(15);
///
/// writer.push(99).unwrap();
/// assert_eq!(99, reader.wait_pop());
/// assert_eq!(None, reader.wait_pop_timeout(Duration::from_millis(10)));
/// ```
pub fn queue<T>(size: usize) -> (Writer<T>, Reader<T>) {
    queue_with_block_size::<T, { unbounded::DEFAULT_MAX_BLOCK_SIZE }>(size)
}

/// Like [`queue`] but with an explicit block size cap. `MAX_BLOCK` must be a
/// power of two of at least 2.
pub fn queue_with_block_size<T, const MAX_BLOCK: usize>(
    size: usize,
) -> (Writer<T, MAX_BLOCK>, Reader<T, MAX_BLOCK>) {
    let (inner_writer, inner_reader) = unbounded::queue_with_block_size::<T, MAX_BLOCK>(size);
    let ready = Arc::new(Semaphore::new(0));
    (
        Writer {
            inner: inner_writer,
            ready: Arc::clone(&ready),
        },
        Reader {
            inner: inner_reader,
            ready,
        },
    )
}

/// Producer end of a blocking growable queue.
pub struct Writer<T, const MAX_BLOCK: usize = { unbounded::DEFAULT_MAX_BLOCK_SIZE }> {
    inner: unbounded::Writer<T, MAX_BLOCK>,
    ready: Arc<Semaphore>,
}

impl<T, const MAX_BLOCK: usize> Writer<T, MAX_BLOCK> {
    /// Append a value, allocating another block when the ring is saturated.
    /// Fails only with [`PushError::Alloc`] when that allocation fails.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.inner.push(value)?;
        self.ready.signal();
        Ok(())
    }

    /// Append a value without allocating. Fails with [`PushError::Full`]
    /// when every block in the ring is occupied.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.inner.try_push(value)?;
        self.ready.signal();
        Ok(())
    }

    /// Number of elements the queue appeared to hold.
    #[inline]
    pub fn size_approx(&self) -> usize {
        self.ready.available_approx()
    }

    /// Total number of elements the queue could hold without allocating,
    /// were it empty.
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.inner.max_capacity()
    }
}

impl<T, const MAX_BLOCK: usize> fmt::Debug for Writer<T, MAX_BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer").finish_non_exhaustive()
    }
}

/// Consumer end of a blocking growable queue.
pub struct Reader<T, const MAX_BLOCK: usize = { unbounded::DEFAULT_MAX_BLOCK_SIZE }> {
    inner: unbounded::Reader<T, MAX_BLOCK>,
    ready: Arc<Semaphore>,
}

impl<T, const MAX_BLOCK: usize> Reader<T, MAX_BLOCK> {
    /// Remove and return the front element without blocking, or `None` when
    /// the queue is empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        if !self.ready.try_wait() {
            return None;
        }
        Some(self.pop_ready())
    }

    /// Remove and return the front element, blocking until one is available.
    pub fn wait_pop(&mut self) -> T {
        while !self.ready.wait() {}
        self.pop_ready()
    }

    /// Remove and return the front element, blocking up to `timeout`.
    /// Returns `None` when the deadline passes first; the queue is
    /// unchanged.
    pub fn wait_pop_timeout(&mut self, timeout: Duration) -> Option<T> {
        if !self.ready.wait_timeout(timeout) {
            return None;
        }
        Some(self.pop_ready())
    }

    /// Borrow the element at the front of the queue without removing it.
    #[inline]
    pub fn peek(&mut self) -> Option<&T> {
        self.inner.peek()
    }

    /// Drop the element at the front of the queue without returning it.
    /// Returns whether there was one.
    pub fn pop(&mut self) -> bool {
        if !self.ready.try_wait() {
            return false;
        }
        let popped = self.inner.pop();
        debug_assert!(popped);
        true
    }

    /// Number of elements the queue appeared to hold.
    #[inline]
    pub fn size_approx(&self) -> usize {
        self.ready.available_approx()
    }

    /// Total number of elements the queue could hold without allocating,
    /// were it empty.
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.inner.max_capacity()
    }

    // A held permit means a push signalled before we got here, and the inner
    // push made its element visible before that signal.
    fn pop_ready(&mut self) -> T {
        self.inner
            .try_pop()
            .expect("semaphore permit without a visible element")
    }
}

impl<T, const MAX_BLOCK: usize> fmt::Debug for Reader<T, MAX_BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").finish_non_exhaustive()
    }
}
