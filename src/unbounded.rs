//! Growable SPSC queue built from a cycle of fixed-size blocks.
//!
//! The queue is a circular linked list of "blocks", each a small slot ring
//! with its own `front`/`tail` indices. The consumer drains the block at
//! `front_block`; the producer fills the block at `tail_block`. When the
//! tail block fills up, the producer first tries to reuse the next block in
//! the cycle (guaranteed empty if the consumer has moved past it) and only
//! allocates a fresh block when the whole ring is saturated — and only in
//! [`Writer::push`], never in [`Writer::try_push`]. Blocks are never freed
//! until the queue is dropped.
//!
//! Each side keeps a private shadow copy of the index the other side owns
//! (`local_front` for the producer, `local_tail` for the consumer). The fast
//! path compares against the shadow and only pays for an acquire load of the
//! live atomic when the cached value suggests the block is full or empty. A
//! stale shadow only ever causes such a refresh, never a wrong answer.

use crate::error::{self, PushError};
use crate::mem;
use crossbeam_utils::CachePadded;
use std::cell::Cell;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

/// Block size cap used by [`queue`]. Larger queues are built from several
/// blocks of at most this many slots.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;

/// Create a growable queue that holds at least `size` elements without
/// allocating again, and return its two ends.
///
/// ## Examples
/// ```
/// let (mut writer, mut reader) = unicast::unbounded::queue::<u64>(100);
///
/// writer.push(1).unwrap();
/// writer.push(2).unwrap();
///
/// assert_eq!(Some(&1), reader.peek());
/// assert_eq!(Some(1), reader.try_pop());
/// assert_eq!(Some(2), reader.try_pop());
/// assert_eq!(None, reader.try_pop());
/// ```
pub fn queue<T>(size: usize) -> (Writer<T>, Reader<T>) {
    queue_with_block_size::<T, DEFAULT_MAX_BLOCK_SIZE>(size)
}

/// Like [`queue`] but with an explicit block size cap. `MAX_BLOCK` must be a
/// power of two of at least 2.
pub fn queue_with_block_size<T, const MAX_BLOCK: usize>(
    size: usize,
) -> (Writer<T, MAX_BLOCK>, Reader<T, MAX_BLOCK>) {
    assert!(
        MAX_BLOCK.is_power_of_two() && MAX_BLOCK >= 2,
        "max block size must be a power of two of at least 2"
    );

    // one spare slot per block keeps front == tail unambiguous, hence size + 1
    let mut largest = (size + 1).next_power_of_two();
    let first;
    if largest > MAX_BLOCK * 2 {
        // several MAX_BLOCK-sized blocks, including a spare block for when
        // the producer writes to a different block than the consumer reads
        let block_count = (size + MAX_BLOCK * 2 - 3) / (MAX_BLOCK - 1);
        largest = MAX_BLOCK;
        first = Block::allocate_or_oom(MAX_BLOCK);
        let mut last = first;
        for _ in 1..block_count {
            let block = Block::allocate_or_oom(MAX_BLOCK);
            unsafe { last.as_ref() }.next.store(block.as_ptr(), Ordering::Relaxed);
            last = block;
        }
        unsafe { last.as_ref() }.next.store(first.as_ptr(), Ordering::Relaxed);
    } else {
        first = Block::allocate_or_oom(largest);
        unsafe { first.as_ref() }.next.store(first.as_ptr(), Ordering::Relaxed);
    }

    // publish the initial ring to both threads
    fence(Ordering::SeqCst);

    let shared = Arc::new(Shared {
        front_block: CachePadded::new(AtomicPtr::new(first.as_ptr())),
        tail_block: CachePadded::new(AtomicPtr::new(first.as_ptr())),
    });
    (
        Writer {
            shared: Arc::clone(&shared),
            largest_block_size: largest,
        },
        Reader { shared },
    )
}

struct ConsumerEnd {
    front: AtomicUsize,      // next slot to read, owned by the consumer
    local_tail: Cell<usize>, // consumer's shadow copy of `tail`
}

struct ProducerEnd {
    tail: AtomicUsize,        // next slot to write, owned by the producer
    local_front: Cell<usize>, // producer's shadow copy of `front`
}

// `front`, `tail` and `next` are the contention points, so each group gets
// its own cache line.
#[repr(C)]
struct Block<T> {
    cons: CachePadded<ConsumerEnd>,
    prod: CachePadded<ProducerEnd>,
    next: CachePadded<AtomicPtr<Block<T>>>,
    data: *mut T,
    size_mask: usize,
}

impl<T> Block<T> {
    /// Allocate a block and its slot array as one contiguous region, the
    /// control structure first and the data at the aligned offset after it.
    /// Returns `None` when the allocator fails; blocks live until queue
    /// destruction.
    fn allocate(capacity: usize) -> Option<NonNull<Block<T>>> {
        let (layout, data_offset) = mem::layout_with_array::<Block<T>, T>(capacity);
        let raw = unsafe { std::alloc::alloc(layout) };
        if raw.is_null() {
            return None;
        }
        let block = raw as *mut Block<T>;
        unsafe {
            block.write(Block {
                cons: CachePadded::new(ConsumerEnd {
                    front: AtomicUsize::new(0),
                    local_tail: Cell::new(0),
                }),
                prod: CachePadded::new(ProducerEnd {
                    tail: AtomicUsize::new(0),
                    local_front: Cell::new(0),
                }),
                next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
                data: raw.add(data_offset) as *mut T,
                size_mask: capacity - 1,
            });
        }
        NonNull::new(block)
    }

    fn allocate_or_oom(capacity: usize) -> NonNull<Block<T>> {
        match Block::allocate(capacity) {
            Some(block) => block,
            None => std::alloc::handle_alloc_error(mem::layout_with_array::<Block<T>, T>(capacity).0),
        }
    }

    /// ## Safety
    /// `block` must have come from `Block::allocate` and must not be used
    /// afterwards. Live elements must already have been dropped.
    unsafe fn free(block: *mut Block<T>) {
        let (layout, _) = mem::layout_with_array::<Block<T>, T>((*block).size_mask + 1);
        std::alloc::dealloc(block as *mut u8, layout);
    }

    #[inline]
    unsafe fn slot(&self, index: usize) -> *mut T {
        self.data.add(index)
    }
}

struct Shared<T> {
    front_block: CachePadded<AtomicPtr<Block<T>>>, // owned by the consumer
    tail_block: CachePadded<AtomicPtr<Block<T>>>,  // owned by the producer
}

// SAFETY: the producer exclusively writes every block's `tail`, `local_front`
// and `next` plus `tail_block`; the consumer exclusively writes every block's
// `front` and `local_tail` plus `front_block`. Slot bytes are handed across
// with the release store of the owning index paired against the peer's
// acquire load.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn size_approx(&self) -> usize {
        let front = self.front_block.load(Ordering::Acquire);
        let mut block = front;
        let mut result = 0;
        loop {
            let b = unsafe { &*block };
            let block_tail = b.prod.tail.load(Ordering::Acquire);
            let block_front = b.cons.front.load(Ordering::Acquire);
            result += block_tail.wrapping_sub(block_front) & b.size_mask;
            block = b.next.load(Ordering::Acquire);
            if block == front {
                return result;
            }
        }
    }

    fn max_capacity(&self) -> usize {
        let front = self.front_block.load(Ordering::Acquire);
        let mut block = front;
        let mut result = 0;
        loop {
            let b = unsafe { &*block };
            result += b.size_mask; // one slot per block is never usable
            block = b.next.load(Ordering::Acquire);
            if block == front {
                return result;
            }
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // both ends are gone; make sure their last writes are visible here
        fence(Ordering::SeqCst);

        let front = self.front_block.load(Ordering::Relaxed);
        let mut block = front;
        loop {
            let next = unsafe { (*block).next.load(Ordering::Relaxed) };
            unsafe {
                let b = &*block;
                let tail = b.prod.tail.load(Ordering::Relaxed);
                let mut i = b.cons.front.load(Ordering::Relaxed);
                while i != tail {
                    ptr::drop_in_place(b.slot(i));
                    i = (i + 1) & b.size_mask;
                }
                Block::free(block);
            }
            block = next;
            if block == front {
                return;
            }
        }
    }
}

/// Move the value at `front` out of `block` and publish the new front index.
///
/// ## Safety
/// The slot at `front` must hold a live value owned by the consumer.
#[inline]
unsafe fn take<T>(block: &Block<T>, front: usize) -> T {
    let value = block.slot(front).read();
    block.cons.front.store((front + 1) & block.size_mask, Ordering::Release);
    value
}

/// Producer end of a growable queue.
pub struct Writer<T, const MAX_BLOCK: usize = DEFAULT_MAX_BLOCK_SIZE> {
    shared: Arc<Shared<T>>,
    largest_block_size: usize, // sizing for the next allocation
}

impl<T, const MAX_BLOCK: usize> Writer<T, MAX_BLOCK> {
    /// Append a value, allocating another block when the ring is saturated.
    /// Fails only with [`PushError::Alloc`] when that allocation fails; the
    /// queue is unchanged and the value is handed back.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.inner_push::<true>(value)
    }

    /// Append a value without allocating. Fails with [`PushError::Full`]
    /// when every block in the ring is occupied.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.inner_push::<false>(value)
    }

    fn inner_push<const CAN_ALLOC: bool>(&mut self, value: T) -> Result<(), PushError<T>> {
        let shared = &*self.shared;
        let tail_block = shared.tail_block.load(Ordering::Relaxed);
        let blk = unsafe { &*tail_block };

        let tail = blk.prod.tail.load(Ordering::Relaxed);
        let next_tail = (tail + 1) & blk.size_mask;

        let mut front = blk.prod.local_front.get();
        if next_tail == front {
            // the shadow says full; refresh it, the consumer may have moved
            front = blk.cons.front.load(Ordering::Acquire);
            blk.prod.local_front.set(front);
        }
        if next_tail != front {
            unsafe { blk.slot(tail).write(value) };
            blk.prod.tail.store(next_tail, Ordering::Release);
            return Ok(());
        }

        // tail block is full
        let next = blk.next.load(Ordering::Acquire);
        if next != shared.front_block.load(Ordering::Acquire) {
            // the consumer drained this block completely before advancing
            // past it, so it is guaranteed empty and safe to overwrite
            let nb = unsafe { &*next };
            let next_front = nb.cons.front.load(Ordering::Acquire);
            nb.prod.local_front.set(next_front);
            let next_tail = nb.prod.tail.load(Ordering::Relaxed);
            debug_assert_eq!(next_front, next_tail);

            unsafe { nb.slot(next_tail).write(value) };
            nb.prod.tail.store((next_tail + 1) & nb.size_mask, Ordering::Release);
            shared.tail_block.store(next, Ordering::Release);
            return Ok(());
        }

        if !CAN_ALLOC {
            return Err(error::full(value));
        }

        // the whole ring is saturated; splice in a fresh block after the
        // tail block, doubling the size up to MAX_BLOCK
        let new_size = if self.largest_block_size >= MAX_BLOCK {
            self.largest_block_size
        } else {
            self.largest_block_size * 2
        };
        let new_block = match Block::<T>::allocate(new_size) {
            Some(block) => block,
            None => return Err(error::alloc(value)),
        };
        self.largest_block_size = new_size;

        let nb = unsafe { new_block.as_ref() };
        unsafe { nb.slot(0).write(value) };
        nb.prod.tail.store(1, Ordering::Relaxed);
        nb.cons.local_tail.set(1);

        // the consumer may see the new `next` before the new tail_block, but
        // it never advances past tail_block, so the half-spliced state is
        // not observable as a traversal
        nb.next.store(blk.next.load(Ordering::Relaxed), Ordering::Relaxed);
        blk.next.store(new_block.as_ptr(), Ordering::Release);
        shared.tail_block.store(new_block.as_ptr(), Ordering::Release);
        Ok(())
    }

    /// Number of elements the queue appeared to hold.
    pub fn size_approx(&self) -> usize {
        self.shared.size_approx()
    }

    /// Total number of elements the queue could hold without allocating,
    /// were it empty. Grows each time [`Writer::push`] splices in a block.
    pub fn max_capacity(&self) -> usize {
        self.shared.max_capacity()
    }
}

impl<T, const MAX_BLOCK: usize> fmt::Debug for Writer<T, MAX_BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer").finish_non_exhaustive()
    }
}

/// Consumer end of a growable queue.
pub struct Reader<T, const MAX_BLOCK: usize = DEFAULT_MAX_BLOCK_SIZE> {
    shared: Arc<Shared<T>>,
}

impl<T, const MAX_BLOCK: usize> Reader<T, MAX_BLOCK> {
    /// Remove and return the element at the front of the queue, or `None`
    /// when the queue looked empty.
    ///
    /// The check runs twice before giving up on a block whose producer has
    /// moved on: between our first look and the tail-block comparison the
    /// producer may have raced to refill the current front block, and
    /// skipping it would reorder the stream.
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let front_block = shared.front_block.load(Ordering::Relaxed);
        let blk = unsafe { &*front_block };

        let front = blk.cons.front.load(Ordering::Relaxed);
        let mut tail = blk.cons.local_tail.get();
        if front == tail {
            // the shadow says empty; refresh it, the producer may have moved
            tail = blk.prod.tail.load(Ordering::Acquire);
            blk.cons.local_tail.set(tail);
        }
        if front != tail {
            return Some(unsafe { take(blk, front) });
        }

        // front block looks empty; if it is also the tail block, the whole
        // queue is empty
        if front_block == shared.tail_block.load(Ordering::Acquire) {
            return None;
        }

        // the producer is ahead of us; look once more before advancing
        let tail = blk.prod.tail.load(Ordering::Acquire);
        blk.cons.local_tail.set(tail);
        let front = blk.cons.front.load(Ordering::Relaxed);
        if front != tail {
            return Some(unsafe { take(blk, front) });
        }

        // front block is drained and a later block holds data; advance.
        // `next` needs no acquire: it is only ever written together with
        // tail_block, which we already loaded with acquire above
        let next = blk.next.load(Ordering::Relaxed);
        let nb = unsafe { &*next };
        let next_front = nb.cons.front.load(Ordering::Relaxed);
        let next_tail = nb.prod.tail.load(Ordering::Acquire);
        nb.cons.local_tail.set(next_tail);
        // the producer only advances tail_block after writing, so the next
        // block cannot be empty
        debug_assert_ne!(next_front, next_tail);

        shared.front_block.store(next, Ordering::Release);
        Some(unsafe { take(nb, next_front) })
    }

    /// Borrow the element at the front of the queue without removing it.
    /// The borrow ends before any other queue operation can run.
    pub fn peek(&mut self) -> Option<&T> {
        let shared = &*self.shared;
        let front_block = shared.front_block.load(Ordering::Relaxed);
        let blk = unsafe { &*front_block };

        let front = blk.cons.front.load(Ordering::Relaxed);
        let mut tail = blk.cons.local_tail.get();
        if front == tail {
            tail = blk.prod.tail.load(Ordering::Acquire);
            blk.cons.local_tail.set(tail);
        }
        if front != tail {
            return Some(unsafe { &*blk.slot(front) });
        }

        if front_block == shared.tail_block.load(Ordering::Acquire) {
            return None;
        }

        let tail = blk.prod.tail.load(Ordering::Acquire);
        blk.cons.local_tail.set(tail);
        let front = blk.cons.front.load(Ordering::Relaxed);
        if front != tail {
            return Some(unsafe { &*blk.slot(front) });
        }

        let next = blk.next.load(Ordering::Relaxed);
        let nb = unsafe { &*next };
        let next_front = nb.cons.front.load(Ordering::Relaxed);
        debug_assert_ne!(next_front, nb.prod.tail.load(Ordering::Acquire));
        Some(unsafe { &*nb.slot(next_front) })
    }

    /// Drop the element at the front of the queue without returning it.
    /// Returns whether there was one.
    #[inline]
    pub fn pop(&mut self) -> bool {
        self.try_pop().is_some()
    }

    /// Number of elements the queue appeared to hold.
    pub fn size_approx(&self) -> usize {
        self.shared.size_approx()
    }

    /// Total number of elements the queue could hold without allocating,
    /// were it empty.
    pub fn max_capacity(&self) -> usize {
        self.shared.max_capacity()
    }
}

impl<T, const MAX_BLOCK: usize> fmt::Debug for Reader<T, MAX_BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::SeqCst;

    #[derive(Debug)]
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, SeqCst);
        }
    }

    #[test]
    fn should_build_single_block_when_size_fits() {
        // 15 + 1 rounds to 16, which is within 2 * MAX_BLOCK for blocks of 8
        let (writer, _reader) = queue_with_block_size::<u32, 8>(15);
        assert_eq!(15, writer.max_capacity());
    }

    #[test]
    fn should_build_block_chain_for_larger_sizes() {
        // 30 + 1 rounds to 32 > 2 * 8, so six blocks of 8 with 7 usable each
        let (writer, _reader) = queue_with_block_size::<u32, 8>(30);
        assert_eq!(42, writer.max_capacity());
    }

    #[test]
    fn should_fill_every_block_before_rejecting() {
        let (mut writer, mut reader) = queue_with_block_size::<usize, 8>(30);

        let mut accepted = 0;
        while writer.try_push(accepted).is_ok() {
            accepted += 1;
        }
        assert_eq!(42, accepted);

        // one free slot is not enough here: the producer reuses whole
        // blocks, so the consumer must vacate the entire front block first
        for expected in 0..8 {
            assert_eq!(Some(expected), reader.try_pop());
        }
        writer.try_push(accepted).unwrap();

        for expected in 8..=accepted {
            assert_eq!(Some(expected), reader.try_pop());
        }
        assert_eq!(None, reader.try_pop());
    }

    #[test]
    fn should_reject_when_saturated_then_resume_after_pop() {
        let (mut writer, mut reader) = queue_with_block_size::<u32, 8>(15);

        for i in 0..15 {
            writer.try_push(i).unwrap();
        }
        assert_eq!(Err(PushError::Full(15)), writer.try_push(15));

        assert_eq!(Some(0), reader.try_pop());
        writer.try_push(15).unwrap();
    }

    #[test]
    fn should_grow_when_allowed_to_allocate() {
        let (mut writer, mut reader) = queue_with_block_size::<u32, 8>(15);
        assert_eq!(15, writer.max_capacity());

        for i in 0..20 {
            writer.push(i).unwrap();
            if i < 15 {
                assert_eq!(15, writer.max_capacity());
            } else {
                // the 16th push spliced in another block
                assert_eq!(30, writer.max_capacity());
            }
        }

        for expected in 0..20 {
            assert_eq!(Some(expected), reader.try_pop());
        }
        assert_eq!(None, reader.try_pop());
    }

    #[test]
    fn should_double_block_size_up_to_the_cap() {
        let (mut writer, _reader) = queue_with_block_size::<u32, 16>(1);
        // initial block of 2 slots, 1 usable
        assert_eq!(1, writer.max_capacity());

        let mut value = 0;
        for expected in [1, 4, 11, 26, 41] {
            // grow: 2 -> +4 -> +8 -> +16 -> +16
            while writer.max_capacity() == expected {
                writer.push(value).unwrap();
                value += 1;
            }
        }
        assert_eq!(56, writer.max_capacity());
    }

    #[test]
    fn should_peek_then_pop_in_order() {
        let (mut writer, mut reader) = queue::<u32>(15);

        writer.push(10).unwrap();
        writer.push(20).unwrap();
        writer.push(30).unwrap();

        assert_eq!(Some(&10), reader.peek());
        assert!(reader.pop());
        assert_eq!(Some(&20), reader.peek());
        assert!(reader.pop());
        assert_eq!(Some(&30), reader.peek());
        assert!(reader.pop());
        assert_eq!(None, reader.peek());
        assert!(!reader.pop());
    }

    #[test]
    fn should_report_size_across_blocks() {
        let (mut writer, mut reader) = queue_with_block_size::<u32, 4>(3);

        for i in 0..10 {
            writer.push(i).unwrap();
        }
        assert_eq!(10, writer.size_approx());
        assert_eq!(10, reader.size_approx());

        for _ in 0..4 {
            reader.try_pop().unwrap();
        }
        assert_eq!(6, reader.size_approx());
    }

    #[test]
    fn should_drop_remaining_elements_across_blocks() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let (mut writer, mut reader) = queue_with_block_size::<Tracked, 4>(3);
            for _ in 0..10 {
                writer.push(Tracked(Arc::clone(&drops))).unwrap();
            }
            drop(reader.try_pop());
            drop(reader.try_pop());
            assert_eq!(2, drops.load(SeqCst));
        }
        assert_eq!(10, drops.load(SeqCst));
    }

    #[test]
    fn should_stream_values_across_threads_while_growing() {
        const COUNT: usize = 1_000_000;

        let (mut writer, mut reader) = queue_with_block_size::<usize, 64>(4);

        let producer = std::thread::spawn(move || {
            for i in 0..COUNT {
                writer.push(i).unwrap();
            }
        });

        let consumer = std::thread::spawn(move || {
            let mut received = Vec::with_capacity(COUNT);
            while received.len() < COUNT {
                if let Some(value) = reader.try_pop() {
                    received.push(value);
                } else {
                    std::hint::spin_loop();
                }
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert!(received.iter().copied().eq(0..COUNT));
    }
}
