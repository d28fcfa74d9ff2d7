//! Low latency, lock-free single producer single consumer (SPSC) queues for
//! handing values between exactly two cooperating threads. Wait-free on the
//! common path, with release/acquire index publication and no locks.
//!
//! Three variants share the same synchronization core, each trading off
//! against the others:
//!
//! - [`ring`] — fixed-capacity slot ring; never allocates after
//!   construction, never blocks. A full queue rejects the push.
//! - [`bounded`] — fixed-capacity ring gated by two counting semaphores, so
//!   both sides can choose try, wait, or wait-with-timeout behavior.
//! - [`unbounded`] — growable queue built from a cycle of fixed-size blocks;
//!   the producer may allocate another block on the hot path. [`blocking`]
//!   wraps it with a ready-items semaphore for waiting consumers.
//!
//! Every constructor returns a `(Writer, Reader)` pair. Move the writer to
//! the producer thread and the reader to the consumer thread; the halves are
//! `Send` but cannot be cloned, so the single-producer single-consumer
//! contract holds by construction.
//!
//! ## Examples
//! Hand values across threads through the growable queue.
//! ```
//! let (mut writer, mut reader) = unicast::unbounded::queue::<u64>(100);
//!
//! let producer = std::thread::spawn(move || {
//!     for i in 0..1000 {
//!         writer.push(i).unwrap();
//!     }
//! });
//!
//! let mut received = 0;
//! while received < 1000 {
//!     if let Some(value) = reader.try_pop() {
//!         assert_eq!(received, value);
//!         received += 1;
//!     }
//! }
//! producer.join().unwrap();
//! ```
//! Park the consumer instead of spinning.
//! ```
//! use std::time::Duration;
//!
//! let (mut writer, mut reader) = unicast::blocking::queue::<&str>(15);
//!
//! writer.push("wake up").unwrap();
//! assert_eq!("wake up", reader.wait_pop());
//! assert_eq!(None, reader.wait_pop_timeout(Duration::from_millis(1)));
//! ```

pub mod blocking;
pub mod bounded;
pub mod error;
mod mem;
pub mod ring;
pub mod sema;
pub mod unbounded;

// re-export
pub use error::PushError;
