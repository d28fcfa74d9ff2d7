//! Lightweight counting semaphore used by the blocking queue variants.
//!
//! The fast path is a lock-free CAS decrement on an atomic count; a thread
//! only touches the mutex/condvar pair once a bounded spin has failed to
//! find a permit. A negative count records how many waiters are parked, and
//! each `signal` that observes a parked waiter deposits one wake token for
//! the condvar side to consume.

use std::hint;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Optimistic decrement attempts before a waiter parks.
const SPIN_TRIES: usize = 1024;

/// Counting semaphore with a lock-free fast path.
pub struct Semaphore {
    count: AtomicIsize,   // permits when positive, parked waiters when negative
    tokens: Mutex<usize>, // wake tokens for parked waiters
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `initial` permits.
    pub fn new(initial: usize) -> Self {
        Self {
            count: AtomicIsize::new(initial as isize),
            tokens: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    /// Release one permit, waking a parked waiter if any.
    pub fn signal(&self) {
        let old = self.count.fetch_add(1, Ordering::Release);
        if old < 0 {
            let mut tokens = self.tokens.lock().expect("semaphore mutex poisoned");
            *tokens += 1;
            self.available.notify_one();
        }
    }

    /// Take one permit without blocking. Returns whether a permit was taken.
    pub fn try_wait(&self) -> bool {
        let mut old = self.count.load(Ordering::Relaxed);
        while old > 0 {
            match self
                .count
                .compare_exchange_weak(old, old - 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(now) => old = now,
            }
        }
        false
    }

    /// Take one permit, blocking indefinitely. May return `false` spuriously;
    /// callers loop until success.
    pub fn wait(&self) -> bool {
        self.wait_inner(None)
    }

    /// Take one permit, blocking up to `timeout`. Returns whether a permit
    /// was taken before the deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_inner(Instant::now().checked_add(timeout))
    }

    /// Current permit count, read without synchronization. May be stale the
    /// moment it is returned.
    pub fn available_approx(&self) -> usize {
        let count = self.count.load(Ordering::Relaxed);
        if count > 0 {
            count as usize
        } else {
            0
        }
    }

    fn wait_inner(&self, deadline: Option<Instant>) -> bool {
        for _ in 0..SPIN_TRIES {
            if self.try_wait() {
                return true;
            }
            hint::spin_loop();
        }

        // register as a parked waiter; a permit may land between the spin
        // and the decrement, in which case we own it already
        let old = self.count.fetch_sub(1, Ordering::Acquire);
        if old > 0 {
            return true;
        }

        let mut tokens = self.tokens.lock().expect("semaphore mutex poisoned");
        loop {
            if *tokens > 0 {
                *tokens -= 1;
                return true;
            }
            match deadline {
                None => tokens = self.available.wait(tokens).expect("semaphore mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        drop(tokens);
                        return self.cancel_wait();
                    }
                    let (guard, _) = self
                        .available
                        .wait_timeout(tokens, deadline - now)
                        .expect("semaphore mutex poisoned");
                    tokens = guard;
                }
            }
        }
    }

    // A timed-out waiter must either undo its registration or, if a signal
    // already accounted for it, consume the token that signal deposited.
    #[cold]
    fn cancel_wait(&self) -> bool {
        let mut old = self.count.load(Ordering::Relaxed);
        loop {
            if old < 0 {
                match self.count.compare_exchange_weak(
                    old,
                    old + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return false,
                    Err(now) => old = now,
                }
            } else {
                let mut tokens = self.tokens.lock().expect("semaphore mutex poisoned");
                if *tokens > 0 {
                    *tokens -= 1;
                    return true;
                }
                drop(tokens);
                hint::spin_loop();
                old = self.count.load(Ordering::Relaxed);
            }
        }
    }
}
