//! Counting permits with timed acquisition.
//!
//! A [`Semaphore`] guards a pool of interchangeable slots. Acquiring hands out
//! a [`Permit`]; dropping the permit puts the slot back. This makes every exit
//! path (early return, `?`, panic during the guarded work) restore the count
//! automatically. When the slot legitimately changes hands, for example from
//! the "free" pool to the "filled" pool of a bounded buffer, the holder calls
//! [`Permit::forget`] and releases into the other pool explicitly.
//!
//! # Closing
//!
//! After [`Semaphore::close`] no acquirer ever blocks: permits that are still
//! available are handed out, otherwise acquisition fails at once. Waiters
//! blocked at the time of closing are woken.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct State {
    permits: usize,
    closed: bool,
}

/// Counting semaphore built on a mutex and condition variable.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<State>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `permits` permits.
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(State {
                permits,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Take one permit, waiting at most `timeout`.
    ///
    /// # Returns
    /// - `Some(permit)` once a permit was taken
    /// - `None` if the timeout elapsed, or the semaphore is closed and empty
    ///
    /// A zero timeout never waits.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Permit<'_>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        while state.permits == 0 {
            if state.closed {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out()
                        && state.permits == 0
                    {
                        return None;
                    }
                }
                // Timeout too large to represent: wait without a deadline.
                None => self.available.wait(&mut state),
            }
        }

        state.permits -= 1;
        Some(Permit { semaphore: self })
    }

    /// Take one permit only if it is available right now.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        self.acquire_timeout(Duration::ZERO)
    }

    /// Add one permit and wake a single waiter.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        drop(state);
        self.available.notify_one();
    }

    /// Number of permits currently available.
    pub fn available(&self) -> usize {
        self.state.lock().permits
    }

    /// Stop blocking acquirers and wake everyone currently waiting.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// A permit taken from a [`Semaphore`]; returned to it on drop.
#[must_use = "dropping a permit immediately releases it"]
#[derive(Debug)]
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Permit<'_> {
    /// Consume the permit without returning it to its semaphore.
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
