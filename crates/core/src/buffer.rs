//! Fixed-capacity blocking buffer shared by producers and consumers.
//!
//! # Synchronization
//!
//! Two permit pools and one lock:
//! - `free` starts at `capacity`; a producer takes a free permit *before*
//!   locking the queue to append.
//! - `filled` starts at 0; a consumer takes a filled permit *before* locking
//!   the queue to pop.
//! - `slots` is the lock; it only protects the physical mutation.
//!
//! A successful insert moves one permit from `free` to `filled`, a successful
//! remove moves it back. The permits are therefore the only signal of
//! availability, and `0 <= len <= capacity` holds without any post-hoc check.
//! Permits are RAII guards, so a failure between acquiring a permit and
//! committing the mutation hands the permit back.
//!
//! # Timeouts
//!
//! Timeouts are normal outcomes: `insert` returns `false`, `remove` returns
//! `None`. Each buffer has a default timeout that individual calls may
//! override.
//!
//! # Shutdown
//!
//! [`BoundedBuffer::close`] switches the buffer to draining: inserts fail
//! immediately, removes keep returning queued items and then fail
//! immediately instead of waiting.

use crate::error::{Error, Result};
use crate::semaphore::Semaphore;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-call wait for `insert` and `remove`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Most slots reserved up front; larger buffers grow on demand.
const PREALLOCATE_LIMIT: usize = 1024;

#[derive(Debug)]
struct Slots<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// A bounded FIFO of opaque handles with blocking, timed insert and remove.
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    capacity: usize,
    default_timeout: Duration,
    slots: Mutex<Slots<T>>,
    free: Semaphore,
    filled: Semaphore,
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer holding at most `capacity` items.
    ///
    /// # Errors
    /// `Error::Config` if `capacity` is zero.
    pub fn new(capacity: usize, default_timeout: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("buffer capacity must be positive".to_string()));
        }

        info!(
            capacity,
            timeout_ms = default_timeout.as_millis() as u64,
            "initialized bounded buffer"
        );

        Ok(Self {
            capacity,
            default_timeout,
            slots: Mutex::new(Slots {
                // Capacity is a bound, not a reservation.
                queue: VecDeque::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
                closed: false,
            }),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
        })
    }

    /// Create a buffer with [`DEFAULT_TIMEOUT`].
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::new(capacity, DEFAULT_TIMEOUT)
    }

    /// Insert using the default timeout. See [`insert_timeout`](Self::insert_timeout).
    pub fn insert(&self, item: T) -> bool {
        self.insert_timeout(item, self.default_timeout)
    }

    /// Append `item`, waiting up to `timeout` for a free slot.
    ///
    /// Returns `true` iff the item was enqueued. On `false` the item is
    /// dropped; the caller decides whether that counts as a loss.
    pub fn insert_timeout(&self, item: T, timeout: Duration) -> bool {
        let Some(free) = self.free.acquire_timeout(timeout) else {
            if self.free.is_closed() {
                debug!("insert rejected: buffer closed");
            } else {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "timed out waiting to insert into buffer"
                );
            }
            return false;
        };

        let size = {
            let mut slots = self.slots.lock();
            if slots.closed {
                debug!("insert rejected: buffer closed");
                return false;
            }
            slots.queue.push_back(item);
            slots.queue.len()
        };

        // The slot now belongs to the filled pool.
        free.forget();
        self.filled.release();

        debug!(size, "inserted item");
        true
    }

    /// Remove using the default timeout. See [`remove_timeout`](Self::remove_timeout).
    pub fn remove(&self) -> Option<T> {
        self.remove_timeout(self.default_timeout)
    }

    /// Pop the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout, or at once when closed and drained.
    pub fn remove_timeout(&self, timeout: Duration) -> Option<T> {
        let Some(filled) = self.filled.acquire_timeout(timeout) else {
            debug!(timeout_ms = timeout.as_millis() as u64, "no item available to remove");
            return None;
        };

        let (item, size) = {
            let mut slots = self.slots.lock();
            let item = slots.queue.pop_front();
            (item, slots.queue.len())
        };

        // A filled permit always has a queued item behind it.
        debug_assert!(item.is_some());
        filled.forget();
        let item = item?;
        self.free.release();

        debug!(size, "removed item");
        Some(item)
    }

    /// Switch to draining. Idempotent.
    pub fn close(&self) {
        let remaining = {
            let mut slots = self.slots.lock();
            if slots.closed {
                return;
            }
            slots.closed = true;
            slots.queue.len()
        };
        self.free.close();
        self.filled.close();
        info!(remaining, "buffer closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait used by [`insert`](Self::insert) and [`remove`](Self::remove).
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Number of queued items.
    pub fn size(&self) -> usize {
        self.slots.lock().queue.len()
    }

    /// True when no item is queued.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().queue.is_empty()
    }

    /// True when every slot is taken.
    pub fn is_full(&self) -> bool {
        self.slots.lock().queue.len() == self.capacity
    }
}
