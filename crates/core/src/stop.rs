//! Cooperative shutdown.
//!
//! Roles never get interrupted mid-operation. They poll a [`StopSignal`] at the
//! top of each loop iteration and after every timed-out wait, so the longest
//! delay between `stop()` and a role noticing it is one buffer timeout or one
//! pacing sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every holder to stop at its next safe point.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early once stop is requested.
    ///
    /// Returns `true` if stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why a bounded join did not yield the thread's result.
#[derive(Debug)]
pub enum JoinOutcome<T> {
    /// The thread was still running at the deadline; it keeps its handle.
    TimedOut(JoinHandle<T>),

    /// The thread panicked.
    Panicked,
}

/// Wait at most `timeout` for `handle` to finish.
///
/// `JoinHandle::join` cannot time out, so this polls `is_finished` and only
/// joins once the thread is done. On timeout the handle is given back so the
/// caller can report it, retry, or let the thread run detached.
pub fn join_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Result<T, JoinOutcome<T>> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Err(JoinOutcome::TimedOut(handle));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    handle.join().map_err(|_| JoinOutcome::Panicked)
}
