//! Synchronization helpers for the background reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Poll interval while waiting for a thread to finish
const JOIN_POLL_MS: u64 = 5;

/// A shared "keep running" flag checked once per reader iteration.
///
/// Clearing it is cooperative: the reader only notices after its current
/// read returns.
#[derive(Clone, Debug)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Create a flag in the running state.
    #[must_use]
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Ask every holder of this flag to wind down.
    #[inline]
    pub fn halt(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for `handle` to finish for at most `timeout`.
///
/// Returns the handle back if the thread is still running when the timeout
/// elapses, so the caller can decide whether to detach it.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Result<(), JoinHandle<T>> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        let now = Instant::now();
        if now >= deadline {
            return Err(handle);
        }
        thread::sleep((deadline - now).min(Duration::from_millis(JOIN_POLL_MS)));
    }
    if handle.join().is_err() {
        log::warn!("background thread panicked");
    }
    Ok(())
}
