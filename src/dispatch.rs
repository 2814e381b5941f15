//! Hand-off queue between background threads and the host context.
//!
//! Any thread may [`DispatchQueue::enqueue`]; only the host drains. A drain
//! takes the items present when it starts, so handlers that enqueue more work
//! do not extend the pass they are running in.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

/// A queued zero-argument callback.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Unbounded multi-producer, single-consumer FIFO.
pub struct DispatchQueue<T> {
    items: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for DispatchQueue<T> {
    fn clone(&self) -> Self {
        DispatchQueue {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DispatchQueue<T> {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        DispatchQueue {
            items: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Append `item`. Callable from any thread.
    #[inline]
    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Hand every currently queued item to `handler`, oldest first.
    ///
    /// The lock is released before `handler` runs. Returns the number of
    /// items handled.
    pub fn drain_with<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        let batch = {
            let mut items = self.items.lock();
            if items.is_empty() {
                return 0;
            }
            mem::take(&mut *items)
        };
        let count = batch.len();
        for item in batch {
            handler(item);
        }
        count
    }

    /// Drop queued items for which `keep` returns false, preserving the
    /// order of the rest. Returns how many items were discarded.
    pub fn retain<F>(&self, keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(keep);
        before - items.len()
    }

    /// Items waiting for the next drain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether a drain would do nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl DispatchQueue<Task> {
    /// Run every queued task on the calling thread, in FIFO order.
    pub fn drain_all(&self) -> usize {
        self.drain_with(|task| task())
    }
}
