//! Bounded single-consumer queues.
//!
//! All three per-instance queues (events, injected audio, injected DTMF) use
//! this structure. The policy is deliberate: a full queue drops the record
//! being pushed rather than blocking or evicting — the real-time path must
//! never stall on a slow consumer, and event loss is tolerated by design.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// Fixed-capacity FIFO. Internally synchronized; producers call `try_push`,
/// the single consumer calls `try_pop`.
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    label: &'static str,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, label: &'static str) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            label,
        }
    }

    /// Push a record, dropping it when the queue is full.
    ///
    /// Returns false on overflow; the record is freed here.
    pub fn try_push(&self, item: T) -> bool {
        let mut q = self.inner.lock();
        if q.len() >= self.capacity {
            debug!("{} queue full, record dropped", self.label);
            return false;
        }
        q.push_back(item);
        true
    }

    /// Non-blocking pop
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every queued record
    pub fn drain(&self) {
        self.inner.lock().clear();
    }
}
