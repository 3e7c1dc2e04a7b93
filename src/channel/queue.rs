use serde_json::value::RawValue;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueInner {
    items: Mutex<VecDeque<Box<RawValue>>>,
    notify: Notify,
}

/// An unbounded FIFO of JSON values, shared by every participant of a
/// channel.
///
/// Cloning the queue produces another handle to the same buffer. Pushing
/// never blocks. Any number of handles may push concurrently; values are
/// popped in the order they were pushed, regardless of which handle pushed
/// them.
#[derive(Debug, Clone, Default)]
pub struct ChannelQueue {
    inner: Arc<QueueInner>,
}

impl ChannelQueue {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Box<RawValue>>> {
        // The buffer is left consistent by every critical section, so a
        // poisoned lock is still usable.
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a value to the back of the queue, waking a waiting consumer.
    pub fn push(&self, value: Box<RawValue>) {
        self.items().push_back(value);
        self.inner.notify.notify_one();
    }

    /// Take the value at the front of the queue, if any.
    pub fn try_pop(&self) -> Option<Box<RawValue>> {
        self.items().pop_front()
    }

    /// Wait for the value at the front of the queue.
    ///
    /// This future is cancel safe. If it is dropped before completion, no
    /// value is removed from the queue.
    pub async fn pop(&self) -> Box<RawValue> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(value) = self.try_pop() {
                return value;
            }
            notified.await;
        }
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// True if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// True if both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
