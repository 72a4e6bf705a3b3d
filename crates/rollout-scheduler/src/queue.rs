use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Error types for work queue operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Nothing is waiting to be dispatched. Expected, not logged as an error.
    #[error("no scheduled item")]
    NotFound,
    /// Storage or transport failure behind the queue.
    #[error("work queue error: {0}")]
    Backend(String),
}

impl QueueError {
    /// Returns `true` for the empty-queue condition.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// The queue the scheduler dispatches from.
///
/// Uses native async fn in traits instead of `#[async_trait]`.
pub trait WorkQueue: Send + Sync {
    /// An opaque unit of dispatchable work.
    type Item: Send;

    /// Returns the next item due for dispatch, or [`QueueError::NotFound`].
    fn next_scheduled(&self) -> impl Future<Output = Result<Self::Item, QueueError>> + Send;

    /// Records that `item` has been released downstream.
    fn mark_dispatched(&self, item: Self::Item)
        -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// In-memory FIFO work queue for testing and local development.
#[derive(Debug)]
pub struct MemoryQueue<T> {
    pending: Mutex<VecDeque<T>>,
    dispatched: Mutex<Vec<T>>,
}

impl<T> Default for MemoryQueue<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            dispatched: Mutex::new(Vec::new()),
        }
    }
}

impl<T> MemoryQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(items);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn dispatched_count(&self) -> usize {
        self.dispatched.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Removes and returns everything dispatched so far, in order.
    pub fn take_dispatched(&self) -> Vec<T> {
        std::mem::take(&mut *self.dispatched.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T: Send> WorkQueue for MemoryQueue<T> {
    type Item = T;

    async fn next_scheduled(&self) -> Result<T, QueueError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(QueueError::NotFound)
    }

    async fn mark_dispatched(&self, item: T) -> Result<(), QueueError> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
        Ok(())
    }
}
