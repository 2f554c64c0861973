//! Bounded FIFO handoff queue between submitters and pool workers.
//!
//! # Design
//!
//! - **Backpressure by blocking**: `submit` waits on a Condvar while the
//!   queue is at capacity instead of rejecting work
//! - **Drain before close**: consumers keep receiving queued items after
//!   `close`; only an empty closed queue reports [`QueueError::Closed`]
//! - **Cheap handles**: the queue is a cloneable handle over shared state,
//!   so producers and workers each hold their own endpoint

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::error::QueueError;

/// Queue contents plus the close flag, guarded by a single mutex.
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Shared queue core referenced by every handle.
struct QueueShared<T> {
    state: Mutex<QueueState<T>>,
    /// Signaled when an item is pushed or the queue closes.
    not_empty: Condvar,
    /// Signaled when an item is popped or the queue closes.
    not_full: Condvar,
    capacity: usize,
}

/// Bounded multi-producer multi-consumer FIFO queue with blocking handoff.
///
/// Cloning a `TaskQueue` produces another handle to the same queue, in the
/// same way cloning a channel endpoint does. Capacity is fixed at
/// construction and never changes.
pub struct TaskQueue<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> TaskQueue<T> {
    /// Create a queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Append an item, blocking while the queue is at capacity.
    ///
    /// Blocked submitters are woken in turn as consumers take items. The
    /// item is enqueued exactly once on success.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed, including when
    /// it closes while this call is blocked waiting for space.
    pub fn submit(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        let mut logged_full = false;
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.items.len() < self.shared.capacity {
                state.items.push_back(item);
                self.shared.not_empty.notify_one();
                return Ok(());
            }
            if !logged_full {
                debug!(capacity = self.shared.capacity, "Queue full, submit blocked");
                logged_full = true;
            }
            self.shared.not_full.wait(&mut state);
        }
    }

    /// Append an item without blocking.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Full`] if the queue is at capacity
    /// - [`QueueError::Closed`] if the queue is closed
    pub fn try_submit(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if state.items.len() >= self.shared.capacity {
            return Err(QueueError::Full);
        }
        state.items.push_back(item);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Remove and return the oldest item, blocking while the queue is empty.
    ///
    /// A closed queue keeps delivering until it is drained; each queued item
    /// is delivered to exactly one consumer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the queue is closed and empty.
    pub fn take(&self) -> Result<T, QueueError> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.shared.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            self.shared.not_empty.wait(&mut state);
        }
    }

    /// Remove and return the oldest item, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Timeout`] if no item arrived before the deadline
    /// - [`QueueError::Closed`] once the queue is closed and empty
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.shared.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            if self
                .shared
                .not_empty
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                // Prefer delivering an item that raced in over reporting timeout.
                if let Some(item) = state.items.pop_front() {
                    self.shared.not_full.notify_one();
                    return Ok(item);
                }
                return if state.closed {
                    Err(QueueError::Closed)
                } else {
                    Err(QueueError::Timeout)
                };
            }
        }
    }

    /// Close the queue, waking all blocked submitters and consumers.
    ///
    /// After close, `submit` fails with [`QueueError::Closed`] while `take`
    /// continues draining queued items. Closing an already-closed queue is
    /// a no-op.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        debug!(queued = state.items.len(), "Task queue closed");
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    /// Whether the queue currently holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().items.is_empty()
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Maximum number of items the queue can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

#[cfg(feature = "tokio-runtime")]
impl<T: Send + 'static> TaskQueue<T> {
    /// Append an item from an async context, blocking on capacity.
    ///
    /// The Condvar wait runs on tokio's blocking thread pool, so a full
    /// queue never stalls the async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed before space
    /// frees up.
    pub async fn submit_async(&self, item: T) -> Result<(), QueueError> {
        let queue = self.clone();
        match tokio::task::spawn_blocking(move || queue.submit(item)).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Closed),
        }
    }

    /// Remove and return the oldest item from an async context.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the queue is closed and empty.
    pub async fn take_async(&self) -> Result<T, QueueError> {
        let queue = self.clone();
        match tokio::task::spawn_blocking(move || queue.take()).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Closed),
        }
    }
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
