use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, Notify};
use tokio_util::time::DelayQueue;

/// A rate-limited work queue in the spirit of client-go's
/// `workqueue.RateLimitingInterface`: items become visible to `get()` either
/// immediately (`add`) or after a delay (`add_after`, used for handler-
/// requested retries). `shutdown()` stops accepting the queue as a source of
/// new work once it drains, matching `ShutDownWithDrain` — items already
/// queued are still handed out before `get()` starts returning `None`.
pub struct WorkQueue<T> {
    items: Mutex<DelayQueue<T>>,
    not_empty: Notify,
    shutdown: AtomicBool,
    len: AtomicUsize,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(DelayQueue::new()),
            not_empty: Notify::new(),
            shutdown: AtomicBool::new(false),
            len: AtomicUsize::new(0),
        }
    }

    pub async fn add(&self, item: T) {
        self.items.lock().await.insert(item, Duration::ZERO);
        self.len.fetch_add(1, Ordering::SeqCst);
        self.not_empty.notify_waiters();
    }

    pub async fn add_after(&self, item: T, delay: Duration) {
        self.items.lock().await.insert(item, delay);
        self.len.fetch_add(1, Ordering::SeqCst);
        self.not_empty.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    /// Marks the queue as shutting down. Items already enqueued are still
    /// returned by `get()`; once the queue is both empty and shut down,
    /// `get()` starts returning `None`.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.not_empty.notify_waiters();
    }

    /// Pops the next ready item, waiting for either a delayed item to expire
    /// or a new item to be added. Returns `None` once the queue has been
    /// shut down and fully drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            {
                let mut guard = self.items.lock().await;
                if !guard.is_empty() {
                    if let Some(expired) = guard.next().await {
                        self.len.fetch_sub(1, Ordering::SeqCst);
                        return Some(expired.into_inner());
                    }
                }
            }
            if self.shutdown.load(Ordering::SeqCst) && self.len.load(Ordering::SeqCst) == 0 {
                return None;
            }
            self.not_empty.notified().await;
        }
    }
}
