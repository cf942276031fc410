//! Bounded notification backlog with discard-oldest overflow.
//!
//! When notifications arrive faster than the pipeline drains them, the
//! oldest unread item is evicted so the backlog always reflects the most
//! recent changes — completeness is traded for recency.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::sync::{Mutex, Notify};

use super::Notification;

struct QueueInner {
    items: Mutex<VecDeque<Notification>>,
    capacity: usize,
    closed: AtomicBool,
    notify: Notify,
}

/// Creates a bounded notification queue of the given capacity (minimum 1),
/// returning the producer and consumer halves.
pub fn channel(capacity: usize) -> (QueueSender, Subscription) {
    let inner = Arc::new(QueueInner {
        items: Mutex::new(VecDeque::new()),
        capacity: capacity.max(1),
        closed: AtomicBool::new(false),
        notify: Notify::new(),
    });

    (
        QueueSender {
            inner: Arc::clone(&inner),
        },
        Subscription { inner },
    )
}

/// Producer half. Dropping it closes the stream; buffered notifications can
/// still be drained by the subscriber.
pub struct QueueSender {
    inner: Arc<QueueInner>,
}

impl QueueSender {
    /// Enqueues a notification, evicting the oldest unread one when the
    /// queue is full. Returns whether an eviction happened.
    pub async fn push(&self, notification: Notification) -> bool {
        let mut items = self.inner.items.lock().await;
        let evicted = if items.len() >= self.inner.capacity {
            items.pop_front();
            true
        } else {
            false
        };
        items.push_back(notification);
        drop(items);

        self.inner.notify.notify_one();
        evicted
    }

    /// True once the subscriber has cancelled the subscription.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Drop for QueueSender {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}

/// Consumer half of a point subscription.
pub struct Subscription {
    inner: Arc<QueueInner>,
}

impl Subscription {
    /// Waits for the next notification. Returns `None` once the producer is
    /// gone and the backlog is drained.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            let notified = self.inner.notify.notified();

            {
                let mut items = self.inner.items.lock().await;
                if let Some(notification) = items.pop_front() {
                    return Some(notification);
                }
            }

            if self.inner.closed.load(Ordering::Acquire) {
                // Re-check: a push may have landed between the drain above
                // and the close flag being set.
                let mut items = self.inner.items.lock().await;
                return items.pop_front();
            }

            notified.await;
        }
    }

    /// Cancels the subscription. The producer observes this via
    /// [`QueueSender::is_closed`] and stops sampling.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}
