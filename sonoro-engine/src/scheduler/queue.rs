//! Bounded inter-stage queues
//!
//! A full queue either makes the producer wait (`Block`) or evicts its oldest
//! item (`DropOldest`); it never grows past its capacity. Evictions are
//! counted so the performance monitor can see backpressure.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Behaviour of a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Producer waits for space
    Block,
    /// Oldest queued item is discarded
    DropOldest,
}

/// What happened to a pushed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest item
    DroppedOldest,
}

struct Inner<T> {
    name: &'static str,
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: QueuePolicy,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

/// Bounded multi-producer queue between two pipeline stages
pub struct StageQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for StageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StageQueue<T> {
    pub fn new(name: &'static str, capacity: usize, policy: QueuePolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                name,
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                policy,
                not_empty: Notify::new(),
                not_full: Notify::new(),
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue `item` according to the queue policy
    ///
    /// Fails only once the queue is closed.
    pub async fn push(&self, item: T) -> Result<PushOutcome> {
        let mut item = Some(item);
        loop {
            let notified = self.inner.not_full.notified();
            {
                let mut items = self.items();
                if self.is_closed() {
                    return Err(Error::QueueClosed(self.inner.name.to_string()));
                }
                if items.len() < self.inner.capacity {
                    if let Some(item) = item.take() {
                        items.push_back(item);
                    }
                    drop(items);
                    self.inner.not_empty.notify_one();
                    return Ok(PushOutcome::Queued);
                }
                if self.inner.policy == QueuePolicy::DropOldest {
                    items.pop_front();
                    if let Some(item) = item.take() {
                        items.push_back(item);
                    }
                    drop(items);
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    self.inner.not_empty.notify_one();
                    return Ok(PushOutcome::DroppedOldest);
                }
            }
            notified.await;
        }
    }

    /// Dequeue the oldest item, waiting while empty
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.inner.not_empty.notified();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let item = self.items().pop_front();
        if item.is_some() {
            self.inner.not_full.notify_one();
        }
        item
    }

    /// Wake all waiters; further pushes fail, pops drain what is left
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.not_empty.notify_waiters();
        self.inner.not_full.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn policy(&self) -> QueuePolicy {
        self.inner.policy
    }

    /// Items evicted by `DropOldest` so far
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest() {
        let queue = StageQueue::new("frames", 2, QueuePolicy::DropOldest);
        assert_eq!(queue.push(1).await.unwrap(), PushOutcome::Queued);
        assert_eq!(queue.push(2).await.unwrap(), PushOutcome::Queued);
        assert_eq!(queue.push(3).await.unwrap(), PushOutcome::DroppedOldest);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_waits_for_space() {
        let queue = StageQueue::new("params", 1, QueuePolicy::Block);
        queue.push(1).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(2).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(producer.await.unwrap().unwrap(), PushOutcome::Queued);
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.dropped(), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = StageQueue::new("frames", 4, QueuePolicy::Block);
        queue.push("a").await.unwrap();
        queue.close();

        assert!(matches!(queue.push("b").await, Err(Error::QueueClosed(_))));
        assert_eq!(queue.pop().await, Some("a"));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue: StageQueue<u32> = StageQueue::new("frames", 4, QueuePolicy::Block);
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.close();
        assert_eq!(consumer.await.unwrap(), None);
    }
}
