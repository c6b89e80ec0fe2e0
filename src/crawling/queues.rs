//! # Bounded hand-off queue
//!
//! Connects the fetch producer to the parse consumer. `push` waits for a free
//! slot, which is what throttles the producer when parsing falls behind.
//! The consumer side waits for a depth threshold instead of single items so
//! that every parse dispatch can fill the worker pool.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, Semaphore};

/// Queue operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,
}

/// Counters for monitoring; `max_depth` is the backpressure witness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueMetrics {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub current_depth: usize,
    pub max_depth: usize,
}

impl QueueMetrics {
    fn record_enqueue(&mut self, depth: usize) {
        self.total_enqueued += 1;
        self.current_depth = depth;
        self.max_depth = self.max_depth.max(depth);
    }

    fn record_dequeue(&mut self, count: usize, depth: usize) {
        self.total_dequeued += count as u64;
        self.current_depth = depth;
    }
}

pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    free_slots: Semaphore,
    arrivals: Notify,
    closed: AtomicBool,
    capacity: usize,
    metrics: Mutex<QueueMetrics>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            free_slots: Semaphore::new(capacity),
            arrivals: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
            metrics: Mutex::new(QueueMetrics::default()),
        }
    }

    /// Append an item, waiting while the queue is full
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] once [`close`](Self::close) was called.
    pub async fn push(&self, item: T) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let permit = self
            .free_slots
            .acquire()
            .await
            .map_err(|_| QueueError::Closed)?;
        // The slot is handed back by `pop_batch`, not by dropping the permit
        permit.forget();

        let depth = {
            let mut items = self.lock_items();
            items.push_back(item);
            items.len()
        };
        self.lock_metrics().record_enqueue(depth);
        self.arrivals.notify_one();
        Ok(())
    }

    /// Wait until at least `threshold` items are queued or the queue is closed
    ///
    /// Returns the depth at wake-up; `0` means closed and fully drained.
    /// Meant for a single consumer.
    pub async fn ready(&self, threshold: usize) -> usize {
        let threshold = threshold.clamp(1, self.capacity);
        loop {
            let depth = self.len();
            if depth >= threshold || self.is_closed() {
                return depth;
            }
            // notify_one stores a wake-up if the push raced this check
            self.arrivals.notified().await;
        }
    }

    /// Take up to `max` items from the front, freeing their slots
    pub fn pop_batch(&self, max: usize) -> Vec<T> {
        let (batch, depth) = {
            let mut items = self.lock_items();
            let take = max.min(items.len());
            let batch: Vec<T> = items.drain(..take).collect();
            (batch, items.len())
        };

        if !batch.is_empty() {
            self.free_slots.add_permits(batch.len());
            self.lock_metrics().record_dequeue(batch.len(), depth);
        }
        batch
    }

    /// No more pushes; wakes a waiting consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.arrivals.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> QueueMetrics {
        *self.lock_metrics()
    }

    // No critical section can leave the data half-written, so poisoning is ignored
    fn lock_items(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_metrics(&self) -> std::sync::MutexGuard<'_, QueueMetrics> {
        self.metrics.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn push_blocks_when_full() {
        let queue = BoundedQueue::new(2);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();

        let blocked = timeout(Duration::from_millis(50), queue.push(3)).await;
        assert!(blocked.is_err(), "third push should wait for a free slot");

        assert_eq!(queue.pop_batch(1), vec![1]);
        timeout(Duration::from_millis(50), queue.push(3))
            .await
            .expect("slot freed by pop")
            .unwrap();
        assert_eq!(queue.pop_batch(10), vec![2, 3]);
    }

    #[tokio::test]
    async fn ready_waits_for_threshold() {
        let queue = Arc::new(BoundedQueue::new(8));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.ready(3).await })
        };

        for i in 0..3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            queue.push(i).await.unwrap();
        }

        assert_eq!(consumer.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn close_releases_consumer_below_threshold() {
        let queue = Arc::new(BoundedQueue::new(8));
        queue.push("only").await.unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.ready(4).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        assert_eq!(consumer.await.unwrap(), 1);
        assert_eq!(queue.pop_batch(4), vec!["only"]);
        assert_eq!(queue.ready(4).await, 0);
    }

    #[tokio::test]
    async fn push_after_close_is_rejected() {
        let queue = BoundedQueue::new(1);
        queue.close();
        assert_eq!(queue.push(1).await, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn metrics_track_depth_peak() {
        let queue = BoundedQueue::new(4);
        for i in 0..3 {
            queue.push(i).await.unwrap();
        }
        queue.pop_batch(2);
        queue.push(9).await.unwrap();

        let metrics = queue.metrics();
        assert_eq!(metrics.total_enqueued, 4);
        assert_eq!(metrics.total_dequeued, 2);
        assert_eq!(metrics.current_depth, 2);
        assert_eq!(metrics.max_depth, 3);
    }
}
