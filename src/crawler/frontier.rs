use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::Notify;
use tracing::debug;

use crate::config::SchedulerType;
use crate::crawler::task::CrawlTask;

/// A task wrapped with its insertion sequence number for FIFO tie-breaking
struct QueuedTask {
    task: CrawlTask,
    priority: i32,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, lower sequence (earlier insert)
        // breaks ties
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority frontier of not-yet-fetched tasks.
///
/// Backed by a binary heap ordered by priority (descending) with FIFO
/// fairness among equal priorities. Safe for concurrent push/pop; `next`
/// waits until a task arrives or the frontier is closed.
pub struct Frontier {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    notify: Notify,
    closed: AtomicBool,
    seq: AtomicU64,
    scheduler: SchedulerType,
}

impl Frontier {
    /// `capacity` pre-sizes the heap; it is a reservation, not a hard bound
    pub fn new(scheduler: SchedulerType, capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            scheduler,
        }
    }

    /// Insert a task. Returns false if the frontier has been closed.
    pub fn push(&self, task: CrawlTask) -> bool {
        if self.closed.load(AtomicOrdering::Acquire) {
            debug!("Dropping task pushed to closed frontier: {}", task.url);
            return false;
        }

        let priority = match self.scheduler {
            SchedulerType::Priority => task.priority,
            // FIFO mode flattens priorities so only insertion order matters
            SchedulerType::Fifo => 0,
        };
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);

        let mut heap = self.heap.lock().expect("frontier lock poisoned");
        heap.push(QueuedTask { task, priority, seq });
        drop(heap);

        self.notify.notify_one();
        true
    }

    /// Remove and return the highest-priority task, or None when empty
    pub fn try_pop(&self) -> Option<CrawlTask> {
        let mut heap = self.heap.lock().expect("frontier lock poisoned");
        heap.pop().map(|q| q.task)
    }

    /// Wait for the next task. Returns None once the frontier is closed and
    /// drained.
    pub async fn next(&self) -> Option<CrawlTask> {
        loop {
            // Register for notification before checking the heap so a push
            // between the check and the await is not missed
            let notified = self.notify.notified();

            if let Some(task) = self.try_pop() {
                // Wake another waiter in case more tasks are queued
                self.notify.notify_one();
                return Some(task);
            }

            if self.closed.load(AtomicOrdering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.heap.lock().expect("frontier lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all queued tasks
    pub fn clear(&self) {
        self.heap.lock().expect("frontier lock poisoned").clear();
    }

    /// Close the frontier, waking all waiters. Idempotent: only the first
    /// call observes the transition.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, AtomicOrdering::AcqRel);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str, priority: i32) -> CrawlTask {
        CrawlTask::seed(url.to_string(), priority)
    }

    #[test]
    fn test_pop_order_is_priority_then_fifo() {
        let frontier = Frontier::new(SchedulerType::Priority, 16);

        frontier.push(task("https://a.com/low", 1));
        frontier.push(task("https://a.com/high", 10));
        frontier.push(task("https://a.com/mid-first", 5));
        frontier.push(task("https://a.com/mid-second", 5));

        assert_eq!(frontier.try_pop().unwrap().url, "https://a.com/high");
        assert_eq!(frontier.try_pop().unwrap().url, "https://a.com/mid-first");
        assert_eq!(frontier.try_pop().unwrap().url, "https://a.com/mid-second");
        assert_eq!(frontier.try_pop().unwrap().url, "https://a.com/low");
        assert!(frontier.try_pop().is_none());
    }

    #[test]
    fn test_fifo_scheduler_ignores_priority() {
        let frontier = Frontier::new(SchedulerType::Fifo, 16);

        frontier.push(task("https://a.com/first", 1));
        frontier.push(task("https://a.com/second", 100));

        assert_eq!(frontier.try_pop().unwrap().url, "https://a.com/first");
        assert_eq!(frontier.try_pop().unwrap().url, "https://a.com/second");
    }

    #[test]
    fn test_len_and_clear() {
        let frontier = Frontier::new(SchedulerType::Priority, 16);
        frontier.push(task("https://a.com/1", 0));
        frontier.push(task("https://a.com/2", 0));
        assert_eq!(frontier.len(), 2);

        frontier.clear();
        assert!(frontier.is_empty());
        assert!(frontier.try_pop().is_none());
    }

    #[test]
    fn test_capacity_is_a_reservation_not_a_bound() {
        let frontier = Frontier::new(SchedulerType::Priority, 2);

        for i in 0..10 {
            assert!(frontier.push(task(&format!("https://a.com/{}", i), 0)));
        }
        assert_eq!(frontier.len(), 10);
    }

    #[test]
    fn test_close_is_exactly_once_and_rejects_pushes() {
        let frontier = Frontier::new(SchedulerType::Priority, 16);
        assert!(frontier.close());
        assert!(!frontier.close());
        assert!(!frontier.push(task("https://a.com/late", 0)));
        assert_eq!(frontier.len(), 0);
    }

    #[tokio::test]
    async fn test_next_wakes_on_push() {
        use std::sync::Arc;

        let frontier = Arc::new(Frontier::new(SchedulerType::Priority, 16));
        let waiter = frontier.clone();
        let handle = tokio::spawn(async move { waiter.next().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        frontier.push(task("https://a.com/awaited", 0));

        let got = handle.await.unwrap();
        assert_eq!(got.unwrap().url, "https://a.com/awaited");
    }

    #[tokio::test]
    async fn test_next_returns_none_after_close() {
        use std::sync::Arc;

        let frontier = Arc::new(Frontier::new(SchedulerType::Priority, 16));
        let waiter = frontier.clone();
        let handle = tokio::spawn(async move { waiter.next().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        frontier.close();

        assert!(handle.await.unwrap().is_none());
    }
}
