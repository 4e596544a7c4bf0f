//! Play queue
//!
//! FIFO of files waiting to be broadcast. All operations are linearized by one
//! mutex around a `VecDeque`; critical sections never await or touch the
//! filesystem. Insertions wake the scheduler through a permit-storing
//! `Notify`, so a wakeup sent while the scheduler is busy is not lost.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use onair_common::events::OnAirEvent;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};
use uuid::Uuid;

/// One pending file
///
/// Created by ingestion, consumed exactly once by the scheduler, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub path: PathBuf,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            enqueued_at: Utc::now(),
        }
    }
}

/// Point-in-time copy of the queue order
///
/// Iterating never observes mutations made after the snapshot was taken and
/// may be restarted any number of times.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    items: Arc<[QueueItem]>,
}

impl QueueSnapshot {
    /// `(index, item)` pairs in play order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &QueueItem)> + '_ {
        self.items.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QueueItem> {
        self.items.get(index)
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.items.iter().map(|item| item.path.as_path()).collect()
    }
}

/// Shared FIFO of queued files
pub struct PlayQueue {
    items: Mutex<VecDeque<QueueItem>>,
    arrived: Notify,
    event_tx: Option<broadcast::Sender<OnAirEvent>>,
}

impl PlayQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            event_tx: None,
        }
    }

    /// Create a queue that publishes `QueueChanged` on every mutation
    pub fn with_events(event_tx: broadcast::Sender<OnAirEvent>) -> Self {
        Self {
            event_tx: Some(event_tx),
            ..Self::new()
        }
    }

    /// Append to the tail; always succeeds
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> QueueItem {
        let item = QueueItem::new(path);
        let len = {
            let mut items = self.lock();
            items.push_back(item.clone());
            items.len()
        };
        info!("Added to queue: {} (position {})", item.path.display(), len - 1);
        self.arrived.notify_one();
        self.publish(len);
        item
    }

    /// Insert at the head so the item plays next
    pub fn play_next(&self, path: impl Into<PathBuf>) -> QueueItem {
        let item = QueueItem::new(path);
        let len = {
            let mut items = self.lock();
            items.push_front(item.clone());
            items.len()
        };
        info!("Queued to play next: {}", item.path.display());
        self.arrived.notify_one();
        self.publish(len);
        item
    }

    /// Remove and return the head item
    pub fn dequeue_head(&self) -> Result<QueueItem> {
        let (item, len) = {
            let mut items = self.lock();
            let item = items.pop_front().ok_or(Error::EmptyQueue)?;
            (item, items.len())
        };
        debug!("Dequeued {} ({} remaining)", item.path.display(), len);
        self.publish(len);
        Ok(item)
    }

    /// Remove the item at `index`
    pub fn remove(&self, index: usize) -> Result<QueueItem> {
        let (item, len) = {
            let mut items = self.lock();
            let len = items.len();
            let item = items.remove(index).ok_or(Error::OutOfRange { index, len })?;
            (item, items.len())
        };
        info!("Removed from queue: {} (was position {})", item.path.display(), index);
        self.publish(len);
        Ok(item)
    }

    /// Drop every pending item, returning how many were dropped
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut items = self.lock();
            let dropped = items.len();
            items.clear();
            dropped
        };
        info!("Queue cleared ({} items dropped)", dropped);
        self.publish(0);
        dropped
    }

    /// Snapshot of the current order
    pub fn list(&self) -> QueueSnapshot {
        let items: Vec<QueueItem> = self.lock().iter().cloned().collect();
        QueueSnapshot {
            items: items.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves once an item has been inserted since the last call
    ///
    /// Used by the scheduler to interrupt filler. The wakeup may be stale
    /// (item already removed), so callers re-check the queue.
    pub async fn item_arrived(&self) {
        self.arrived.notified().await
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueItem>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, length: usize) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(OnAirEvent::QueueChanged {
                length,
                timestamp: Utc::now(),
            });
        }
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_queue_creation() {
        let queue = PlayQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.list().is_empty());
    }

    #[test]
    fn test_list_preserves_fifo_order() {
        let queue = PlayQueue::new();
        queue.enqueue("a.mp3");
        queue.enqueue("b.mp3");
        queue.enqueue("c.mp3");

        let snapshot = queue.list();
        assert_eq!(
            snapshot.paths(),
            vec![Path::new("a.mp3"), Path::new("b.mp3"), Path::new("c.mp3")]
        );
        let indices: Vec<usize> = snapshot.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_dequeue_head_is_exactly_once() {
        let queue = PlayQueue::new();
        let a = queue.enqueue("a.mp3");
        let b = queue.enqueue("b.mp3");

        assert_eq!(queue.dequeue_head().unwrap(), a);
        assert!(queue.list().iter().all(|(_, item)| item.id != a.id));
        assert_eq!(queue.dequeue_head().unwrap(), b);
        assert!(matches!(queue.dequeue_head(), Err(Error::EmptyQueue)));
    }

    #[test]
    fn test_remove_by_index() {
        let queue = PlayQueue::new();
        queue.enqueue("a.mp3");
        let b = queue.enqueue("b.mp3");
        queue.enqueue("c.mp3");

        assert_eq!(queue.remove(1).unwrap(), b);
        assert_eq!(queue.list().paths(), vec![Path::new("a.mp3"), Path::new("c.mp3")]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let queue = PlayQueue::new();
        queue.enqueue("a.mp3");

        match queue.remove(5) {
            Err(Error::OutOfRange { index, len }) => {
                assert_eq!(index, 5);
                assert_eq!(len, 1);
            }
            other => panic!("Expected OutOfRange, got {:?}", other),
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_and_restartable() {
        let queue = PlayQueue::new();
        queue.enqueue("a.mp3");
        queue.enqueue("b.mp3");

        let snapshot = queue.list();
        queue.enqueue("c.mp3");
        queue.dequeue_head().unwrap();

        assert_eq!(snapshot.len(), 2);
        let first_pass: Vec<_> = snapshot.iter().map(|(_, item)| item.path.clone()).collect();
        let second_pass: Vec<_> = snapshot.iter().map(|(_, item)| item.path.clone()).collect();
        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass[0], PathBuf::from("a.mp3"));
    }

    #[test]
    fn test_play_next_goes_to_head() {
        let queue = PlayQueue::new();
        queue.enqueue("a.mp3");
        queue.play_next("urgent.mp3");

        assert_eq!(queue.dequeue_head().unwrap().path, PathBuf::from("urgent.mp3"));
    }

    #[test]
    fn test_clear() {
        let queue = PlayQueue::new();
        queue.enqueue("a.mp3");
        queue.enqueue("b.mp3");

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_mutations_publish_queue_changed() {
        let (tx, mut rx) = broadcast::channel(16);
        let queue = PlayQueue::with_events(tx);

        queue.enqueue("a.mp3");
        queue.dequeue_head().unwrap();

        let lengths: Vec<usize> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| match event {
                OnAirEvent::QueueChanged { length, .. } => length,
                other => panic!("Unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(lengths, vec![1, 0]);
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter_even_if_sent_first() {
        let queue = PlayQueue::new();
        queue.enqueue("a.mp3");

        // Permit stored by notify_one must satisfy a later wait
        tokio::time::timeout(Duration::from_secs(1), queue.item_arrived())
            .await
            .expect("stored wakeup was lost");
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_loses_nothing() {
        let queue = Arc::new(PlayQueue::new());
        let mut handles = Vec::new();

        for producer in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                for n in 0..50 {
                    queue.enqueue(format!("p{}-{:02}.mp3", producer, n));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = queue.list();
        assert_eq!(snapshot.len(), 400);

        // Each producer's own items keep their relative order
        for producer in 0..8 {
            let prefix = format!("p{}-", producer);
            let mine: Vec<String> = snapshot
                .iter()
                .map(|(_, item)| item.path.to_string_lossy().into_owned())
                .filter(|p| p.starts_with(&prefix))
                .collect();
            let mut sorted = mine.clone();
            sorted.sort();
            assert_eq!(mine, sorted);
            assert_eq!(mine.len(), 50);
        }
    }
}
