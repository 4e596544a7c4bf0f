//! Listener sessions
//!
//! A session is one registered sink in the hub. Sinks must accept chunks
//! without blocking: the default [`Outbox`] is a bounded per-listener queue
//! that the listener's own transport task drains. When the transport goes
//! away the outbox closes and the next offer fails, which removes the session.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use onair_common::config::OverflowPolicy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use super::hub::BroadcastHub;

pub type ListenerId = Uuid;

/// A sink refused a chunk; the hub removes that session only
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerWriteError {
    #[error("listener disconnected")]
    Closed,

    #[error("listener outbox full ({capacity} chunks)")]
    Overflow { capacity: usize },
}

/// Outbound side of one listener
pub trait ListenerSink: Send + Sync {
    /// Accept a chunk without blocking
    fn offer(&self, chunk: Bytes) -> Result<(), ListenerWriteError>;

    /// Called once when the hub drops the session
    fn close(&self) {}

    /// Chunks discarded under a drop-oldest policy
    fn dropped(&self) -> u64 {
        0
    }
}

/// Hub-side record of a joined listener
pub(crate) struct ListenerSession {
    pub(crate) id: ListenerId,
    pub(crate) sink: Arc<dyn ListenerSink>,
    pub(crate) joined_at: DateTime<Utc>,
    pub(crate) delivered: u64,
}

impl ListenerSession {
    pub(crate) fn info(&self) -> ListenerInfo {
        ListenerInfo {
            id: self.id,
            joined_at: self.joined_at,
            delivered_chunks: self.delivered,
            dropped_chunks: self.sink.dropped(),
        }
    }
}

/// Status view of a session
#[derive(Debug, Clone, Serialize)]
pub struct ListenerInfo {
    pub id: ListenerId,
    pub joined_at: DateTime<Utc>,
    pub delivered_chunks: u64,
    pub dropped_chunks: u64,
}

#[derive(Debug, Default)]
struct OutboxState {
    chunks: VecDeque<Bytes>,
    closed: bool,
    dropped: u64,
}

/// Bounded chunk queue between the hub and one transport task
#[derive(Debug)]
pub struct Outbox {
    state: Mutex<OutboxState>,
    ready: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Outbox {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(OutboxState::default()),
            ready: Notify::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Wait for the next chunk; `None` once closed and drained
    pub async fn recv(&self) -> Option<Bytes> {
        loop {
            {
                let mut state = self.lock();
                if let Some(chunk) = state.chunks.pop_front() {
                    return Some(chunk);
                }
                if state.closed {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Bytes> {
        self.lock().chunks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ListenerSink for Outbox {
    fn offer(&self, chunk: Bytes) -> Result<(), ListenerWriteError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(ListenerWriteError::Closed);
            }
            if state.chunks.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::Disconnect => {
                        // Queued chunks stay readable; the stream ends after them
                        state.closed = true;
                        drop(state);
                        self.ready.notify_one();
                        return Err(ListenerWriteError::Overflow {
                            capacity: self.capacity,
                        });
                    }
                    OverflowPolicy::DropOldest => {
                        state.chunks.pop_front();
                        state.dropped += 1;
                    }
                }
            }
            state.chunks.push_back(chunk);
        }
        self.ready.notify_one();
        Ok(())
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

/// A listener's handle on the broadcast
///
/// Created by [`BroadcastHub::subscribe`]. Dropping it leaves the hub.
pub struct Subscription {
    id: ListenerId,
    outbox: Arc<Outbox>,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, outbox: Arc<Outbox>, hub: Weak<BroadcastHub>) -> Self {
        Self { id, outbox, hub }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next chunk in broadcast order; `None` when the session has ended
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbox.recv().await
    }

    /// Next already-queued chunk, without waiting
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbox.try_recv()
    }

    /// Consume into a stream of chunks for a response body
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        let mut subscription = self;
        async_stream::stream! {
            while let Some(chunk) = subscription.recv().await {
                yield chunk;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.outbox.close();
        if let Some(hub) = self.hub.upgrade() {
            hub.leave(self.id);
        }
    }
}
