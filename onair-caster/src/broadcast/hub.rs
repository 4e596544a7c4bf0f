//! Broadcast hub
//!
//! Fans every emitted chunk out to all joined listeners and keeps the most
//! recent chunks in a replay buffer so a new listener starts with audio
//! already in hand.
//!
//! One mutex covers both the replay buffer and the listener set. `join`
//! flushes the replay buffer to the newcomer and registers it inside that
//! lock, so no chunk can be broadcast between the flush and the
//! registration: a listener sees a gap-free, duplicate-free suffix of the
//! broadcast. Sinks never block (see [`ListenerSink`]), so holding the lock
//! across offers is bounded by the number of listeners.

use super::listener::{
    ListenerId, ListenerInfo, ListenerSession, ListenerSink, ListenerWriteError, Outbox,
    Subscription,
};
use super::replay::ReplayBuffer;
use bytes::Bytes;
use chrono::Utc;
use onair_common::config::OverflowPolicy;
use onair_common::events::OnAirEvent;
use onair_common::StationConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct HubInner {
    replay: ReplayBuffer,
    /// Join order
    listeners: Vec<ListenerSession>,
}

pub struct BroadcastHub {
    inner: Mutex<HubInner>,
    listener_capacity: usize,
    overflow_policy: OverflowPolicy,
    chunks_broadcast: AtomicU64,
    event_tx: Option<broadcast::Sender<OnAirEvent>>,
}

impl BroadcastHub {
    /// `listener_capacity` bounds each subscription's outbox; it should be at
    /// least `replay_chunks` so the join flush always fits
    pub fn new(replay_chunks: usize, listener_capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                replay: ReplayBuffer::new(replay_chunks),
                listeners: Vec::new(),
            }),
            listener_capacity: listener_capacity.max(replay_chunks).max(1),
            overflow_policy,
            chunks_broadcast: AtomicU64::new(0),
            event_tx: None,
        }
    }

    pub fn from_config(config: &StationConfig) -> Self {
        Self::new(
            config.replay_chunks,
            config.listener_capacity(),
            config.overflow_policy,
        )
    }

    /// Publish `ListenerJoined` / `ListenerLeft` on the event bus
    pub fn with_events(mut self, event_tx: broadcast::Sender<OnAirEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Flush the replay buffer into `sink`, then register it
    ///
    /// A sink that refuses part of the flush is not registered.
    pub fn join(&self, sink: Arc<dyn ListenerSink>) -> Result<ListenerId, ListenerWriteError> {
        let id = Uuid::new_v4();
        let (flushed, listeners) = {
            let mut inner = self.lock();
            for chunk in inner.replay.iter() {
                sink.offer(chunk.clone())?;
            }
            let flushed = inner.replay.len();
            inner.listeners.push(ListenerSession {
                id,
                sink,
                joined_at: Utc::now(),
                delivered: flushed as u64,
            });
            (flushed, inner.listeners.len())
        };

        info!(
            "Listener {} joined ({} replayed chunks, {} listening)",
            id, flushed, listeners
        );
        self.publish(OnAirEvent::ListenerJoined {
            listener_id: id,
            listeners,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    /// Join with a bounded outbox and get the reading end
    pub fn subscribe(self: &Arc<Self>) -> Result<Subscription, ListenerWriteError> {
        let outbox = Arc::new(Outbox::new(self.listener_capacity, self.overflow_policy));
        let id = self.join(Arc::clone(&outbox) as Arc<dyn ListenerSink>)?;
        Ok(Subscription::new(id, outbox, Arc::downgrade(self)))
    }

    /// Deregister a listener; returns false if it was already gone
    pub fn leave(&self, id: ListenerId) -> bool {
        let (session, listeners) = {
            let mut inner = self.lock();
            let Some(position) = inner.listeners.iter().position(|s| s.id == id) else {
                return false;
            };
            let session = inner.listeners.remove(position);
            (session, inner.listeners.len())
        };
        session.sink.close();

        info!("Listener {} left ({} listening)", id, listeners);
        self.publish(OnAirEvent::ListenerLeft {
            listener_id: id,
            listeners,
            timestamp: Utc::now(),
        });
        true
    }

    /// Record `chunk` for replay and offer it to every listener
    ///
    /// A listener whose sink refuses the chunk is removed; the rest still
    /// receive it. Returns the number of listeners that accepted it.
    pub fn broadcast(&self, chunk: Bytes) -> usize {
        let mut dropped: Vec<(ListenerId, ListenerWriteError)> = Vec::new();
        let (delivered, listeners) = {
            let mut inner = self.lock();
            inner.replay.push(chunk.clone());

            let mut delivered = 0;
            inner.listeners.retain_mut(|session| match session.sink.offer(chunk.clone()) {
                Ok(()) => {
                    session.delivered += 1;
                    delivered += 1;
                    true
                }
                Err(e) => {
                    session.sink.close();
                    dropped.push((session.id, e));
                    false
                }
            });
            (delivered, inner.listeners.len())
        };
        self.chunks_broadcast.fetch_add(1, Ordering::Relaxed);

        for (id, reason) in dropped {
            match reason {
                ListenerWriteError::Closed => debug!("Listener {} disconnected", id),
                ListenerWriteError::Overflow { .. } => {
                    warn!("Dropping listener {}: {}", id, reason)
                }
            }
            self.publish(OnAirEvent::ListenerLeft {
                listener_id: id,
                listeners,
                timestamp: Utc::now(),
            });
        }
        delivered
    }

    /// Close every session, ending each listener's stream after what it has queued
    pub fn close_all(&self) -> usize {
        let sessions = std::mem::take(&mut self.lock().listeners);
        for session in &sessions {
            session.sink.close();
        }
        if !sessions.is_empty() {
            info!("Closed {} listener sessions", sessions.len());
        }
        sessions.len()
    }

    pub fn listeners(&self) -> Vec<ListenerInfo> {
        self.lock().listeners.iter().map(ListenerSession::info).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn replay_len(&self) -> usize {
        self.lock().replay.len()
    }

    pub fn replay_capacity(&self) -> usize {
        self.lock().replay.capacity()
    }

    /// Payload bytes held for late joiners
    pub fn replay_bytes(&self) -> usize {
        self.lock().replay.byte_len()
    }

    /// Total chunks emitted since start
    pub fn chunks_broadcast(&self) -> u64 {
        self.chunks_broadcast.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: OnAirEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}
