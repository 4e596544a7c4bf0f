//! Shared station state
//!
//! Written only by the scheduler, read by HTTP handlers and tests.

use crate::playback::source::SourceKind;
use chrono::{DateTime, Utc};
use onair_common::events::OnAirEvent;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::{broadcast, watch, RwLock};
use uuid::Uuid;

pub use onair_common::events::PlaybackState;

/// What the scheduler is currently emitting
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub kind: SourceKind,
    /// Queue item id (None for filler)
    pub item_id: Option<Uuid>,
    pub path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl NowPlaying {
    pub fn filler() -> Self {
        Self {
            kind: SourceKind::Filler,
            item_id: None,
            path: None,
            started_at: Utc::now(),
        }
    }

    pub fn queued(item_id: Uuid, path: PathBuf) -> Self {
        Self {
            kind: SourceKind::Queued,
            item_id: Some(item_id),
            path: Some(path),
            started_at: Utc::now(),
        }
    }
}

/// Shared state accessible by all components
pub struct SharedState {
    /// Scheduler state; watchers are woken on every change
    playback_state: watch::Sender<PlaybackState>,

    /// Active source (None while idle)
    now_playing: RwLock<Option<NowPlaying>>,

    /// Event broadcaster for SSE events
    pub event_tx: broadcast::Sender<OnAirEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (playback_state, _) = watch::channel(PlaybackState::Idle);
        Self {
            playback_state,
            now_playing: RwLock::new(None),
            event_tx,
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: OnAirEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<OnAirEvent> {
        self.event_tx.subscribe()
    }

    pub fn playback_state(&self) -> PlaybackState {
        *self.playback_state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_playback_state(&self) -> watch::Receiver<PlaybackState> {
        self.playback_state.subscribe()
    }

    /// Set the state, publishing `PlaybackStateChanged` if it differs
    ///
    /// Returns the previous state.
    pub fn set_playback_state(&self, new_state: PlaybackState) -> PlaybackState {
        let old_state = self.playback_state.send_replace(new_state);
        if old_state != new_state {
            self.broadcast_event(OnAirEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: Utc::now(),
            });
        }
        old_state
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.read().await.clone()
    }

    pub async fn set_now_playing(&self, now_playing: Option<NowPlaying>) {
        *self.now_playing.write().await = now_playing;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
