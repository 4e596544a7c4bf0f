//! Event types for the OnAir event system
//!
//! Events are published by the broadcast engine on a `tokio::sync::broadcast`
//! bus and forwarded verbatim to SSE clients as JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scheduler state machine value
///
/// Exactly one value holds at any instant. Only the scheduler writes it;
/// everything else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Before the first scheduling decision, or after shutdown
    Idle,
    /// A queued file is the active source
    PlayingQueued,
    /// The filler loop is the active source
    PlayingFiller,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::PlayingQueued => "playing_queued",
            PlaybackState::PlayingFiller => "playing_filler",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a queued item stopped playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishOutcome {
    /// Reader reached end of data
    Completed,
    /// Duration-derived safety deadline fired before end of data
    TimedOut,
    /// Source was missing or failed to read
    Failed,
    /// Engine shut down while the item was playing
    Stopped,
}

/// OnAir event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OnAirEvent {
    /// Scheduler changed state
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A queued item became the active source
    ItemStarted {
        item_id: Uuid,
        file_path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A queued item stopped being the active source
    ItemFinished {
        item_id: Uuid,
        file_path: String,
        outcome: FinishOutcome,
        bytes_emitted: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed (enqueue, removal, clear, or dequeue by the scheduler)
    QueueChanged {
        length: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Listener joined the broadcast
    ListenerJoined {
        listener_id: Uuid,
        listeners: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Listener left the broadcast (disconnect or write failure)
    ListenerLeft {
        listener_id: Uuid,
        listeners: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl OnAirEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            OnAirEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            OnAirEvent::ItemStarted { .. } => "ItemStarted",
            OnAirEvent::ItemFinished { .. } => "ItemFinished",
            OnAirEvent::QueueChanged { .. } => "QueueChanged",
            OnAirEvent::ListenerJoined { .. } => "ListenerJoined",
            OnAirEvent::ListenerLeft { .. } => "ListenerLeft",
        }
    }
}
