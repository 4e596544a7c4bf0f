//! Playback scheduler
//!
//! The single producer. Decides which source is active, pulls its signals,
//! hands chunks to the broadcast hub and advances on completion:
//!
//! ```text
//! Idle ──queue non-empty──▶ PlayingQueued ──ended/failed, queue non-empty──┐
//!  │                          ▲   │                                         │
//!  │                          │   └──────────────◀──────────────────────────┘
//!  │                  enqueue │   ended/failed, queue empty
//!  └──queue empty──▶ PlayingFiller ◀─┘
//! ```
//!
//! Everything happens in one `select!` loop; there are no completion
//! callbacks, so a source can only be advanced from here and only once.

use crate::broadcast::BroadcastHub;
use crate::playback::queue::{PlayQueue, QueueItem};
use crate::playback::source::{EndReason, SourceKind, SourceOpener, SourceReader, SourceSignal};
use crate::state::{NowPlaying, PlaybackState, SharedState};
use chrono::Utc;
use onair_common::events::{FinishOutcome, OnAirEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The source currently feeding the hub
struct ActiveSource {
    reader: SourceReader,
    /// Queue item being played; None for filler
    item: Option<QueueItem>,
    bytes_emitted: u64,
    chunks_emitted: u64,
}

impl ActiveSource {
    fn new(reader: SourceReader, item: Option<QueueItem>) -> Self {
        Self {
            reader,
            item,
            bytes_emitted: 0,
            chunks_emitted: 0,
        }
    }

    fn kind(&self) -> SourceKind {
        self.reader.kind()
    }
}

pub struct Scheduler {
    queue: Arc<PlayQueue>,
    hub: Arc<BroadcastHub>,
    opener: SourceOpener,
    state: Arc<SharedState>,
    delete_played_files: bool,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        queue: Arc<PlayQueue>,
        hub: Arc<BroadcastHub>,
        opener: SourceOpener,
        state: Arc<SharedState>,
        delete_played_files: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            hub,
            opener,
            state,
            delete_played_files,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until the shutdown flag is raised or its sender dropped
    pub async fn run(mut self) {
        info!("Scheduler started");
        let mut active = self.open_next().await;

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let on_filler = active.kind() == SourceKind::Filler;

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }

                _ = self.queue.item_arrived(), if on_filler => {
                    if self.queue.is_empty() {
                        debug!("Queue wakeup with nothing queued; filler continues");
                        continue;
                    }
                    info!("Item queued; interrupting filler");
                    active = self.open_next().await;
                }

                signal = active.reader.next_signal() => match signal {
                    Some(SourceSignal::Chunk(chunk)) => {
                        active.bytes_emitted += chunk.len() as u64;
                        active.chunks_emitted += 1;
                        self.hub.broadcast(chunk);
                    }
                    Some(SourceSignal::Ended(reason)) => {
                        let outcome = match reason {
                            EndReason::EndOfData => FinishOutcome::Completed,
                            EndReason::SafetyTimeout => FinishOutcome::TimedOut,
                        };
                        self.finish(active, outcome).await;
                        active = self.open_next().await;
                    }
                    Some(SourceSignal::Failed(e)) => {
                        warn!("Source failed mid-stream: {}", e);
                        self.finish(active, FinishOutcome::Failed).await;
                        active = self.open_next().await;
                    }
                    None => {
                        // Fused reader; advance rather than spin
                        self.finish(active, FinishOutcome::Completed).await;
                        active = self.open_next().await;
                    }
                },
            }
        }

        self.finish(active, FinishOutcome::Stopped).await;
        self.state.set_now_playing(None).await;
        self.state.set_playback_state(PlaybackState::Idle);
        info!("Scheduler stopped");
    }

    /// Open the next queued item, skipping ones that cannot be opened,
    /// or start filler when the queue runs dry
    async fn open_next(&self) -> ActiveSource {
        while let Ok(item) = self.queue.dequeue_head() {
            match self.opener.open_file(&item.path).await {
                Ok(reader) => {
                    info!("Now playing: {}", item.path.display());
                    self.state
                        .set_now_playing(Some(NowPlaying::queued(item.id, item.path.clone())))
                        .await;
                    self.state.set_playback_state(PlaybackState::PlayingQueued);
                    self.state.broadcast_event(OnAirEvent::ItemStarted {
                        item_id: item.id,
                        file_path: item.path.to_string_lossy().into_owned(),
                        timestamp: Utc::now(),
                    });
                    return ActiveSource::new(reader, Some(item));
                }
                Err(e) => {
                    warn!("Skipping queued item: {}", e);
                    self.retire(item, FinishOutcome::Failed, 0, 0).await;
                }
            }
        }

        info!("Queue empty; playing filler");
        self.state.set_now_playing(Some(NowPlaying::filler())).await;
        self.state.set_playback_state(PlaybackState::PlayingFiller);
        ActiveSource::new(self.opener.open_filler(), None)
    }

    /// Stop a source; a queued item is then retired
    async fn finish(&self, active: ActiveSource, outcome: FinishOutcome) {
        let ActiveSource {
            reader,
            item,
            bytes_emitted,
            chunks_emitted,
        } = active;
        drop(reader);

        match item {
            Some(item) => self.retire(item, outcome, bytes_emitted, chunks_emitted).await,
            None => debug!("Filler stopped after {} chunks", chunks_emitted),
        }
    }

    /// Report a queued item as finished and delete its file
    async fn retire(&self, item: QueueItem, outcome: FinishOutcome, bytes_emitted: u64, chunks_emitted: u64) {
        info!(
            "Finished {} ({:?}, {} chunks, {} bytes)",
            item.path.display(),
            outcome,
            chunks_emitted,
            bytes_emitted
        );
        self.state.broadcast_event(OnAirEvent::ItemFinished {
            item_id: item.id,
            file_path: item.path.to_string_lossy().into_owned(),
            outcome,
            bytes_emitted,
            timestamp: Utc::now(),
        });

        // Interrupted by shutdown: not played out, keep the file
        if !self.delete_played_files || outcome == FinishOutcome::Stopped {
            return;
        }
        match tokio::fs::remove_file(&item.path).await {
            Ok(()) => debug!("Deleted {}", item.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", item.path.display(), e),
        }
    }
}
