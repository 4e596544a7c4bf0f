//! Broadcast engine
//!
//! Owns the queue, the hub and the scheduler task. Construction fails only
//! on invalid settings or when the filler cannot be loaded; after that every
//! source and listener fault is contained.
//!
//! Played files are deleted, so ingestion only accepts regular files inside
//! the configured media directory, and never the filler.

use crate::broadcast::BroadcastHub;
use crate::error::{Error, Result};
use crate::playback::filler::Filler;
use crate::playback::probe::{DurationProbe, SymphoniaProbe};
use crate::playback::queue::{PlayQueue, QueueItem};
use crate::playback::scheduler::Scheduler;
use crate::playback::source::{FileSourceOptions, SourceOpener};
use crate::state::SharedState;
use onair_common::StationConfig;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Where an ingested file goes in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Tail of the queue
    Back,
    /// Head of the queue, plays next
    Next,
}

pub struct BroadcastEngine {
    queue: Arc<PlayQueue>,
    hub: Arc<BroadcastHub>,
    state: Arc<SharedState>,
    media_dir: PathBuf,
    filler_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastEngine {
    /// Validate the config, load the filler and start the scheduler
    ///
    /// Fails with [`Error::Config`] on invalid settings and with
    /// [`Error::FillerUnavailable`] when the filler file is missing,
    /// unreadable or empty.
    pub async fn start(config: &StationConfig) -> Result<Self> {
        config.validate()?;

        if !tokio::fs::metadata(&config.media_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            warn!(
                "Media directory {} does not exist; nothing can be queued until it does",
                config.media_dir.display()
            );
        }

        let filler = Filler::load(
            &config.filler_path,
            config.filler_chunk_bytes,
            config.filler_interval(),
        )
        .await?;

        Ok(Self::start_with(
            config,
            filler,
            Arc::new(SymphoniaProbe),
            FileSourceOptions::from_config(config),
        ))
    }

    /// Start with an already-loaded filler and explicit source settings
    pub fn start_with(
        config: &StationConfig,
        filler: Filler,
        probe: Arc<dyn DurationProbe>,
        options: FileSourceOptions,
    ) -> Self {
        let state = Arc::new(SharedState::new());
        let queue = Arc::new(PlayQueue::with_events(state.event_tx.clone()));
        let hub = Arc::new(BroadcastHub::from_config(config).with_events(state.event_tx.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = Scheduler::new(
            Arc::clone(&queue),
            Arc::clone(&hub),
            SourceOpener::new(filler, probe, options),
            Arc::clone(&state),
            config.delete_played_files,
            shutdown_rx,
        )
        .spawn();

        info!(
            "Broadcast engine started (replay {} chunks, listener capacity {}, {:?} on overflow)",
            config.replay_chunks,
            config.listener_capacity(),
            config.overflow_policy
        );

        Self {
            queue,
            hub,
            state,
            media_dir: config.media_dir.clone(),
            filler_path: config.filler_path.clone(),
            shutdown_tx,
            scheduler: Mutex::new(Some(scheduler)),
        }
    }

    pub fn queue(&self) -> &Arc<PlayQueue> {
        &self.queue
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Queue a file from the media directory
    ///
    /// The path is canonicalized first, so `..` components and symlinks
    /// cannot reach outside the media directory; the canonical path is what
    /// gets queued and later deleted. On error the queue is left untouched.
    pub async fn ingest(&self, path: impl Into<PathBuf>, placement: Placement) -> Result<QueueItem> {
        let path = path.into();
        let canonical = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| rejected(&path, e))?;

        let media_dir = tokio::fs::canonicalize(&self.media_dir).await.map_err(|e| {
            Error::Ingestion(format!(
                "media directory {} unavailable: {}",
                self.media_dir.display(),
                e
            ))
        })?;
        if !canonical.starts_with(&media_dir) {
            return Err(rejected(&path, "outside the media directory"));
        }
        if let Ok(filler) = tokio::fs::canonicalize(&self.filler_path).await {
            if canonical == filler {
                return Err(rejected(&path, "is the filler source"));
            }
        }

        let metadata = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| rejected(&path, e))?;
        if !metadata.is_file() {
            return Err(rejected(&path, "not a regular file"));
        }

        Ok(match placement {
            Placement::Back => self.queue.enqueue(canonical),
            Placement::Next => self.queue.play_next(canonical),
        })
    }

    /// Resolves once shutdown has begun
    pub fn stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Stop the scheduler and end every listener stream
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        if let Some(handle) = self.scheduler.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Scheduler task failed: {}", e);
            }
        }
        self.hub.close_all();
    }
}

fn rejected(path: &Path, reason: impl Display) -> Error {
    Error::Ingestion(format!("{}: {}", path.display(), reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::probe::NoProbe;
    use crate::state::PlaybackState;
    use std::time::Duration;

    fn engine(media_dir: &Path) -> BroadcastEngine {
        let config = StationConfig {
            media_dir: media_dir.to_path_buf(),
            filler_path: media_dir.join("static-noise.mp3"),
            ..Default::default()
        };
        let filler = Filler::from_bytes(vec![0u8; 16], 8, Duration::from_millis(10)).unwrap();
        BroadcastEngine::start_with(&config, filler, Arc::new(NoProbe), FileSourceOptions::unpaced(8))
    }

    #[tokio::test]
    async fn test_start_fails_without_filler() {
        let dir = tempfile::tempdir().unwrap();
        let config = StationConfig {
            filler_path: dir.path().join("static-noise.mp3"),
            ..Default::default()
        };

        let result = BroadcastEngine::start(&config).await;
        assert!(matches!(result, Err(Error::FillerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = StationConfig {
            chunk_bytes: 0,
            ..Default::default()
        };

        let result = BroadcastEngine::start(&config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_ingest_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        std::fs::create_dir(dir.path().join("album")).unwrap();

        let missing = engine.ingest(dir.path().join("nope.mp3"), Placement::Back).await;
        assert!(matches!(missing, Err(Error::Ingestion(_))));

        let directory = engine.ingest(dir.path().join("album"), Placement::Back).await;
        assert!(matches!(directory, Err(Error::Ingestion(_))));

        assert!(engine.queue().is_empty());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_ingest_confined_to_media_dir() {
        let media = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let engine = engine(media.path());
        engine.shutdown().await;

        let inside = media.path().join("song.mp3");
        let outside = elsewhere.path().join("precious.txt");
        std::fs::write(&inside, b"audio").unwrap();
        std::fs::write(&outside, b"data").unwrap();
        std::fs::write(media.path().join("static-noise.mp3"), b"noise").unwrap();

        let item = engine.ingest(&inside, Placement::Back).await.unwrap();
        assert_eq!(item.path, std::fs::canonicalize(&inside).unwrap());

        let err = engine.ingest(&outside, Placement::Back).await.unwrap_err();
        assert!(err.to_string().contains("outside the media directory"));

        let escape = media
            .path()
            .join("..")
            .join(elsewhere.path().file_name().unwrap())
            .join("precious.txt");
        let escaped = engine.ingest(escape, Placement::Next).await;
        assert!(matches!(escaped, Err(Error::Ingestion(_))));

        let filler = engine.ingest(media.path().join("static-noise.mp3"), Placement::Back).await;
        assert!(matches!(filler, Err(Error::Ingestion(msg)) if msg.contains("filler")));

        assert_eq!(engine.queue().len(), 1);
        assert!(outside.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ingest_rejects_symlink_leading_out() {
        let media = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let engine = engine(media.path());
        engine.shutdown().await;

        let target = elsewhere.path().join("precious.txt");
        std::fs::write(&target, b"data").unwrap();
        let link = media.path().join("innocent.mp3");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let result = engine.ingest(link, Placement::Back).await;
        assert!(matches!(result, Err(Error::Ingestion(_))));
        assert!(engine.queue().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_goes_idle_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let mut watcher = engine.state().watch_playback_state();
        tokio::time::timeout(
            Duration::from_secs(1),
            watcher.wait_for(|s| *s == PlaybackState::PlayingFiller),
        )
        .await
        .unwrap()
        .unwrap();

        engine.shutdown().await;
        assert_eq!(engine.state().playback_state(), PlaybackState::Idle);
        engine.shutdown().await;
    }
}
