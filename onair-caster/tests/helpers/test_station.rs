//! Station wrapper for integration tests
//!
//! Starts a [`BroadcastEngine`] through the same path as the binary
//! (`BroadcastEngine::start`), with the filler and queued tracks written into
//! a temp directory that is also the media directory. Pacing is off unless a test turns it on, so tracks play
//! as fast as the scheduler pulls them.

use bytes::Bytes;
use onair_caster::broadcast::Subscription;
use onair_caster::state::PlaybackState;
use onair_caster::BroadcastEngine;
use onair_common::StationConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Chunk size for both tracks and filler
pub const CHUNK: usize = 16;

/// Every filler byte; track bytes never use it
pub const FILLER_BYTE: u8 = 0xF0;

const WAIT: Duration = Duration::from_secs(3);

pub struct TestStation {
    pub engine: Arc<BroadcastEngine>,
    pub config: StationConfig,
    dir: TempDir,
}

impl TestStation {
    /// Start with test defaults; `tweak` adjusts the config first
    pub async fn start(tweak: impl FnOnce(&mut StationConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let filler_path = dir.path().join("static-noise.mp3");
        std::fs::write(&filler_path, vec![FILLER_BYTE; CHUNK * 4]).expect("write filler");

        let mut config = Self::config(filler_path);
        tweak(&mut config);

        let engine = BroadcastEngine::start(&config)
            .await
            .expect("engine should start");

        Self {
            engine: Arc::new(engine),
            config,
            dir,
        }
    }

    pub fn config(filler_path: PathBuf) -> StationConfig {
        let media_dir = filler_path.parent().map(PathBuf::from).unwrap_or_default();
        let mut config = StationConfig {
            filler_path,
            media_dir,
            filler_chunk_bytes: CHUNK,
            filler_interval_ms: 5,
            chunk_bytes: CHUNK,
            replay_chunks: 0,
            listener_backlog_chunks: 4096,
            ..Default::default()
        };
        config.pacing.enabled = false;
        config
    }

    /// Write a track of `chunks` full chunks; chunk `i` is filled with `first_byte + i`
    pub fn write_track(&self, name: &str, first_byte: u8, chunks: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut data = Vec::with_capacity(chunks * CHUNK);
        for i in 0..chunks {
            data.extend(std::iter::repeat(first_byte + i as u8).take(CHUNK));
        }
        std::fs::write(&path, data).expect("write track");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub async fn wait_for_state(&self, wanted: PlaybackState) {
        let mut watcher = self.engine.state().watch_playback_state();
        tokio::time::timeout(WAIT, watcher.wait_for(|state| *state == wanted))
            .await
            .unwrap_or_else(|_| panic!("state {} not reached", wanted))
            .expect("state channel closed");
    }

    pub async fn stop(self) {
        self.engine.shutdown().await;
    }
}

/// Next chunk, failing the test if none arrives in time
pub async fn recv(sub: &mut Subscription) -> Bytes {
    tokio::time::timeout(WAIT, sub.recv())
        .await
        .expect("timed out waiting for chunk")
        .expect("subscription ended")
}

/// Skip filler chunks until track audio arrives
pub async fn recv_non_filler(sub: &mut Subscription) -> Bytes {
    loop {
        let chunk = recv(sub).await;
        if chunk[0] != FILLER_BYTE {
            return chunk;
        }
    }
}

/// Everything already queued for `sub`
pub fn drain(sub: &mut Subscription) -> Vec<Bytes> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}
