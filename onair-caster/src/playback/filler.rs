//! Filler source
//!
//! Fallback program played while the queue is empty: a small buffer (static
//! noise) emitted in fixed-size slices on a fixed interval, wrapping at the
//! end forever. Loaded once at start-up; a missing or empty filler file is
//! fatal because continuous output could not be guaranteed without it.

use crate::error::{Error, Result};
use crate::playback::source::SourceSignal;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::info;

/// Filler content and pacing, cheap to clone
#[derive(Debug, Clone)]
pub struct Filler {
    data: Bytes,
    chunk_bytes: usize,
    interval: Duration,
}

impl Filler {
    /// Load filler content from disk
    pub async fn load(path: &Path, chunk_bytes: usize, interval: Duration) -> Result<Self> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            Error::FillerUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let filler = Self::from_bytes(data, chunk_bytes, interval)?;
        info!(
            "Loaded filler from {} ({} bytes, {} byte chunks every {:?})",
            path.display(),
            filler.data.len(),
            filler.chunk_bytes,
            filler.interval
        );
        Ok(filler)
    }

    pub fn from_bytes(data: impl Into<Bytes>, chunk_bytes: usize, interval: Duration) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::FillerUnavailable("filler content is empty".to_string()));
        }
        if chunk_bytes == 0 || interval.is_zero() {
            return Err(Error::FillerUnavailable(
                "filler chunk size and interval must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            data,
            chunk_bytes,
            interval,
        })
    }

    /// Begin a fresh cyclic emission from the start of the buffer
    pub fn start(&self) -> FillerSource {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        FillerSource {
            data: self.data.clone(),
            offset: 0,
            chunk_bytes: self.chunk_bytes,
            ticker,
        }
    }
}

/// Running filler emission; never ends
pub struct FillerSource {
    data: Bytes,
    offset: usize,
    chunk_bytes: usize,
    ticker: Interval,
}

impl FillerSource {
    /// Next slice, one per tick; the first tick is immediate
    pub async fn next_signal(&mut self) -> Option<SourceSignal> {
        self.ticker.tick().await;

        let end = (self.offset + self.chunk_bytes).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = if end >= self.data.len() { 0 } else { end };

        Some(SourceSignal::Chunk(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_chunk(source: &mut FillerSource) -> Bytes {
        match source.next_signal().await {
            Some(SourceSignal::Chunk(chunk)) => chunk,
            other => panic!("Filler produced {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_filler_cycles_over_buffer() {
        let filler = Filler::from_bytes(&b"abcdefg"[..], 3, Duration::from_millis(1)).unwrap();
        let mut source = filler.start();

        let mut chunks = Vec::new();
        for _ in 0..5 {
            chunks.push(next_chunk(&mut source).await);
        }

        assert_eq!(
            chunks,
            vec![
                Bytes::from("abc"),
                Bytes::from("def"),
                Bytes::from("g"),
                Bytes::from("abc"),
                Bytes::from("def"),
            ]
        );
    }

    #[tokio::test]
    async fn test_filler_restart_begins_at_start() {
        let filler = Filler::from_bytes(&b"xyz"[..], 2, Duration::from_millis(1)).unwrap();

        let mut first = filler.start();
        next_chunk(&mut first).await;
        drop(first);

        let mut second = filler.start();
        assert_eq!(next_chunk(&mut second).await, Bytes::from("xy"));
    }

    #[tokio::test]
    async fn test_filler_is_paced() {
        let filler = Filler::from_bytes(&b"abcd"[..], 1, Duration::from_millis(20)).unwrap();
        let mut source = filler.start();

        let started = tokio::time::Instant::now();
        for _ in 0..4 {
            next_chunk(&mut source).await;
        }
        // First tick is immediate, the remaining three wait one interval each
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_empty_filler_is_unavailable() {
        let err = Filler::from_bytes(Vec::<u8>::new(), 1024, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, Error::FillerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_filler_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = Filler::load(&dir.path().join("static.mp3"), 1024, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FillerUnavailable(_)));
    }
}
