//! Source reader
//!
//! Turns one source descriptor (a queued file or the filler) into an ordered
//! sequence of [`SourceSignal`]s. A reader yields any number of chunks and then
//! exactly one terminal signal; after that `next_signal` returns `None`
//! without touching I/O, so a consumer cannot observe two endings.
//!
//! File end is detected by a zero-length read. A probed duration only arms a
//! safety deadline; when both race, whichever the reader sees first becomes
//! the single terminal signal.

use crate::playback::filler::{Filler, FillerSource};
use crate::playback::probe::{self, DurationProbe};
use bytes::Bytes;
use onair_common::StationConfig;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Lowest byte rate a duration estimate may imply (8 kbps); anything slower
/// is treated as a bogus estimate and the fallback bitrate is used
const MIN_ESTIMATED_BYTES_PER_SEC: f64 = 1000.0;

/// Longest a paced chunk may be held back
const MAX_PACING_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Source could not be opened or read
///
/// Contained by the scheduler: logged, then playback advances.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            SourceError::Missing(path.to_path_buf())
        } else {
            SourceError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Why a source ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Reader hit end of data
    EndOfData,
    /// Duration-derived deadline elapsed before end of data
    SafetyTimeout,
}

/// One step of a source
#[derive(Debug)]
pub enum SourceSignal {
    Chunk(Bytes),
    Ended(EndReason),
    Failed(SourceError),
}

/// Which kind of source is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Queued,
    Filler,
}

/// Real-time pacing parameters for file sources
#[derive(Debug, Clone, Copy)]
pub struct PacingOptions {
    pub fallback_bitrate_kbps: u32,
    pub lead: Duration,
}

/// Safety deadline parameters for file sources
#[derive(Debug, Clone, Copy)]
pub struct SafetyOptions {
    pub factor: f64,
    pub grace: Duration,
}

impl SafetyOptions {
    /// Deadline length for a file with the given estimated duration
    ///
    /// `None` when the result does not fit in a `Duration`.
    pub fn deadline_after(&self, estimate: Duration) -> Option<Duration> {
        Duration::try_from_secs_f64(estimate.as_secs_f64() * self.factor)
            .ok()?
            .checked_add(self.grace)
    }
}

/// Settings shared by every file source
#[derive(Debug, Clone, Copy)]
pub struct FileSourceOptions {
    pub chunk_bytes: usize,
    pub pacing: Option<PacingOptions>,
    pub safety: Option<SafetyOptions>,
}

impl FileSourceOptions {
    pub fn from_config(config: &StationConfig) -> Self {
        Self {
            chunk_bytes: config.chunk_bytes,
            pacing: config.pacing.enabled.then(|| PacingOptions {
                fallback_bitrate_kbps: config.pacing.fallback_bitrate_kbps,
                lead: config.pacing_lead(),
            }),
            safety: Some(SafetyOptions {
                factor: config.safety.factor,
                grace: config.safety_grace(),
            }),
        }
    }

    /// Read as fast as the consumer pulls, no deadline
    pub fn unpaced(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes,
            pacing: None,
            safety: None,
        }
    }
}

/// Emits bytes no faster than a fixed byte rate, after an initial lead
#[derive(Debug, Clone)]
pub struct Pacer {
    bytes_per_sec: f64,
    lead: Duration,
    started: Instant,
}

impl Pacer {
    pub fn new(bytes_per_sec: f64, lead: Duration) -> Self {
        Self {
            bytes_per_sec: bytes_per_sec.max(1.0),
            lead,
            started: Instant::now(),
        }
    }

    /// Rate from the file's own length and duration, or the fallback bitrate
    pub fn for_file(file_len: u64, estimate: Option<Duration>, options: &PacingOptions) -> Self {
        let fallback = options.fallback_bitrate_kbps as f64 * 1000.0 / 8.0;
        let bytes_per_sec = match estimate {
            Some(duration) if !duration.is_zero() && file_len > 0 => {
                let rate = file_len as f64 / duration.as_secs_f64();
                if rate >= MIN_ESTIMATED_BYTES_PER_SEC {
                    rate
                } else {
                    debug!("Estimate {:?} implies {:.3} B/s; using fallback bitrate", duration, rate);
                    fallback
                }
            }
            _ => fallback,
        };
        Self::new(bytes_per_sec, options.lead)
    }

    /// Instant at which the byte at offset `bytes_sent` may go out
    pub fn due(&self, bytes_sent: u64) -> Instant {
        let playtime = Duration::try_from_secs_f64(bytes_sent as f64 / self.bytes_per_sec)
            .unwrap_or(Duration::MAX);
        self.started + playtime.saturating_sub(self.lead).min(MAX_PACING_WAIT)
    }

    pub fn bytes_per_sec(&self) -> f64 {
        self.bytes_per_sec
    }
}

/// Queued file opened for broadcast
pub struct FileSource {
    path: PathBuf,
    /// `None` once a terminal signal has been returned
    file: Option<File>,
    chunk_bytes: usize,
    pacer: Option<Pacer>,
    deadline: Option<Instant>,
    bytes_read: u64,
}

impl FileSource {
    /// Open a file; `estimate` comes from the duration probe, if any
    pub async fn open(
        path: &Path,
        options: &FileSourceOptions,
        estimate: Option<Duration>,
    ) -> Result<Self, SourceError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SourceError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(SourceError::Read {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }

        let file = File::open(path)
            .await
            .map_err(|e| SourceError::from_io(path, e))?;

        let pacer = options
            .pacing
            .as_ref()
            .map(|pacing| Pacer::for_file(metadata.len(), estimate, pacing));
        let deadline = match (options.safety, estimate) {
            (Some(safety), Some(estimate)) => {
                let deadline = safety
                    .deadline_after(estimate)
                    .and_then(|after| Instant::now().checked_add(after));
                if deadline.is_none() {
                    warn!(
                        "Estimate {:?} for {} is out of range; no safety deadline",
                        estimate,
                        path.display()
                    );
                }
                deadline
            }
            _ => None,
        };

        debug!(
            "Opened {} ({} bytes, estimate {:?}, pacing {:?} B/s)",
            path.display(),
            metadata.len(),
            estimate,
            pacer.as_ref().map(|p| p.bytes_per_sec() as u64)
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            chunk_bytes: options.chunk_bytes.max(1),
            pacer,
            deadline,
            bytes_read: 0,
        })
    }

    pub async fn next_signal(&mut self) -> Option<SourceSignal> {
        let file = self.file.as_mut()?;
        let pacer = self.pacer.as_ref();
        let bytes_read = self.bytes_read;
        let chunk_bytes = self.chunk_bytes;

        let step = async move {
            if let Some(pacer) = pacer {
                tokio::time::sleep_until(pacer.due(bytes_read)).await;
            }
            read_chunk(file, chunk_bytes).await
        };

        let outcome = match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, step).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "Safety timeout for {} after {} bytes; end of data never arrived",
                        self.path.display(),
                        self.bytes_read
                    );
                    self.file = None;
                    return Some(SourceSignal::Ended(EndReason::SafetyTimeout));
                }
            },
            None => step.await,
        };

        match outcome {
            Ok(chunk) if chunk.is_empty() => {
                self.file = None;
                Some(SourceSignal::Ended(EndReason::EndOfData))
            }
            Ok(chunk) => {
                self.bytes_read += chunk.len() as u64;
                Some(SourceSignal::Chunk(chunk))
            }
            Err(e) => {
                self.file = None;
                Some(SourceSignal::Failed(SourceError::from_io(&self.path, e)))
            }
        }
    }
}

/// Fill up to `chunk_bytes`; an empty result means end of data
async fn read_chunk(file: &mut File, chunk_bytes: usize) -> io::Result<Bytes> {
    let mut buf = vec![0u8; chunk_bytes];
    let mut filled = 0;
    while filled < chunk_bytes {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

/// The one open source, file or filler
pub enum SourceReader {
    File(FileSource),
    Filler(FillerSource),
}

impl SourceReader {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceReader::File(_) => SourceKind::Queued,
            SourceReader::Filler(_) => SourceKind::Filler,
        }
    }

    pub async fn next_signal(&mut self) -> Option<SourceSignal> {
        match self {
            SourceReader::File(source) => source.next_signal().await,
            SourceReader::Filler(source) => source.next_signal().await,
        }
    }
}

/// Opens source descriptors with the station's filler, probe and file options
#[derive(Clone)]
pub struct SourceOpener {
    filler: Filler,
    probe: Arc<dyn DurationProbe>,
    options: FileSourceOptions,
}

impl SourceOpener {
    pub fn new(filler: Filler, probe: Arc<dyn DurationProbe>, options: FileSourceOptions) -> Self {
        Self {
            filler,
            probe,
            options,
        }
    }

    /// Filler never fails to open; it was loaded at start-up
    pub fn open_filler(&self) -> SourceReader {
        SourceReader::Filler(self.filler.start())
    }

    /// Probe and open a queued file
    pub async fn open_file(&self, path: &Path) -> Result<SourceReader, SourceError> {
        let estimate = if self.options.safety.is_some() || self.options.pacing.is_some() {
            probe::estimate_duration(Arc::clone(&self.probe), path.to_path_buf()).await
        } else {
            None
        };
        let source = FileSource::open(path, &self.options, estimate).await?;
        Ok(SourceReader::File(source))
    }
}
