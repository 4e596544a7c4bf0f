//! Error types for onair-caster
//!
//! Caller-facing and fatal errors live in [`Error`]. Faults that are contained
//! inside the engine have their own small enums next to the code that handles
//! them: `SourceError` (scheduler skips the source) and `ListenerWriteError`
//! (hub drops the session).

use thiserror::Error;

pub use crate::broadcast::listener::ListenerWriteError;
pub use crate::playback::source::SourceError;

/// Main error type for onair-caster
#[derive(Error, Debug)]
pub enum Error {
    /// File offered for ingestion cannot be queued; queue is unaffected
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Dequeue on an empty queue
    #[error("Queue is empty")]
    EmptyQueue,

    /// Queue index outside the current queue
    #[error("Queue index {index} out of range (queue length {len})")]
    OutOfRange { index: usize, len: usize },

    /// No usable filler source; the station cannot guarantee continuous output
    #[error("Filler unavailable: {0}")]
    FillerUnavailable(String),

    /// Listener could not be registered
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerWriteError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] onair_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),
}

/// Convenience Result type using onair-caster Error
pub type Result<T> = std::result::Result<T, Error>;
