//! # OnAir Caster (onair-caster)
//!
//! Single-program audio broadcast engine. Queued files play one after another;
//! when the queue is empty a filler loop keeps the program continuous. Every
//! listener receives the same byte stream, starting with a short replay of
//! recent audio.
//!
//! **Architecture:** one scheduler task produces chunks into a broadcast hub;
//! each listener drains its own bounded outbox over HTTP (axum).

pub mod api;
pub mod broadcast;
pub mod error;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
pub use playback::BroadcastEngine;
pub use state::SharedState;
