//! # OnAir Common Library
//!
//! Shared code for the OnAir broadcast services:
//! - Error type for configuration loading
//! - Event types (OnAirEvent enum) published on the SSE bus
//! - Station configuration file loading and resolution

pub mod config;
pub mod error;
pub mod events;

pub use config::StationConfig;
pub use error::{Error, Result};
pub use events::{OnAirEvent, PlaybackState};
