//! Test helper modules for onair-caster integration tests
//!
//! - TestStation: engine started from a temp directory with a real filler file
//! - track and chunk helpers for recognizable audio payloads

#![allow(dead_code)]

pub mod test_station;

pub use test_station::{drain, recv, recv_non_filler, TestStation, CHUNK, FILLER_BYTE};
