//! HTTP interface
//!
//! Audio stream, queue administration, status and SSE events.

pub mod handlers;
pub mod server;
pub mod sse;
pub mod stream;

pub use server::{create_router, run, AppContext, StationInfo};
