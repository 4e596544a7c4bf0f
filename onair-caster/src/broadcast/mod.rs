//! Live broadcast fan-out
//!
//! - `hub`: replay buffer plus listener set, one chunk order for everyone
//! - `listener`: per-listener sinks, bounded outboxes and subscriptions
//! - `replay`: recent-chunk ring used to warm up new listeners

pub mod hub;
pub mod listener;
pub mod replay;

pub use hub::BroadcastHub;
pub use listener::{ListenerId, ListenerInfo, ListenerSink, ListenerWriteError, Outbox, Subscription};
pub use replay::ReplayBuffer;
