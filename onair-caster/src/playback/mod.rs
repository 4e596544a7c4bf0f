//! Program production: queue, sources and the scheduler that drives them

pub mod engine;
pub mod filler;
pub mod probe;
pub mod queue;
pub mod scheduler;
pub mod source;

pub use engine::{BroadcastEngine, Placement};
pub use queue::{PlayQueue, QueueItem, QueueSnapshot};
pub use scheduler::Scheduler;
