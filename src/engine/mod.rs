//! Queue engine: job intake, deduplication, and the single-worker drain loop.

pub mod queue;
mod worker;

pub use queue::{Enqueued, MissingProcessorPolicy, Queue, QueueConfig, TranscriptionQueue};
