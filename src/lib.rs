//! # transcription-queue
//!
//! Single-worker job queue for image transcription.
//!
//! Jobs are keyed by file path, deduplicated while outstanding, and handed
//! one at a time, in FIFO order, to a caller-supplied [`Processor`]. The
//! crate also carries the settings layer, OpenTelemetry setup, and a
//! hook-based processor used by the `transcriber` binary.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod processor;
mod sync;
pub mod telemetry;

pub use engine::{Enqueued, MissingProcessorPolicy, Queue, QueueConfig, TranscriptionQueue};
pub use error::{Error, Result};
pub use model::{Job, JobId, JobSnapshot, JobStatus};
pub use processor::{Processor, processor_fn};
