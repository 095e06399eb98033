//! Metric instruments for the job queue.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("transcription-queue")
}

/// Counter: submissions.
/// Labels: `result` ("ok" | "duplicate").
pub fn jobs_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("transcriber.jobs.enqueued")
        .with_description("Number of jobs submitted to the queue")
        .build()
}

/// Counter: job status transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("transcriber.jobs.state_transitions")
        .with_description("Number of job status transitions")
        .build()
}

/// Counter: processor failures (errors, panics, missing processor).
pub fn job_failures() -> Counter<u64> {
    meter()
        .u64_counter("transcriber.jobs.failures")
        .with_description("Number of jobs failed by the queue boundary")
        .build()
}

/// Histogram: time spent in the processor, in milliseconds.
/// Labels: `status`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("transcriber.job.duration_ms")
        .with_description("Processor duration per job")
        .with_unit("ms")
        .build()
}
