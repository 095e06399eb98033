//! Job execution span helpers.

use opentelemetry::KeyValue;
use tracing::Span;
use uuid::Uuid;

use super::metrics;
use crate::model::JobStatus;

/// Start a span covering one processor invocation.
pub fn start_job_span(key: &str, job_id: &Uuid) -> Span {
    tracing::info_span!(
        "job.process",
        "job.key" = key,
        "job.id" = %job_id,
    )
}

/// Record a status transition on the span and in the transition counter.
pub fn record_state_transition(span: &Span, from: JobStatus, to: JobStatus) {
    metrics::job_state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.to_string()),
            KeyValue::new("to", to.to_string()),
        ],
    );
    span.in_scope(|| {
        tracing::info!(%from, %to, "state_transition");
    });
}
