//! Drain loop: take the next pending job, run the processor, retire it, repeat.
//!
//! Exactly one worker runs per queue. It owns the busy flag from the moment
//! it is claimed until `begin_next` finds nothing left to do.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, info, warn};

use crate::error::Error;
use crate::model::{Job, JobStatus};
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

use super::queue::{MissingProcessorPolicy, Shared};

/// Error detail for a job whose processor returned without marking it.
const UNMARKED_JOB: &str = "processor returned without marking the job";

pub(super) async fn run<P: Send + Sync + 'static>(shared: Arc<Shared<P>>) {
    while let Some(job) = shared.begin_next() {
        let span = start_job_span(job.key(), &job.id().0);
        let start = Instant::now();

        async {
            record_state_transition(&span, JobStatus::Pending, JobStatus::Processing);
            info!(job_id = %job.id(), key = %job.key(), "processing job");

            if let Err(message) = invoke(&shared, &job).await {
                warn!(job_id = %job.id(), key = %job.key(), error = %message, "job failed");
                metrics::job_failures().add(1, &[]);
                job.mark_error(message);
            }

            // A retired job must not stay Processing, or the next one would overlap it.
            if !job.status().is_terminal() {
                warn!(job_id = %job.id(), key = %job.key(), "processor returned without marking the job");
                metrics::job_failures().add(1, &[]);
                job.mark_error(UNMARKED_JOB);
            }

            let duration_ms = start.elapsed().as_millis() as u64;
            let status = job.status();
            record_state_transition(&span, JobStatus::Processing, status);
            metrics::job_duration_ms().record(
                duration_ms as f64,
                &[KeyValue::new("status", status.to_string())],
            );
            info!(job_id = %job.id(), %status, duration_ms, "job finished");

            shared.finish(&job, duration_ms);
        }
        .instrument(span.clone())
        .await;
    }
}

/// Run the processor for one job, folding every kind of failure into a
/// message.
async fn invoke<P: Send + Sync + 'static>(
    shared: &Shared<P>,
    job: &Job<P>,
) -> std::result::Result<(), String> {
    let Some(processor) = shared.processor() else {
        return match shared.config.missing_processor {
            MissingProcessorPolicy::Stall => {
                warn!(job_id = %job.id(), "no processor installed, job will not progress");
                std::future::pending().await
            }
            MissingProcessorPolicy::Fail => Err(Error::MissingProcessor.to_string()),
        };
    };

    // A separate task so a panicking processor cannot take the worker down.
    let task = {
        let job = job.clone();
        shared
            .runtime
            .spawn(async move { processor.process(job).await })
    };

    match task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(e) if e.is_panic() => Err(panic_message(e.into_panic())),
        Err(e) => Err(e.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("processor panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("processor panicked: {s}")
    } else {
        "processor panicked".to_string()
    }
}
