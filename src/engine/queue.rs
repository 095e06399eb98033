//! The job queue. The public API for submitting and observing work.
//!
//! The queue owns the active job list, the processing slot, and the busy
//! flag. All of them live behind one short-lived lock; the processor is
//! never called while it is held.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::error::Result;
use crate::event::{EventKind, QueueEvent};
use crate::model::{Job, JobSnapshot, JobStatus, TranscriptionRequest};
use crate::processor::Processor;
use crate::sync::lock;
use crate::telemetry::metrics;

use super::worker;

/// What the queue does when the worker picks up a job and no processor has
/// been installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingProcessorPolicy {
    /// The job stays `Processing` forever and the queue stays busy.
    #[default]
    Stall,
    /// The job is marked `Error` and the worker moves on.
    Fail,
}

/// Configuration for a queue instance.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub missing_processor: MissingProcessorPolicy,
    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            missing_processor: MissingProcessorPolicy::default(),
            event_capacity: 256,
        }
    }
}

/// What happened when a job was submitted.
#[derive(Debug)]
pub enum Enqueued<P> {
    /// New job appended to the tail of the queue.
    Accepted(Job<P>),
    /// A job with the same key is still in the queue; nothing was added.
    Duplicate(Job<P>),
}

impl<P> Enqueued<P> {
    /// The job now responsible for the key, new or existing.
    pub fn job(&self) -> &Job<P> {
        match self {
            Enqueued::Accepted(job) | Enqueued::Duplicate(job) => job,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Enqueued::Accepted(_))
    }
}

/// A single-worker FIFO job queue.
///
/// Cloning the queue clones a handle; all clones share the same jobs and
/// worker.
pub struct Queue<P> {
    shared: Arc<Shared<P>>,
}

/// Queue used by the transcription pipeline, keyed by image path.
pub type TranscriptionQueue = Queue<TranscriptionRequest>;

pub(super) struct Shared<P> {
    state: Mutex<QueueState<P>>,
    processor: Mutex<Option<Arc<dyn Processor<P>>>>,
    pub(super) config: QueueConfig,
    pub(super) runtime: Handle,
    events: broadcast::Sender<QueueEvent>,
    seq: AtomicU64,
    busy: watch::Sender<bool>,
}

struct QueueState<P> {
    /// Active jobs in submission order, including the one being processed.
    jobs: VecDeque<Job<P>>,
    processing: Option<Job<P>>,
    busy: bool,
}

impl<P> Clone for Queue<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P> std::fmt::Debug for Queue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("Queue")
            .field("jobs", &state.jobs.len())
            .field("busy", &state.busy)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<P: Send + Sync + 'static> Queue<P> {
    /// Create a queue on the current tokio runtime with default settings.
    ///
    /// # Errors
    /// Returns [`crate::Error::NoRuntime`] when called outside a runtime.
    pub fn new() -> Result<Self> {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`crate::Error::NoRuntime`] when called outside a runtime.
    pub fn with_config(config: QueueConfig) -> Result<Self> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Create a queue whose worker is spawned on the given runtime.
    pub fn with_runtime(config: QueueConfig, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (busy, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    processing: None,
                    busy: false,
                }),
                processor: Mutex::new(None),
                config,
                runtime,
                events,
                seq: AtomicU64::new(0),
                busy,
            }),
        }
    }

    /// Install the processor. Last write wins.
    pub fn set_processor(&self, processor: impl Processor<P> + 'static) {
        self.set_shared_processor(Arc::new(processor));
    }

    /// Install an already shared processor. Last write wins.
    pub fn set_shared_processor(&self, processor: Arc<dyn Processor<P>>) {
        *lock(&self.shared.processor) = Some(processor);
    }

    /// Submit a job.
    ///
    /// If a job with the same key is still pending or processing this is a
    /// no-op and the existing job is returned. A job already marked done or
    /// failed no longer blocks its key, even before the worker retires it. Otherwise the job goes to the tail and
    /// the worker is started if the queue was idle. Never blocks on the
    /// processor and never fails.
    pub fn enqueue(&self, key: impl Into<String>, payload: P) -> Enqueued<P> {
        let key = key.into();
        let mut state = lock(&self.shared.state);

        if let Some(existing) = state
            .jobs
            .iter()
            .find(|job| job.key() == key && !job.status().is_terminal())
        {
            let existing = existing.clone();
            debug!(key = %key, outstanding = %existing.id(), "duplicate submission dropped");
            metrics::jobs_enqueued().add(1, &[KeyValue::new("result", "duplicate")]);
            self.shared.emit(EventKind::JobDeduplicated {
                key,
                outstanding_id: existing.id(),
            });
            return Enqueued::Duplicate(existing);
        }

        let job = Job::new(key, payload);
        state.jobs.push_back(job.clone());
        debug!(
            job_id = %job.id(),
            key = %job.key(),
            queued = state.jobs.len(),
            "job enqueued"
        );
        metrics::jobs_enqueued().add(1, &[KeyValue::new("result", "ok")]);
        self.shared.emit(EventKind::JobEnqueued {
            id: job.id(),
            key: job.key().to_string(),
        });

        let start_worker = Shared::claim(&self.shared, &mut state);
        drop(state);

        if start_worker {
            self.shared
                .runtime
                .spawn(worker::run(Arc::clone(&self.shared)));
        }

        Enqueued::Accepted(job)
    }

    /// Drain the queue on the calling task.
    ///
    /// Returns immediately if the worker is already running; otherwise
    /// processes pending jobs one at a time until none are left.
    pub async fn process_next(&self) {
        let claimed = {
            let mut state = lock(&self.shared.state);
            Shared::claim(&self.shared, &mut state)
        };
        if claimed {
            worker::run(Arc::clone(&self.shared)).await;
        }
    }

    /// Mark a job as successfully completed.
    ///
    /// The job stays in the queue until the worker finishes with it.
    pub fn mark_as_done(&self, job: &Job<P>) {
        job.mark_done();
    }

    /// Mark a job as failed.
    ///
    /// The job stays in the queue until the worker finishes with it.
    pub fn mark_as_error(&self, job: &Job<P>, message: impl Into<String>) {
        job.mark_error(message);
    }

    /// Active jobs, oldest first.
    pub fn jobs(&self) -> Vec<Job<P>> {
        lock(&self.shared.state).jobs.iter().cloned().collect()
    }

    /// Serializable view of the active jobs, oldest first.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        lock(&self.shared.state)
            .jobs
            .iter()
            .map(Job::snapshot)
            .collect()
    }

    /// Look up an active job by key, newest first.
    pub fn get(&self, key: &str) -> Option<Job<P>> {
        lock(&self.shared.state)
            .jobs
            .iter()
            .rev()
            .find(|job| job.key() == key)
            .cloned()
    }

    /// The job currently handed to the processor, if any.
    pub fn processing(&self) -> Option<Job<P>> {
        lock(&self.shared.state).processing.clone()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.shared.state).busy
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.state).jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to lifecycle events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until the worker has drained every pending job.
    ///
    /// Never resolves while a job is stalled for lack of a processor.
    pub async fn wait_idle(&self) {
        let mut busy = self.shared.busy.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = busy.wait_for(|busy| !*busy).await;
    }
}

impl Queue<TranscriptionRequest> {
    /// Queue an image for transcription, keyed by its path.
    pub fn add_to_queue(
        &self,
        file: impl Into<PathBuf>,
        original_parent_path: impl Into<PathBuf>,
    ) -> Enqueued<TranscriptionRequest> {
        let request = TranscriptionRequest::new(file, original_parent_path);
        self.enqueue(request.key(), request)
    }
}

impl<P> Shared<P> {
    /// Set the busy flag if it was clear. Returns whether the caller now owns
    /// the worker role.
    fn claim(shared: &Shared<P>, state: &mut QueueState<P>) -> bool {
        if state.busy {
            return false;
        }
        state.busy = true;
        shared.busy.send_replace(true);
        true
    }

    /// Select the first pending job and hand it the processing slot.
    ///
    /// When nothing is pending, clears the busy flag and returns `None`; the
    /// worker must exit.
    pub(super) fn begin_next(&self) -> Option<Job<P>> {
        let mut state = lock(&self.state);
        let next = state
            .jobs
            .iter()
            .find(|job| job.status() == JobStatus::Pending)
            .cloned();

        match next {
            Some(job) => {
                job.start();
                state.processing = Some(job.clone());
                self.emit(EventKind::JobStarted {
                    id: job.id(),
                    key: job.key().to_string(),
                });
                Some(job)
            }
            None => {
                state.processing = None;
                state.busy = false;
                self.emit(EventKind::QueueIdle);
                self.busy.send_replace(false);
                None
            }
        }
    }

    /// Drop a settled job from the active set and clear the processing slot.
    pub(super) fn finish(&self, job: &Job<P>, duration_ms: u64) {
        let mut state = lock(&self.state);
        state.jobs.retain(|active| !active.same_job(job));
        state.processing = None;
        self.emit(EventKind::JobFinished {
            id: job.id(),
            key: job.key().to_string(),
            status: job.status(),
            error: job.error(),
            duration_ms,
        });
    }

    pub(super) fn processor(&self) -> Option<Arc<dyn Processor<P>>> {
        lock(&self.processor).clone()
    }

    fn emit(&self, kind: EventKind) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is fine.
        let _ = self.events.send(QueueEvent {
            seq,
            timestamp: Utc::now(),
            kind,
        });
    }
}
