//! Core data model.
//!
//! A job is one unit of submitted work. It has identity (the dedup key),
//! an opaque payload for the processor, and a lifecycle status that the
//! processor and the queue worker update in place.

pub mod transcription;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::lock;

pub use transcription::TranscriptionRequest;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of work tracked by the queue.
///
/// `Job` is a cheap handle: clones share the same status cell, so the
/// processor, the worker, and any presentation layer all observe the same
/// state.
pub struct Job<P> {
    inner: Arc<JobInner<P>>,
}

struct JobInner<P> {
    id: JobId,
    key: String,
    payload: P,
    enqueued_at: DateTime<Utc>,
    state: Mutex<JobState>,
}

#[derive(Debug, Clone, Default)]
struct JobState {
    status: JobStatus,
    error: Option<String>,
}

impl<P> Clone for Job<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> std::fmt::Debug for Job<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("status", &state.status)
            .field("error", &state.error)
            .finish_non_exhaustive()
    }
}

impl<P> Job<P> {
    pub(crate) fn new(key: impl Into<String>, payload: P) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: JobId::new(),
                key: key.into(),
                payload,
                enqueued_at: Utc::now(),
                state: Mutex::new(JobState::default()),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// The identity key used for deduplication.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Caller-defined payload. The queue never looks inside.
    pub fn payload(&self) -> &P {
        &self.inner.payload
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.inner.enqueued_at
    }

    pub fn status(&self) -> JobStatus {
        lock(&self.inner.state).status
    }

    /// Error detail. Only present while the status is [`JobStatus::Error`].
    pub fn error(&self) -> Option<String> {
        lock(&self.inner.state).error.clone()
    }

    /// Signal successful completion. Last write wins against [`Job::mark_error`].
    pub fn mark_done(&self) {
        self.transition(JobStatus::Done, None);
    }

    /// Signal failure with a human-readable message.
    pub fn mark_error(&self, message: impl Into<String>) {
        self.transition(JobStatus::Error, Some(message.into()));
    }

    /// Pending -> Processing. Only the queue worker does this.
    pub(crate) fn start(&self) -> bool {
        self.transition(JobStatus::Processing, None)
    }

    /// Point-in-time copy for presentation.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = lock(&self.inner.state);
        JobSnapshot {
            id: self.inner.id,
            key: self.inner.key.clone(),
            status: state.status,
            error: state.error.clone(),
            enqueued_at: self.inner.enqueued_at,
        }
    }

    /// Whether two handles refer to the same job.
    pub fn same_job(&self, other: &Job<P>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn transition(&self, to: JobStatus, error: Option<String>) -> bool {
        let mut state = lock(&self.inner.state);
        if !state.status.can_transition_to(to) {
            tracing::warn!(
                job_id = %self.inner.id,
                key = %self.inner.key,
                from = %state.status,
                %to,
                "ignoring invalid job transition"
            );
            return false;
        }
        state.status = to;
        state.error = error;
        true
    }
}

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        f.pad(&self.0.to_string()[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for the worker.
    #[default]
    Pending,
    /// Handed to the processor.
    Processing,
    /// Processor reported success. Terminal.
    Done,
    /// Processor reported or raised a failure. Terminal.
    Error,
}

impl JobStatus {
    /// Can transition from self to `to`?
    ///
    /// Done and Error may overwrite each other so that the last mark before
    /// cleanup wins.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Done)
                | (Processing, Error)
                | (Done, Done)
                | (Done, Error)
                | (Error, Error)
                | (Error, Done)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        };
        f.pad(s)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Serializable view of a job, for presentation collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub key: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}
