//! Structured events emitted by the queue on every lifecycle step.
//!
//! Presentation collaborators can subscribe to render progress without
//! polling. Events are best-effort: a lagging subscriber misses events but
//! never slows the worker down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{JobId, JobStatus};

/// A structured event emitted by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    JobEnqueued {
        id: JobId,
        key: String,
    },
    /// Submission dropped because the key is already outstanding.
    JobDeduplicated {
        key: String,
        outstanding_id: JobId,
    },
    JobStarted {
        id: JobId,
        key: String,
    },
    JobFinished {
        id: JobId,
        key: String,
        status: JobStatus,
        error: Option<String>,
        duration_ms: u64,
    },
    /// Worker found nothing pending and went idle.
    QueueIdle,
}
