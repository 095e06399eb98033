//! Processor contract: the caller-supplied work performed for each job.
//!
//! The queue hands a [`Job`] handle to the processor and awaits the result.
//! A processor signals success by marking the job done before returning;
//! returning an error (or panicking) marks the job as failed regardless of
//! what it set.

pub mod hook;

use std::future::Future;

use async_trait::async_trait;

use crate::model::Job;

pub use hook::HookProcessor;

/// Performs the actual work for a job.
#[async_trait]
pub trait Processor<P>: Send + Sync {
    /// Process one job. Call [`Job::mark_done`] or [`Job::mark_error`] to
    /// record the outcome before returning `Ok`.
    async fn process(&self, job: Job<P>) -> anyhow::Result<()>;
}

/// A processor backed by an async closure.
pub struct FnProcessor<F> {
    f: F,
}

/// Wrap an async closure as a [`Processor`].
///
/// ```no_run
/// use transcription_queue::{Queue, processor_fn};
///
/// # async fn demo() -> transcription_queue::Result<()> {
/// let queue: Queue<String> = Queue::new()?;
/// queue.set_processor(processor_fn(|job: transcription_queue::Job<String>| async move {
///     println!("working on {}", job.payload());
///     job.mark_done();
///     Ok(())
/// }));
/// # Ok(())
/// # }
/// ```
pub fn processor_fn<P, F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(Job<P>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnProcessor { f }
}

#[async_trait]
impl<P, F, Fut> Processor<P> for FnProcessor<F>
where
    P: Send + Sync + 'static,
    F: Fn(Job<P>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn process(&self, job: Job<P>) -> anyhow::Result<()> {
        (self.f)(job).await
    }
}
