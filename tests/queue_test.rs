//! Integration tests for the job queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use transcription_queue::event::EventKind;
use transcription_queue::{
    Enqueued, Error, Job, JobStatus, MissingProcessorPolicy, Queue, QueueConfig, TranscriptionQueue,
    processor_fn,
};

async fn drained<P: Send + Sync + 'static>(queue: &Queue<P>) {
    tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
        .await
        .expect("queue did not drain");
}

/// Poll until `job` reaches `status`.
async fn reaches<P>(job: &Job<P>, status: JobStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while job.status() != status {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job never reached expected status");
}

/// Records the order jobs were processed in and the peak concurrency.
#[derive(Clone, Default)]
struct Recorder {
    order: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Recorder {
    fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    fn enter(&self, key: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.order.lock().unwrap().push(key.to_string());
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Install a processor that marks every job done, optionally waiting for a
/// permit on `gate` before finishing.
fn install_recorder(queue: &Queue<()>, recorder: &Recorder, gate: Option<Arc<Semaphore>>) {
    let recorder = recorder.clone();
    queue.set_processor(processor_fn(move |job: Job<()>| {
        let recorder = recorder.clone();
        let gate = gate.clone();
        async move {
            recorder.enter(job.key());
            if let Some(gate) = gate {
                gate.acquire().await?.forget();
            } else {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            job.mark_done();
            recorder.exit();
            Ok(())
        }
    }));
}

// ---------------------------------------------------------------------------
// Ordering and single flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn distinct_keys_complete_in_fifo_order_one_at_a_time() {
    let queue: Queue<()> = Queue::new().unwrap();
    let recorder = Recorder::default();
    install_recorder(&queue, &recorder, None);

    let keys = ["a", "b", "c", "d", "e"];
    let jobs: Vec<_> = keys
        .iter()
        .map(|key| match queue.enqueue(*key, ()) {
            Enqueued::Accepted(job) => job,
            Enqueued::Duplicate(_) => panic!("distinct key deduplicated"),
        })
        .collect();

    drained(&queue).await;

    assert_eq!(recorder.order(), keys);
    assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(jobs.iter().all(|job| job.status() == JobStatus::Done));
    assert!(queue.is_empty());
    assert!(!queue.is_busy());
    assert!(queue.processing().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_thread_runtime_never_overlaps_jobs() {
    let queue: Queue<()> = Queue::new().unwrap();
    let recorder = Recorder::default();
    install_recorder(&queue, &recorder, None);

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let queue = queue.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    queue.enqueue(format!("{t}-{i}"), ());
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await.unwrap();
    }

    drained(&queue).await;
    assert_eq!(recorder.order().len(), 40);
    assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_key_is_dropped_while_outstanding() {
    let queue: Queue<()> = Queue::new().unwrap();
    let recorder = Recorder::default();
    let gate = Arc::new(Semaphore::new(0));
    install_recorder(&queue, &recorder, Some(Arc::clone(&gate)));

    let first = queue.enqueue("a", ());
    let second = queue.enqueue("b", ());
    let again = queue.enqueue("a", ());

    assert!(first.is_accepted());
    assert!(second.is_accepted());
    match &again {
        Enqueued::Duplicate(existing) => assert!(existing.same_job(first.job())),
        Enqueued::Accepted(_) => panic!("expected Duplicate, got Accepted"),
    }

    let keys: Vec<_> = queue.snapshot().into_iter().map(|s| s.key).collect();
    assert_eq!(keys, ["a", "b"]);

    gate.add_permits(2);
    drained(&queue).await;

    assert_eq!(recorder.order(), ["a", "b"]);
}

#[tokio::test]
async fn duplicate_of_processing_job_is_dropped() {
    let queue: Queue<()> = Queue::new().unwrap();
    let recorder = Recorder::default();
    let gate = Arc::new(Semaphore::new(0));
    install_recorder(&queue, &recorder, Some(Arc::clone(&gate)));

    let first = queue.enqueue("a", ());
    reaches(first.job(), JobStatus::Processing).await;

    assert!(!queue.enqueue("a", ()).is_accepted());
    assert_eq!(queue.len(), 1);

    gate.add_permits(1);
    drained(&queue).await;
    assert_eq!(recorder.order(), ["a"]);
}

#[tokio::test]
async fn key_marked_done_while_running_can_be_resubmitted() {
    let queue: Queue<()> = Queue::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let held = Arc::clone(&gate);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    queue.set_processor(processor_fn(move |job: Job<()>| {
        let gate = Arc::clone(&held);
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            job.mark_done();
            gate.acquire().await?.forget();
            Ok(())
        }
    }));

    let first = queue.enqueue("a", ());
    reaches(first.job(), JobStatus::Done).await;

    // Still running, but no longer pending or processing.
    let second = queue.enqueue("a", ());
    assert!(second.is_accepted());

    let active = queue.jobs();
    assert_eq!(active.len(), 2);
    assert!(active[0].same_job(first.job()));
    assert!(active[1].same_job(second.job()));
    assert!(queue.get("a").unwrap().same_job(second.job()));

    // A third submission is blocked by the pending one.
    assert!(!queue.enqueue("a", ()).is_accepted());

    gate.add_permits(2);
    drained(&queue).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(second.job().status(), JobStatus::Done);
}

#[tokio::test]
async fn key_can_be_resubmitted_after_it_finished() {
    let queue: Queue<()> = Queue::new().unwrap();
    let recorder = Recorder::default();
    install_recorder(&queue, &recorder, None);

    let first = queue.enqueue("a", ());
    drained(&queue).await;

    let second = queue.enqueue("a", ());
    assert!(second.is_accepted());
    assert_ne!(first.job().id(), second.job().id());

    drained(&queue).await;
    assert_eq!(recorder.order(), ["a", "a"]);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn processor_failure_marks_error_and_queue_moves_on() {
    let queue: Queue<()> = Queue::new().unwrap();
    queue.set_processor(processor_fn(|job: Job<()>| async move {
        if job.key() == "a" {
            return Err(anyhow!("network error"));
        }
        job.mark_done();
        Ok(())
    }));

    let a = queue.enqueue("a", ());
    let b = queue.enqueue("b", ());
    drained(&queue).await;

    assert_eq!(a.job().status(), JobStatus::Error);
    assert_eq!(a.job().error().as_deref(), Some("network error"));
    assert_eq!(b.job().status(), JobStatus::Done);
    assert_eq!(b.job().error(), None);
    assert!(queue.is_empty());
    assert!(!queue.is_busy());
}

#[tokio::test]
async fn failure_overrides_status_set_by_processor() {
    let queue: Queue<()> = Queue::new().unwrap();
    queue.set_processor(processor_fn(|job: Job<()>| async move {
        job.mark_done();
        Err(anyhow!("upload failed"))
    }));

    let a = queue.enqueue("a", ());
    drained(&queue).await;

    assert_eq!(a.job().status(), JobStatus::Error);
    assert_eq!(a.job().error().as_deref(), Some("upload failed"));
}

#[tokio::test]
async fn panicking_processor_is_treated_as_failure() {
    let queue: Queue<()> = Queue::new().unwrap();
    queue.set_processor(processor_fn(|job: Job<()>| async move {
        if job.key() == "a" {
            panic!("boom");
        }
        job.mark_done();
        Ok(())
    }));

    let a = queue.enqueue("a", ());
    let b = queue.enqueue("b", ());
    drained(&queue).await;

    assert_eq!(a.job().status(), JobStatus::Error);
    assert_eq!(a.job().error().as_deref(), Some("processor panicked: boom"));
    assert_eq!(b.job().status(), JobStatus::Done);
}

#[tokio::test]
async fn unmarked_job_is_failed_before_the_next_one_starts() {
    let queue: Queue<()> = Queue::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let held = Arc::clone(&gate);
    queue.set_processor(processor_fn(move |job: Job<()>| {
        let gate = Arc::clone(&held);
        async move {
            if job.key() == "b" {
                gate.acquire().await?.forget();
                job.mark_done();
            }
            // "a" returns without marking.
            Ok(())
        }
    }));

    let a = queue.enqueue("a", ());
    let b = queue.enqueue("b", ());
    reaches(b.job(), JobStatus::Processing).await;

    // Success is not inferred, and only one job is ever Processing.
    assert_eq!(a.job().status(), JobStatus::Error);
    assert_eq!(
        a.job().error().as_deref(),
        Some("processor returned without marking the job")
    );
    assert_eq!(queue.len(), 1);

    gate.add_permits(1);
    drained(&queue).await;
    assert_eq!(b.job().status(), JobStatus::Done);
    assert!(queue.is_empty());
}

// ---------------------------------------------------------------------------
// Marking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_marks_last_write_wins() {
    let queue: Queue<()> = Queue::new().unwrap();
    let marker = queue.clone();
    queue.set_processor(processor_fn(move |job: Job<()>| {
        let queue = marker.clone();
        async move {
            if job.key() == "a" {
                queue.mark_as_done(&job);
                queue.mark_as_error(&job, "first");
                queue.mark_as_error(&job, "second");
            } else {
                queue.mark_as_error(&job, "transient");
                queue.mark_as_done(&job);
                queue.mark_as_done(&job);
            }
            Ok(())
        }
    }));

    let a = queue.enqueue("a", ());
    let b = queue.enqueue("b", ());
    drained(&queue).await;

    assert_eq!(a.job().status(), JobStatus::Error);
    assert_eq!(a.job().error().as_deref(), Some("second"));
    assert_eq!(b.job().status(), JobStatus::Done);
    assert_eq!(b.job().error(), None);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn processor_sees_job_in_processing_slot() {
    let queue: Queue<()> = Queue::new().unwrap();
    let observer = queue.clone();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    queue.set_processor(processor_fn(move |job: Job<()>| {
        let queue = observer.clone();
        let sink = Arc::clone(&sink);
        async move {
            let slot = queue.processing().map(|p| p.same_job(&job));
            *sink.lock().unwrap() = Some((job.status(), slot, queue.is_busy()));
            job.mark_done();
            Ok(())
        }
    }));

    queue.enqueue("a", ());
    drained(&queue).await;

    let seen = seen.lock().unwrap().take();
    assert_eq!(seen, Some((JobStatus::Processing, Some(true), true)));
}

// ---------------------------------------------------------------------------
// Processor installation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn last_installed_processor_wins() {
    let queue: Queue<()> = Queue::new().unwrap();
    let first = Recorder::default();
    let second = Recorder::default();
    install_recorder(&queue, &first, None);
    install_recorder(&queue, &second, None);

    queue.enqueue("a", ());
    drained(&queue).await;

    assert!(first.order().is_empty());
    assert_eq!(second.order(), ["a"]);
}

#[tokio::test]
async fn missing_processor_stalls_by_default() {
    let queue: Queue<()> = Queue::new().unwrap();

    let a = queue.enqueue("a", ());
    reaches(a.job(), JobStatus::Processing).await;
    let b = queue.enqueue("b", ());

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(a.job().status(), JobStatus::Processing);
    assert_eq!(b.job().status(), JobStatus::Pending);
    assert!(queue.is_busy());
    assert!(queue.processing().unwrap().same_job(a.job()));
    assert!(
        tokio::time::timeout(Duration::from_millis(50), queue.wait_idle())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn missing_processor_fails_fast_when_configured() {
    let queue: Queue<()> = Queue::with_config(QueueConfig {
        missing_processor: MissingProcessorPolicy::Fail,
        ..QueueConfig::default()
    })
    .unwrap();

    let a = queue.enqueue("a", ());
    let b = queue.enqueue("b", ());
    drained(&queue).await;

    let expected = Error::MissingProcessor.to_string();
    assert_eq!(a.job().status(), JobStatus::Error);
    assert_eq!(a.job().error(), Some(expected.clone()));
    assert_eq!(b.job().status(), JobStatus::Error);
    assert_eq!(b.job().error(), Some(expected));
    assert!(queue.is_empty());
}

// ---------------------------------------------------------------------------
// Drain entry point
// ---------------------------------------------------------------------------

#[tokio::test]
async fn process_next_on_idle_empty_queue_returns() {
    let queue: Queue<()> = Queue::new().unwrap();
    tokio::time::timeout(Duration::from_secs(1), queue.process_next())
        .await
        .expect("process_next should return immediately");
    assert!(!queue.is_busy());
}

#[tokio::test]
async fn process_next_is_a_no_op_while_busy() {
    let queue: Queue<()> = Queue::new().unwrap();
    let recorder = Recorder::default();
    let gate = Arc::new(Semaphore::new(0));
    install_recorder(&queue, &recorder, Some(Arc::clone(&gate)));

    let a = queue.enqueue("a", ());
    reaches(a.job(), JobStatus::Processing).await;

    tokio::time::timeout(Duration::from_secs(1), queue.process_next())
        .await
        .expect("process_next should not wait for the running job");
    assert_eq!(recorder.order(), ["a"]);

    gate.add_permits(1);
    drained(&queue).await;
}

#[test]
fn queue_requires_a_runtime() {
    let result = Queue::<()>::new();
    assert!(matches!(result, Err(Error::NoRuntime(_))));
}

#[test]
fn queue_can_run_on_an_explicit_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let queue: Queue<()> = Queue::with_runtime(QueueConfig::default(), runtime.handle().clone());
    queue.set_processor(processor_fn(|job: Job<()>| async move {
        job.mark_done();
        Ok(())
    }));

    let a = queue.enqueue("a", ());
    runtime.block_on(drained(&queue));
    assert_eq!(a.job().status(), JobStatus::Done);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_cover_the_lifecycle_in_order() {
    let queue: Queue<()> = Queue::new().unwrap();
    let mut events = queue.subscribe();
    queue.set_processor(processor_fn(|job: Job<()>| async move {
        job.mark_error("bad image");
        Ok(())
    }));

    let a = queue.enqueue("a", ());
    queue.enqueue("a", ());
    drained(&queue).await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    for pair in received.windows(2) {
        assert!(pair[1].seq > pair[0].seq);
    }

    let id = a.job().id();
    let kinds: Vec<_> = received.into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::JobEnqueued {
                id,
                key: "a".to_string()
            },
            EventKind::JobDeduplicated {
                key: "a".to_string(),
                outstanding_id: id
            },
            EventKind::JobStarted {
                id,
                key: "a".to_string()
            },
            match &kinds[3] {
                EventKind::JobFinished { duration_ms, .. } => EventKind::JobFinished {
                    id,
                    key: "a".to_string(),
                    status: JobStatus::Error,
                    error: Some("bad image".to_string()),
                    duration_ms: *duration_ms,
                },
                other => panic!("expected JobFinished, got {other:?}"),
            },
            EventKind::QueueIdle,
        ]
    );
}

// ---------------------------------------------------------------------------
// Transcription queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transcription_queue_dedups_by_file_path() {
    let queue: TranscriptionQueue = Queue::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let processed = Arc::new(Mutex::new(Vec::new()));
    {
        let gate = Arc::clone(&gate);
        let processed = Arc::clone(&processed);
        queue.set_processor(processor_fn(
            move |job: Job<transcription_queue::model::TranscriptionRequest>| {
                let gate = Arc::clone(&gate);
                let processed = Arc::clone(&processed);
                async move {
                    gate.acquire().await?.forget();
                    processed
                        .lock()
                        .unwrap()
                        .push(job.payload().original_parent_path.clone());
                    job.mark_done();
                    Ok(())
                }
            },
        ));
    }

    let first = queue.add_to_queue("Inbox/scan.png", "Inbox");
    let dup = queue.add_to_queue("Inbox/scan.png", "Elsewhere");
    let other = queue.add_to_queue("Inbox/other.png", "Inbox");

    assert!(first.is_accepted());
    assert!(!dup.is_accepted());
    assert!(other.is_accepted());
    assert_eq!(first.job().key(), "Inbox/scan.png");
    assert!(queue.get("Inbox/scan.png").is_some());
    assert_eq!(queue.len(), 2);

    gate.add_permits(2);
    drained(&queue).await;

    let processed = processed.lock().unwrap().clone();
    assert_eq!(
        processed,
        vec![
            std::path::PathBuf::from("Inbox"),
            std::path::PathBuf::from("Inbox")
        ]
    );
}
