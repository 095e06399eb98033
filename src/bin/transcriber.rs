//! transcriber CLI: queue images for transcription and run them through a hook.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use transcription_queue::config::{ApiProvider, Config};
use transcription_queue::event::{EventKind, QueueEvent};
use transcription_queue::processor::HookProcessor;
use transcription_queue::telemetry::{TelemetryConfig, init_telemetry};
use transcription_queue::{Enqueued, JobSnapshot, JobStatus, QueueConfig, TranscriptionQueue};

#[derive(Parser)]
#[command(name = "transcriber", about = "Transcribe images into notes, one at a time")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue images and process them with a hook executable
    Run {
        /// Executable invoked once per image
        #[arg(long)]
        hook: PathBuf,
        /// TOML settings file (overrides TRANSCRIBER_SETTINGS)
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Print the final job list as JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Image files to transcribe
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List supported providers and models
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            hook,
            settings,
            json,
            files,
        } => cmd_run(hook, settings, json, files).await,
        Command::Models => {
            cmd_models();
            Ok(())
        }
    }
}

async fn cmd_run(
    hook: PathBuf,
    settings: Option<PathBuf>,
    json: bool,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let config = match settings {
        Some(path) => Config::with_settings_path(Some(&path))?,
        None => Config::from_env()?,
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "transcriber".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let Config {
        settings, api_key, ..
    } = config;
    let verbose = settings.verbose_notifications;

    let queue = TranscriptionQueue::with_config(QueueConfig {
        missing_processor: settings.missing_processor,
        event_capacity: files.len() * 4 + 16,
    })?;
    queue.set_processor(HookProcessor::new(hook, settings, api_key));

    let mut events = queue.subscribe();
    let mut jobs = Vec::with_capacity(files.len());
    for file in files {
        let parent = file.parent().map(Path::to_path_buf).unwrap_or_default();
        match queue.add_to_queue(&file, parent) {
            Enqueued::Accepted(job) => jobs.push(job),
            Enqueued::Duplicate(_) => {
                if verbose {
                    println!("skipped {} (already queued)", file.display());
                }
            }
        }
    }

    let idle = queue.wait_idle();
    tokio::pin!(idle);
    loop {
        tokio::select! {
            _ = &mut idle => break,
            event = events.recv() => match event {
                Ok(event) if verbose => print_event(&event),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!(missed = n, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    if verbose {
        while let Ok(event) = events.try_recv() {
            print_event(&event);
        }
    }

    // Handles outlive the queue's active set, so the final status is still here.
    let finished: Vec<JobSnapshot> = jobs.iter().map(|job| job.snapshot()).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&finished)?);
    } else {
        print_summary(&finished);
    }

    let failed = finished
        .iter()
        .filter(|job| job.status != JobStatus::Done)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} transcription(s) failed", finished.len());
    }
    Ok(())
}

fn print_event(event: &QueueEvent) {
    match &event.kind {
        EventKind::JobStarted { key, .. } => println!("transcribing {key}"),
        EventKind::JobFinished {
            key,
            status: JobStatus::Done,
            duration_ms,
            ..
        } => println!("done {key} ({duration_ms}ms)"),
        EventKind::JobFinished { key, error, .. } => {
            println!("failed {key}: {}", error.as_deref().unwrap_or("-"));
        }
        _ => {}
    }
}

fn print_summary(jobs: &[JobSnapshot]) {
    if jobs.is_empty() {
        println!("Nothing to transcribe.");
        return;
    }

    println!("{:<8}  {:<10}  {:<40}  ERROR", "ID", "STATUS", "FILE");
    println!("{}", "-".repeat(80));
    for job in jobs {
        println!(
            "{:<8}  {:<10}  {:<40}  {}",
            job.id,
            job.status,
            job.key,
            job.error.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} job(s)", jobs.len());
}

fn cmd_models() {
    for provider in ApiProvider::ALL {
        println!("{provider} (key: {})", provider.api_key_var());
        for (id, label) in provider.models() {
            let marker = if *id == provider.default_model() {
                " (default)"
            } else {
                ""
            };
            println!("  {id:<28} {label}{marker}");
        }
    }
}
