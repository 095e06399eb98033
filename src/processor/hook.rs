//! Processor that delegates each transcription to an external executable.
//!
//! The hook receives the job and the active settings through `TRANSCRIBER_*`
//! environment variables, calls whichever provider it likes, and writes the
//! note. Exit status 0 marks the job done; anything else fails it with the
//! hook's stderr.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::Processor;
use crate::config::Settings;
use crate::config::secrets::{ExposeSecret, SecretString};
use crate::model::{Job, TranscriptionRequest};

pub struct HookProcessor {
    command: PathBuf,
    settings: Settings,
    api_key: SecretString,
}

impl HookProcessor {
    pub fn new(command: impl Into<PathBuf>, settings: Settings, api_key: SecretString) -> Self {
        Self {
            command: command.into(),
            settings,
            api_key,
        }
    }

    // Relative paths resolve against the process CWD. Bare names are left
    // for `Command` to look up on PATH.
    fn resolved_command(&self) -> std::io::Result<PathBuf> {
        if self.command.is_relative() && self.command.components().count() > 1 {
            Ok(std::env::current_dir()?.join(&self.command))
        } else {
            Ok(self.command.clone())
        }
    }
}

#[async_trait]
impl Processor<TranscriptionRequest> for HookProcessor {
    async fn process(&self, job: Job<TranscriptionRequest>) -> anyhow::Result<()> {
        let command = self.resolved_command()?;
        let request = job.payload();

        debug!(
            job_id = %job.id(),
            command = %command.display(),
            file = %request.file.display(),
            "running transcription hook"
        );

        let output = Command::new(&command)
            .env("TRANSCRIBER_JOB_ID", job.id().0.to_string())
            .env("TRANSCRIBER_FILE", &request.file)
            .env("TRANSCRIBER_PARENT", &request.original_parent_path)
            .env("TRANSCRIBER_PROVIDER", self.settings.provider.to_string())
            .env("TRANSCRIBER_MODEL", self.settings.model())
            .env("TRANSCRIBER_API_KEY", self.api_key.expose_secret())
            .env("TRANSCRIBER_SYSTEM_PROMPT", &self.settings.system_prompt)
            .env("TRANSCRIBER_USER_PROMPT", &self.settings.user_prompt)
            .env("TRANSCRIBER_NOTE_NAMING", self.settings.note_naming.to_string())
            .env("TRANSCRIBER_IMAGE_FOLDER", &self.settings.image_folder_name)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run hook {}", command.display()))?;

        if output.status.success() {
            job.mark_done();
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            bail!(
                "hook exited with status {}",
                output.status.code().unwrap_or(-1)
            );
        }
        bail!("{stderr}")
    }
}
