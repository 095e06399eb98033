//! Error types for transcription-queue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no tokio runtime available to drive the queue worker")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("no processor installed")]
    MissingProcessor,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
