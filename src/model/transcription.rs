//! Transcription request payload.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An image waiting to be transcribed into a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    /// The image file to transcribe.
    pub file: PathBuf,
    /// Folder the image originally landed in. The note is written next to it.
    pub original_parent_path: PathBuf,
}

impl TranscriptionRequest {
    pub fn new(file: impl Into<PathBuf>, original_parent_path: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            original_parent_path: original_parent_path.into(),
        }
    }

    /// Build a request whose original parent is the file's own directory.
    pub fn from_file(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let parent = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(file, parent)
    }

    /// Dedup key: the file path.
    pub fn key(&self) -> String {
        self.file.to_string_lossy().into_owned()
    }
}
