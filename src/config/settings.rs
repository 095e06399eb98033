//! User-editable transcription settings, stored as TOML.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::provider::ApiProvider;
use crate::engine::MissingProcessorPolicy;
use crate::error::{Error, Result};

pub const DEFAULT_IMAGE_FOLDER: &str = "Images";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful transcription assistant. \
Convert handwritten or printed text in images into clean Markdown. \
Preserve the structure of lists, headings and tables. Do not add commentary.";

pub const DEFAULT_USER_PROMPT: &str = "Transcribe the text in this image.";

/// How the note created from a transcription is named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteNamingOption {
    /// First line of the transcription, markdown stripped.
    FirstLine,
    /// `ImageName.md`
    #[default]
    ImageName,
    /// `YYYYMMDD_ImageName.md`
    DateImageName,
    /// `Folder_YYYYMMDD_ImageName.md`
    FolderDateImageName,
}

impl std::fmt::Display for NoteNamingOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoteNamingOption::FirstLine => "first_line",
            NoteNamingOption::ImageName => "image_name",
            NoteNamingOption::DateImageName => "date_image_name",
            NoteNamingOption::FolderDateImageName => "folder_date_image_name",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ApiProvider,
    pub openai_model: String,
    pub anthropic_model: String,
    pub google_model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub note_naming: NoteNamingOption,
    pub image_folder_name: String,
    pub verbose_notifications: bool,
    pub missing_processor: MissingProcessorPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ApiProvider::default(),
            openai_model: ApiProvider::OpenAi.default_model().to_string(),
            anthropic_model: ApiProvider::Anthropic.default_model().to_string(),
            google_model: ApiProvider::Google.default_model().to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prompt: DEFAULT_USER_PROMPT.to_string(),
            note_naming: NoteNamingOption::default(),
            image_folder_name: DEFAULT_IMAGE_FOLDER.to_string(),
            verbose_notifications: false,
            missing_processor: MissingProcessorPolicy::default(),
        }
    }
}

impl Settings {
    /// Read and validate a TOML settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad settings {}: {e}", path.display())))?;
        settings.validated()
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validated()
    }

    /// Normalize blank fields and check the selected model.
    pub fn validated(mut self) -> Result<Self> {
        let folder = self.image_folder_name.trim();
        self.image_folder_name = if folder.is_empty() {
            DEFAULT_IMAGE_FOLDER.to_string()
        } else {
            folder.to_string()
        };
        self.provider.check_model(self.model())?;
        Ok(self)
    }

    /// The model configured for the selected provider.
    pub fn model(&self) -> &str {
        match self.provider {
            ApiProvider::OpenAi => &self.openai_model,
            ApiProvider::Anthropic => &self.anthropic_model,
            ApiProvider::Google => &self.google_model,
        }
    }
}
