//! Typed configuration from environment variables and a settings file.
//!
//! Loads once at startup, fails fast if the selected provider's API key is
//! missing. Sensitive values wrapped in secrecy::SecretString to prevent log
//! leaks.

pub mod provider;
pub mod secrets;
pub mod settings;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use secrecy::SecretString;

pub use provider::ApiProvider;
pub use settings::{NoteNamingOption, Settings};

/// Environment variable naming an optional TOML settings file.
pub const SETTINGS_VAR: &str = "TRANSCRIBER_SETTINGS";

#[derive(Debug)]
pub struct Config {
    pub settings: Settings,
    pub api_key: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(SETTINGS_VAR).map(PathBuf::from);
        Self::with_settings_path(path.as_deref())
    }

    /// Like [`Config::from_env`], but read settings from `path` when given.
    pub fn with_settings_path(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        let api_key = SecretString::from(required_var(settings.provider.api_key_var())?);

        Ok(Self {
            settings,
            api_key,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}
