//! AI providers and the models each one offers for transcription.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    #[default]
    OpenAi,
    Anthropic,
    Google,
}

impl ApiProvider {
    pub const ALL: [ApiProvider; 3] = [
        ApiProvider::OpenAi,
        ApiProvider::Anthropic,
        ApiProvider::Google,
    ];

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "OPENAI_API_KEY",
            ApiProvider::Anthropic => "ANTHROPIC_API_KEY",
            ApiProvider::Google => "GOOGLE_API_KEY",
        }
    }

    /// Supported models as `(id, label)` pairs.
    pub fn models(self) -> &'static [(&'static str, &'static str)] {
        match self {
            ApiProvider::OpenAi => &[
                ("gpt-4.1", "GPT-4.1"),
                ("gpt-4.1-mini", "GPT-4.1 Mini"),
                ("o4-mini", "o4 Mini"),
            ],
            ApiProvider::Anthropic => &[
                ("claude-3-5-sonnet-latest", "Claude 3.5 Sonnet"),
                ("claude-3-7-sonnet-latest", "Claude 3.7 Sonnet"),
                ("claude-sonnet-4-0", "Claude Sonnet 4.0"),
            ],
            ApiProvider::Google => &[("gemini-2.0-flash", "Gemini 2.0 Flash")],
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "gpt-4.1-mini",
            ApiProvider::Anthropic => "claude-sonnet-4-0",
            ApiProvider::Google => "gemini-2.0-flash",
        }
    }

    /// Reject model ids the provider does not offer.
    pub fn check_model(self, model: &str) -> Result<()> {
        if self.models().iter().any(|(id, _)| *id == model) {
            Ok(())
        } else {
            Err(Error::Config(format!("unknown {self} model: {model}")))
        }
    }
}

impl std::fmt::Display for ApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApiProvider::OpenAi => "openai",
            ApiProvider::Anthropic => "anthropic",
            ApiProvider::Google => "google",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ApiProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ApiProvider::ALL
            .into_iter()
            .find(|provider| provider.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("unknown provider: {s}")))
    }
}
