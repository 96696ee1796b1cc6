use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{resolver::FALLBACK_TEXT, Result, Settings};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

/// Initial settings and display defaults for a playback session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub defaults: Settings,
    /// Text spoken when the selected scene has nothing for the language.
    pub fallback_text: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            defaults: Settings::default(),
            fallback_text: FALLBACK_TEXT.to_string(),
        }
    }
}

/// Configuration specific to the external speech program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: String,
    /// Longest input, in characters, submitted to the engine in one request.
    pub max_input_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".to_string(),
            max_input_length: crate::engine::DEFAULT_MAX_INPUT_LENGTH,
        }
    }
}
