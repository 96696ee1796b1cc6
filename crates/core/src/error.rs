use serde::Serialize;

use crate::engine::EngineError;

/// Result alias that carries the custom [`SceneSpeakerError`] type.
pub type Result<T> = std::result::Result<T, SceneSpeakerError>;

/// Common error type for loading catalogs, configuration and engines.
#[derive(Debug, thiserror::Error)]
pub enum SceneSpeakerError {
    /// Free-form error surfaced to the command line host.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in a scene catalog or configuration file.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("speech engine error: {0}")]
    Engine(#[from] EngineError),
    /// A session operation failed; the session itself has recovered.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Two scenes in one catalog share an id.
    #[error("duplicate scene id `{0}` in catalog")]
    DuplicateScene(String),
}

impl SceneSpeakerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SceneSpeakerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SceneSpeakerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// User-visible failures recorded by the session controller.
///
/// Every variant is recoverable: by the time one of these is reported the
/// controller is back in its idle state and the user may retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum SessionError {
    #[error("No text to speak. Please select a sentence.")]
    NoTextToSpeak,
    #[error("Failed to initialize the text-to-speech engine: {0}")]
    EngineInitializationFailed(String),
    #[error("Error during speech: {0}")]
    EngineSpeakFailed(String),
    #[error("Failed to stop speech: {0}")]
    EngineStopFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_render_readable_messages() {
        let err = SessionError::EngineSpeakFailed("audio device busy".to_string());
        assert_eq!(err.to_string(), "Error during speech: audio device busy");
        assert!(SessionError::NoTextToSpeak.to_string().starts_with("No text"));
    }

    #[test]
    fn session_errors_serialize_with_kind_tag() {
        let err = SessionError::EngineStopFailed("gone".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "engine_stop_failed");
        assert_eq!(json["reason"], "gone");
    }
}
