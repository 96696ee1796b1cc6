//! Contract between the session controller and a platform speech engine.
//!
//! Engines are fire-and-forget: [`SpeechEngine::speak`] returns nothing and
//! every outcome is reported through the [`UtteranceCallbacks`] handed in with
//! the request. Callbacks post [`EngineEvent`]s onto the session's queue, so an
//! engine may invoke them from any thread.

use std::{fmt, sync::mpsc::Sender};

use serde::{Deserialize, Serialize};

pub mod command;
pub mod scripted;

pub use command::CommandEngine;
pub use scripted::ScriptedEngine;

/// Input length used when an engine does not advertise its own limit.
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine cannot be reached or set up at all.
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// A voice offered by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub identifier: String,
    pub name: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

impl Voice {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            language: language.into(),
            quality: None,
        }
    }
}

/// Voice parameters captured when an utterance is submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeakOptions {
    pub pitch: f32,
    pub rate: f32,
    pub language: String,
    pub voice: Option<String>,
}

/// One speech request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub text: String,
    pub options: SpeakOptions,
}

impl Utterance {
    /// Cuts the text down to `max_chars` characters, logging when it does.
    pub fn truncated(mut self, max_chars: usize) -> Self {
        let cut = truncate_to_limit(&self.text, max_chars).len();
        if cut < self.text.len() {
            tracing::warn!(
                limit = max_chars,
                chars = self.text.chars().count(),
                "utterance exceeds engine input limit; truncating"
            );
            self.text.truncate(cut);
        }
        self
    }
}

/// Returns the longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_to_limit(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Identifies one speech request issued by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEventKind {
    Started,
    Done,
    Error(String),
    Stopped,
}

impl EngineEventKind {
    /// Whether this outcome settles the request it belongs to.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

/// A callback invocation, tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub request: RequestId,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn new(request: RequestId, kind: EngineEventKind) -> Self {
        Self { request, kind }
    }
}

/// The four outcome hooks for one utterance.
#[derive(Debug, Clone)]
pub struct UtteranceCallbacks {
    request: RequestId,
    sink: Sender<EngineEvent>,
}

impl UtteranceCallbacks {
    pub fn new(request: RequestId, sink: Sender<EngineEvent>) -> Self {
        Self { request, sink }
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn on_start(&self) {
        self.emit(EngineEventKind::Started);
    }

    pub fn on_done(&self) {
        self.emit(EngineEventKind::Done);
    }

    pub fn on_error(&self, reason: impl Into<String>) {
        self.emit(EngineEventKind::Error(reason.into()));
    }

    pub fn on_stopped(&self) {
        self.emit(EngineEventKind::Stopped);
    }

    fn emit(&self, kind: EngineEventKind) {
        let event = EngineEvent::new(self.request, kind);
        if self.sink.send(event).is_err() {
            tracing::debug!(request = %self.request, "session is gone; dropping engine event");
        }
    }
}

/// A speech capability the session controller can drive.
pub trait SpeechEngine {
    /// Short human-readable engine description.
    fn name(&self) -> &str;

    /// Prepares the engine. Safe to call repeatedly; the first success is
    /// cached.
    fn initialize(&mut self) -> Result<(), EngineError>;

    fn voices(&mut self) -> Result<Vec<Voice>, EngineError>;

    /// Languages that at least one voice can speak, in voice order.
    fn supported_language_codes(&mut self) -> Result<Vec<String>, EngineError> {
        let mut codes: Vec<String> = Vec::new();
        for voice in self.voices()? {
            if !codes.contains(&voice.language) {
                codes.push(voice.language);
            }
        }
        Ok(codes)
    }

    /// Submits an utterance. Exactly one of `on_done`, `on_error` or
    /// `on_stopped` is expected to follow, optionally preceded by `on_start`.
    fn speak(&mut self, utterance: Utterance, callbacks: UtteranceCallbacks);

    /// Asks the engine to stop the current utterance. Confirmation arrives
    /// through `on_stopped`.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Best-effort poll; callbacks remain the source of truth.
    fn is_speaking(&self) -> bool;

    fn max_input_length(&self) -> usize {
        DEFAULT_MAX_INPUT_LENGTH
    }
}
