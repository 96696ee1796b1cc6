//! Core library for the Scene Speaker application.
//!
//! Scene Speaker lets a user pick a sentence from a catalog of multilingual
//! sample scenes, tune pitch, rate, language and voice, and have the sentence
//! spoken by an external speech engine. The [`SessionController`] reconciles
//! those settings with the engine's callback-driven lifecycle so that the
//! "is speaking" state never drifts from what the engine reports.

pub mod config;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod scene;
pub mod session;
pub mod settings;

pub use config::{AppConfig, EngineConfig, SessionConfig};
pub use engine::{
    CommandEngine, EngineError, EngineEvent, EngineEventKind, RequestId, ScriptedEngine,
    SpeakOptions, SpeechEngine, Utterance, UtteranceCallbacks, Voice,
};
pub use error::{Result, SceneSpeakerError, SessionError};
pub use resolver::{resolve, FALLBACK_TEXT};
pub use scene::{LanguageInfo, Scene, SceneCatalog};
pub use session::{PlaybackState, SessionController, SessionSnapshot, SpeakOutcome};
pub use settings::{Settings, SettingsPatch, SettingsStore};
