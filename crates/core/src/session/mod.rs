//! Playback session controller.
//!
//! The controller owns the `Idle`/`Speaking` state machine and is the only
//! caller of [`SpeechEngine::speak`] and [`SpeechEngine::stop`]. Engine
//! callbacks arrive as [`EngineEvent`]s on the controller's own queue and are
//! applied by [`SessionController::pump`] or [`SessionController::handle_event`].
//! An event whose request id is not the outstanding one is ignored, which
//! makes duplicate and late callbacks harmless.

use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;

use crate::{
    engine::{
        EngineEvent, EngineEventKind, RequestId, SpeakOptions, SpeechEngine, Utterance,
        UtteranceCallbacks, Voice,
    },
    resolver, LanguageInfo, SceneCatalog, SessionConfig, SessionError, Settings, SettingsPatch,
    SettingsStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Speaking {
        request: RequestId,
        /// A stop has been sent and its acknowledgement is outstanding.
        stopping: bool,
    },
}

impl PlaybackState {
    pub fn is_speaking(&self) -> bool {
        matches!(self, Self::Speaking { .. })
    }

    pub fn request(&self) -> Option<RequestId> {
        match self {
            Self::Idle => None,
            Self::Speaking { request, .. } => Some(*request),
        }
    }
}

/// Result of a successful [`SessionController::speak`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Started(RequestId),
    /// An utterance is already in flight; nothing was submitted.
    AlreadySpeaking(RequestId),
}

/// Read-only view of a session for the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub settings: Settings,
    pub is_speaking: bool,
    pub current_text: String,
    pub available_voices: Vec<Voice>,
    pub available_languages: Vec<LanguageInfo>,
    pub available_tts_languages: Vec<String>,
    pub engine_name: String,
    pub engine_ready: bool,
    pub error: Option<String>,
}

pub struct SessionController<E: SpeechEngine> {
    engine: E,
    catalog: Arc<SceneCatalog>,
    store: SettingsStore,
    fallback_text: String,
    state: PlaybackState,
    last_request: u64,
    voices: Vec<Voice>,
    tts_languages: Vec<String>,
    languages: Vec<LanguageInfo>,
    engine_ready: bool,
    error: Option<SessionError>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl<E: SpeechEngine> SessionController<E> {
    /// Creates an idle session. Call [`initialize`] to load voices.
    ///
    /// [`initialize`]: SessionController::initialize
    pub fn new(engine: E, catalog: Arc<SceneCatalog>, config: &SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let store = SettingsStore::new(config.defaults.clone(), Arc::clone(&catalog));
        let languages = catalog.languages();
        Self {
            engine,
            catalog,
            store,
            fallback_text: config.fallback_text.clone(),
            state: PlaybackState::Idle,
            last_request: 0,
            voices: Vec::new(),
            tts_languages: Vec::new(),
            languages,
            engine_ready: false,
            error: None,
            events_tx,
            events_rx,
        }
    }

    /// Initializes the engine and loads its voices. May be retried after a
    /// failure.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        self.error = None;
        let loaded = self.engine.initialize().and_then(|()| {
            let voices = self.engine.voices()?;
            let languages = self.engine.supported_language_codes()?;
            Ok((voices, languages))
        });

        match loaded {
            Ok((voices, languages)) => {
                tracing::info!(
                    engine = self.engine.name(),
                    voices = voices.len(),
                    languages = languages.len(),
                    "speech engine ready"
                );
                self.voices = voices;
                self.tts_languages = languages;
                self.engine_ready = true;
                self.ensure_voice();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    engine = self.engine.name(),
                    error = %err,
                    "failed to initialize speech engine"
                );
                self.engine_ready = false;
                Err(self.fail(SessionError::EngineInitializationFailed(err.to_string())))
            }
        }
    }

    pub fn settings(&self) -> &Settings {
        self.store.get()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn engine_ready(&self) -> bool {
        self.engine_ready
    }

    pub fn catalog(&self) -> &SceneCatalog {
        &self.catalog
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Text for the selected scene, language and sentence, derived on every
    /// call from the current settings.
    pub fn current_text(&self) -> &str {
        let settings = self.store.get();
        let scene = settings
            .selected_scene
            .as_deref()
            .and_then(|id| self.catalog.get(id));
        resolver::resolve_or(
            scene,
            &settings.language,
            settings.selected_sentence_index,
            &self.fallback_text,
        )
    }

    pub fn voices_for_language(&self) -> impl Iterator<Item = &Voice> {
        let language = self.store.get().language.as_str();
        self.voices
            .iter()
            .filter(move |voice| voice.language == language)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            settings: self.store.snapshot(),
            is_speaking: self.is_speaking(),
            current_text: self.current_text().to_string(),
            available_voices: self.voices.clone(),
            available_languages: self.languages.clone(),
            available_tts_languages: self.tts_languages.clone(),
            engine_name: self.engine.name().to_string(),
            engine_ready: self.engine_ready,
            error: self.error.as_ref().map(ToString::to_string),
        }
    }

    /// Starts speaking the current text.
    ///
    /// The session is `Speaking` as soon as this returns; it goes back to
    /// `Idle` only when the engine reports an outcome.
    pub fn speak(&mut self) -> Result<SpeakOutcome, SessionError> {
        self.error = None;

        if let PlaybackState::Speaking { request, .. } = self.state {
            tracing::debug!(%request, "speak ignored; an utterance is already in flight");
            return Ok(SpeakOutcome::AlreadySpeaking(request));
        }

        let text = self.current_text().to_string();
        if text.trim().is_empty() {
            return Err(self.fail(SessionError::NoTextToSpeak));
        }

        self.last_request += 1;
        let request = RequestId(self.last_request);
        let settings = self.store.get();
        let utterance = Utterance {
            text,
            options: SpeakOptions {
                pitch: settings.pitch,
                rate: settings.rate,
                language: settings.language.clone(),
                voice: settings.voice.clone(),
            },
        };
        tracing::info!(
            %request,
            language = %utterance.options.language,
            voice = utterance.options.voice.as_deref().unwrap_or("default"),
            "speaking"
        );

        self.state = PlaybackState::Speaking {
            request,
            stopping: false,
        };
        let callbacks = UtteranceCallbacks::new(request, self.events_tx.clone());
        self.engine.speak(utterance, callbacks);
        Ok(SpeakOutcome::Started(request))
    }

    /// Asks the engine to stop the current utterance. The session stays
    /// `Speaking` until the engine confirms, unless the stop itself fails.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.error = None;
        self.request_stop()
    }

    /// Merges `patch` into the settings.
    ///
    /// Changing language or voice while speaking stops the utterance first.
    /// A language change without an explicit voice clears the voice, and the
    /// first voice of the new language is picked automatically.
    pub fn update_settings(&mut self, mut patch: SettingsPatch) -> Settings {
        self.error = None;
        let current = self.store.get();
        let language_changed = patch.changes_language(current);
        let language = patch
            .language
            .clone()
            .unwrap_or_else(|| current.language.clone());
        let requested = match &patch.voice {
            Some(voice) => voice.clone(),
            None if language_changed => None,
            None => current.voice.clone(),
        };
        let voice = self.resolve_voice(&language, requested.as_deref());
        let voice_changed = voice != self.store.get().voice;

        if (language_changed || voice_changed) && self.state.is_speaking() {
            tracing::debug!(
                language_changed,
                voice_changed,
                "stopping speech before settings change"
            );
            // A stop failure is recorded and forces Idle; the update goes ahead.
            let _ = self.request_stop();
        }

        patch.voice = Some(voice);
        self.store.update(patch)
    }

    /// Selects a scene and rewinds to its first sentence.
    pub fn select_scene(&mut self, scene_id: &str) -> Settings {
        if self.catalog.get(scene_id).is_none() {
            tracing::warn!(scene = scene_id, "selected scene is not in the catalog");
        }
        self.update_settings(
            SettingsPatch::new()
                .scene(Some(scene_id.to_string()))
                .sentence_index(0),
        )
    }

    /// Moves to the next sentence, staying put on the last one. Never touches
    /// an utterance already in flight.
    pub fn next_sentence(&mut self) -> Settings {
        let index = self.store.get().selected_sentence_index;
        if index + 1 < self.store.sentence_count() {
            self.store.update(SettingsPatch::new().sentence_index(index + 1));
        }
        self.store.snapshot()
    }

    /// Moves to the previous sentence, staying put on the first one.
    pub fn previous_sentence(&mut self) -> Settings {
        let index = self.store.get().selected_sentence_index;
        if index > 0 {
            self.store.update(SettingsPatch::new().sentence_index(index - 1));
        }
        self.store.snapshot()
    }

    /// Applies an engine callback. Returns `false` when it was ignored
    /// because it does not belong to the outstanding request.
    pub fn handle_event(&mut self, event: EngineEvent) -> bool {
        let PlaybackState::Speaking { request, stopping } = self.state else {
            tracing::debug!(
                request = %event.request,
                kind = ?event.kind,
                "ignoring callback while idle"
            );
            return false;
        };
        if event.request != request {
            tracing::debug!(
                request = %event.request,
                current = %request,
                kind = ?event.kind,
                "ignoring stale callback"
            );
            return false;
        }

        match event.kind {
            EngineEventKind::Started => {
                tracing::debug!(%request, "speech started");
                return true;
            }
            EngineEventKind::Done => tracing::info!(%request, "speech completed"),
            EngineEventKind::Stopped => tracing::info!(%request, stopping, "speech stopped"),
            EngineEventKind::Error(reason) => {
                tracing::warn!(%request, %reason, "speech failed");
                self.fail(SessionError::EngineSpeakFailed(reason));
            }
        }
        self.state = PlaybackState::Idle;
        true
    }

    /// Applies every callback queued so far without blocking. Returns the
    /// number of events that changed or confirmed the current request.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.handle_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits up to `timeout` for the next callback and applies it. Meant for
    /// hosts that run the session's event loop on a dedicated thread.
    pub fn wait_for_event(&mut self, timeout: Duration) -> Option<EngineEvent> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event.clone());
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) => None,
            // The controller holds a sender, so the queue never disconnects.
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// The engine's own "is speaking" poll, for diagnostics only.
    pub fn engine_reports_speaking(&self) -> bool {
        self.engine.is_speaking()
    }

    fn request_stop(&mut self) -> Result<(), SessionError> {
        let PlaybackState::Speaking { request, stopping } = self.state else {
            return Ok(());
        };
        if stopping {
            tracing::debug!(%request, "stop already requested");
            return Ok(());
        }

        match self.engine.stop() {
            Ok(()) => {
                tracing::debug!(%request, "stop requested");
                self.state = PlaybackState::Speaking {
                    request,
                    stopping: true,
                };
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%request, error = %err, "engine failed to stop; forcing idle");
                self.state = PlaybackState::Idle;
                Err(self.fail(SessionError::EngineStopFailed(err.to_string())))
            }
        }
    }

    /// Voice the settings end up with for `language`: the requested voice if
    /// it belongs to that language, otherwise the language's first voice.
    fn resolve_voice(&self, language: &str, requested: Option<&str>) -> Option<String> {
        let mut candidates = self.voices.iter().filter(|v| v.language == language);
        if let Some(voice) = requested {
            if candidates.clone().any(|v| v.identifier == voice) {
                return Some(voice.to_string());
            }
            tracing::warn!(voice, language, "voice does not belong to the language");
        }

        let first = candidates.next().map(|v| v.identifier.clone());
        if first.is_some() {
            tracing::debug!(voice = first.as_deref(), "auto-selected voice");
        }
        first
    }

    fn ensure_voice(&mut self) {
        let settings = self.store.get();
        let voice = self.resolve_voice(&settings.language, settings.voice.as_deref());
        if voice != settings.voice {
            self.store.update(SettingsPatch::new().voice(voice));
        }
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        self.error = Some(error.clone());
        error
    }
}
