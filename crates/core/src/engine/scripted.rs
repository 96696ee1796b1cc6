use super::{EngineError, SpeechEngine, Utterance, UtteranceCallbacks, Voice};

/// Deterministic in-memory engine used by tests and dry runs.
///
/// In auto-respond mode every utterance starts and completes immediately and
/// every stop is acknowledged at once. Otherwise the owner drives outcomes
/// with [`start`], [`finish`], [`fail`] and [`acknowledge_stop`].
///
/// [`start`]: ScriptedEngine::start
/// [`finish`]: ScriptedEngine::finish
/// [`fail`]: ScriptedEngine::fail
/// [`acknowledge_stop`]: ScriptedEngine::acknowledge_stop
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    voices: Vec<Voice>,
    initialized: bool,
    initialize_calls: usize,
    initialize_failure: Option<String>,
    stop_failure: Option<String>,
    auto_respond: bool,
    max_input_length: Option<usize>,
    spoken: Vec<Utterance>,
    stop_calls: usize,
    pending: Option<UtteranceCallbacks>,
    last_callbacks: Option<UtteranceCallbacks>,
}

impl ScriptedEngine {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            ..Self::default()
        }
    }

    /// An engine with a couple of voices for each built-in scene language.
    pub fn with_sample_voices() -> Self {
        Self::new(vec![
            Voice::new("en-us-1", "Samantha", "en-US"),
            Voice::new("en-us-2", "Alex", "en-US"),
            Voice::new("zh-cn-1", "Tingting", "zh-CN"),
            Voice::new("ja-jp-1", "Kyoko", "ja-JP"),
            Voice::new("ja-jp-2", "Otoya", "ja-JP"),
        ])
    }

    pub fn auto_respond(mut self) -> Self {
        self.auto_respond = true;
        self
    }

    pub fn failing_initialize(mut self, reason: impl Into<String>) -> Self {
        self.initialize_failure = Some(reason.into());
        self
    }

    pub fn failing_stop(mut self, reason: impl Into<String>) -> Self {
        self.stop_failure = Some(reason.into());
        self
    }

    pub fn with_max_input_length(mut self, max_chars: usize) -> Self {
        self.max_input_length = Some(max_chars);
        self
    }

    /// Lets a later `initialize` succeed.
    pub fn clear_initialize_failure(&mut self) {
        self.initialize_failure = None;
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls
    }

    pub fn spoken(&self) -> &[Utterance] {
        &self.spoken
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls
    }

    /// Callbacks of the most recent utterance, even after it settled.
    pub fn last_callbacks(&self) -> Option<&UtteranceCallbacks> {
        self.last_callbacks.as_ref()
    }

    pub fn start(&self) {
        if let Some(callbacks) = &self.pending {
            callbacks.on_start();
        }
    }

    pub fn finish(&mut self) {
        if let Some(callbacks) = self.pending.take() {
            callbacks.on_done();
        }
    }

    pub fn fail(&mut self, reason: &str) {
        if let Some(callbacks) = self.pending.take() {
            callbacks.on_error(reason);
        }
    }

    pub fn acknowledge_stop(&mut self) {
        if let Some(callbacks) = self.pending.take() {
            callbacks.on_stopped();
        }
    }
}

impl SpeechEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        self.initialize_calls += 1;
        if let Some(reason) = &self.initialize_failure {
            return Err(EngineError::Unavailable(reason.clone()));
        }
        self.initialized = true;
        Ok(())
    }

    fn voices(&mut self) -> Result<Vec<Voice>, EngineError> {
        self.initialize()?;
        Ok(self.voices.clone())
    }

    fn speak(&mut self, utterance: Utterance, callbacks: UtteranceCallbacks) {
        if let Err(err) = self.initialize() {
            callbacks.on_error(format!("failed to initialize speech: {err}"));
            return;
        }

        let utterance = utterance.truncated(self.max_input_length());
        self.spoken.push(utterance);
        self.last_callbacks = Some(callbacks.clone());

        if self.auto_respond {
            callbacks.on_start();
            callbacks.on_done();
        } else {
            self.pending = Some(callbacks);
        }
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.stop_calls += 1;
        if let Some(reason) = &self.stop_failure {
            return Err(EngineError::Failed(reason.clone()));
        }
        if self.auto_respond {
            self.acknowledge_stop();
        }
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.pending.is_some()
    }

    fn max_input_length(&self) -> usize {
        self.max_input_length.unwrap_or(super::DEFAULT_MAX_INPUT_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::engine::{EngineEventKind, RequestId, SpeakOptions};

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            options: SpeakOptions {
                pitch: 1.0,
                rate: 1.0,
                language: "en-US".to_string(),
                voice: None,
            },
        }
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut engine = ScriptedEngine::with_sample_voices();
        engine.initialize().unwrap();
        engine.initialize().unwrap();
        assert_eq!(engine.initialize_calls(), 1);
        assert_eq!(
            engine.supported_language_codes().unwrap(),
            vec!["en-US", "zh-CN", "ja-JP"]
        );
    }

    #[test]
    fn failed_initialization_reports_through_on_error() {
        let mut engine = ScriptedEngine::default().failing_initialize("no voices");
        let (tx, rx) = mpsc::channel();
        engine.speak(utterance("hi"), UtteranceCallbacks::new(RequestId(1), tx));

        let event = rx.try_recv().unwrap();
        assert!(matches!(event.kind, EngineEventKind::Error(ref reason) if reason.contains("no voices")));
        assert!(engine.spoken().is_empty());
    }

    #[test]
    fn truncates_long_input() {
        let mut engine = ScriptedEngine::default().with_max_input_length(4);
        let (tx, _rx) = mpsc::channel();
        engine.speak(utterance("abcdefgh"), UtteranceCallbacks::new(RequestId(1), tx));
        assert_eq!(engine.spoken()[0].text, "abcd");
    }

    #[test]
    fn auto_respond_completes_and_acknowledges() {
        let mut engine = ScriptedEngine::default().auto_respond();
        let (tx, rx) = mpsc::channel();
        engine.speak(utterance("hi"), UtteranceCallbacks::new(RequestId(3), tx));
        engine.stop().unwrap();

        let kinds: Vec<_> = rx.try_iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![EngineEventKind::Started, EngineEventKind::Done]);
        assert!(!engine.is_speaking());
        assert_eq!(engine.stop_calls(), 1);
    }
}
