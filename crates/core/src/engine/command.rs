use std::{
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use super::{
    EngineError, RequestId, SpeakOptions, SpeechEngine, Utterance, UtteranceCallbacks, Voice,
};
use crate::EngineConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Speaks through an espeak-ng compatible program, one child process per
/// utterance.
#[derive(Debug)]
pub struct CommandEngine {
    program: String,
    max_input_length: usize,
    voices: Option<Vec<Voice>>,
    active: Arc<Mutex<Option<ActiveUtterance>>>,
}

#[derive(Debug)]
struct ActiveUtterance {
    request: RequestId,
    child: Child,
    stop_requested: bool,
}

impl CommandEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            program: config.program.clone(),
            max_input_length: config.max_input_length,
            voices: None,
            active: Arc::new(Mutex::new(None)),
        }
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, Option<ActiveUtterance>>, EngineError> {
        lock(&self.active)
    }

    #[cfg(test)]
    fn active_pid(&self) -> Option<u32> {
        self.lock_active()
            .ok()
            .and_then(|active| active.as_ref().map(|utterance| utterance.child.id()))
    }

    fn spawn(&self, utterance: &Utterance) -> std::io::Result<Child> {
        let mut command = Command::new(&self.program);
        command.args(speech_args(&utterance.options));
        command
            .arg("--")
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command.spawn()
    }
}

impl SpeechEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.voices.is_some() {
            return Ok(());
        }

        let output = Command::new(&self.program)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .map_err(|err| EngineError::Unavailable(format!("{}: {err}", self.program)))?;
        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "`{} --voices` exited with {}",
                self.program, output.status
            )));
        }

        let voices = parse_voice_table(&String::from_utf8_lossy(&output.stdout));
        tracing::info!(program = %self.program, voices = voices.len(), "speech engine initialized");
        self.voices = Some(voices);
        Ok(())
    }

    fn voices(&mut self) -> Result<Vec<Voice>, EngineError> {
        self.initialize()?;
        Ok(self.voices.clone().unwrap_or_default())
    }

    fn speak(&mut self, utterance: Utterance, callbacks: UtteranceCallbacks) {
        if let Err(err) = self.initialize() {
            callbacks.on_error(format!("failed to initialize speech: {err}"));
            return;
        }

        let utterance = utterance.truncated(self.max_input_length);
        let child = match self.spawn(&utterance) {
            Ok(child) => child,
            Err(err) => {
                callbacks.on_error(format!("failed to launch {}: {err}", self.program));
                return;
            }
        };

        let request = callbacks.request();
        match self.lock_active() {
            Ok(mut active) => {
                // The previous watcher sees the request mismatch and exits quietly.
                if let Some(mut previous) = active.take() {
                    tracing::warn!(
                        previous = %previous.request,
                        %request,
                        "replacing a speech process that is still running"
                    );
                    let _ = previous.child.kill();
                    let _ = previous.child.wait();
                }
                *active = Some(ActiveUtterance {
                    request,
                    child,
                    stop_requested: false,
                });
            }
            Err(err) => {
                callbacks.on_error(err.to_string());
                return;
            }
        }

        let shared = Arc::clone(&self.active);
        let program = self.program.clone();
        thread::spawn(move || watch(shared, request, program, callbacks));
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let mut active = self.lock_active()?;
        match active.as_mut() {
            Some(utterance) => {
                utterance.stop_requested = true;
                utterance.child.kill()?;
                tracing::debug!(request = %utterance.request, "sent kill to speech process");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn is_speaking(&self) -> bool {
        self.lock_active()
            .map(|active| active.is_some())
            .unwrap_or(false)
    }

    fn max_input_length(&self) -> usize {
        self.max_input_length
    }
}

/// Waits for the child owned by `request` to exit and reports the outcome.
fn watch(
    shared: Arc<Mutex<Option<ActiveUtterance>>>,
    request: RequestId,
    program: String,
    callbacks: UtteranceCallbacks,
) {
    callbacks.on_start();
    loop {
        let mut active = match lock(&shared) {
            Ok(active) => active,
            Err(err) => {
                callbacks.on_error(err.to_string());
                return;
            }
        };
        let Some(utterance) = active.as_mut().filter(|u| u.request == request) else {
            return;
        };

        match utterance.child.try_wait() {
            Ok(Some(status)) => {
                let stopped = utterance.stop_requested;
                *active = None;
                drop(active);
                if stopped {
                    callbacks.on_stopped();
                } else if status.success() {
                    callbacks.on_done();
                } else {
                    callbacks.on_error(format!("{program} exited with {status}"));
                }
                return;
            }
            Ok(None) => {}
            Err(err) => {
                *active = None;
                drop(active);
                callbacks.on_error(err.to_string());
                return;
            }
        }

        drop(active);
        thread::sleep(POLL_INTERVAL);
    }
}

fn lock(
    shared: &Mutex<Option<ActiveUtterance>>,
) -> Result<MutexGuard<'_, Option<ActiveUtterance>>, EngineError> {
    shared
        .lock()
        .map_err(|_| EngineError::Failed("speech process state has been poisoned".to_string()))
}

fn speech_args(options: &SpeakOptions) -> Vec<String> {
    let voice = options
        .voice
        .clone()
        .unwrap_or_else(|| options.language.to_ascii_lowercase());
    let pitch = (options.pitch * 50.0).round().clamp(0.0, 99.0) as u32;
    let words_per_minute = (options.rate * BASE_WORDS_PER_MINUTE).round().max(80.0) as u32;
    vec![
        "-v".to_string(),
        voice,
        "-p".to_string(),
        pitch.to_string(),
        "-s".to_string(),
        words_per_minute.to_string(),
    ]
}

/// Parses the table printed by `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
/// ```
fn parse_voice_table(table: &str) -> Vec<Voice> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 4 {
                return None;
            }
            let identifier = columns[1];
            let name = columns[3].replace('_', " ");
            Some(Voice::new(identifier, name, normalize_language_tag(identifier)))
        })
        .collect()
}

/// `en-us` becomes `en-US`; tags without a two-letter region are kept.
fn normalize_language_tag(tag: &str) -> String {
    let mut parts = tag.split('-');
    let Some(primary) = parts.next() else {
        return String::new();
    };
    let mut normalized = primary.to_ascii_lowercase();
    for part in parts {
        normalized.push('-');
        if part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()) {
            normalized.push_str(&part.to_ascii_uppercase());
        } else {
            normalized.push_str(part);
        }
    }
    normalized
}
