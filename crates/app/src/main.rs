use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use scene_speaker_core::{
    AppConfig, CommandEngine, SceneCatalog, SceneSpeakerError, ScriptedEngine, SessionController,
    SettingsPatch, SpeakOutcome, SpeechEngine,
};
use tracing_subscriber::EnvFilter;

const EVENT_POLL: Duration = Duration::from_millis(250);
const STOP_GRACE: Duration = Duration::from_secs(2);

fn main() -> scene_speaker_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let catalog = Arc::new(load_catalog(cli.catalog.as_deref())?);

    match cli.command {
        Commands::Scenes { tag } => list_scenes(&catalog, tag.as_deref()),
        Commands::Languages => list_languages(&catalog),
        Commands::Voices { language, dry_run } => {
            if dry_run {
                list_voices(ScriptedEngine::with_sample_voices(), language.as_deref())
            } else {
                list_voices(CommandEngine::new(&config.engine), language.as_deref())
            }
        }
        Commands::Speak(args) => {
            if args.dry_run {
                let engine = ScriptedEngine::with_sample_voices().auto_respond();
                run_speak(engine, catalog, &config, &args)
            } else {
                run_speak(CommandEngine::new(&config.engine), catalog, &config, &args)
            }
        }
    }
}

fn load_catalog(path: Option<&Path>) -> scene_speaker_core::Result<SceneCatalog> {
    match path {
        Some(path) => SceneCatalog::from_path(path),
        None => SceneCatalog::builtin(),
    }
}

fn list_scenes(catalog: &SceneCatalog, tag: Option<&str>) -> scene_speaker_core::Result<()> {
    let scenes: Vec<_> = match tag {
        Some(tag) => catalog.with_tag(tag).collect(),
        None => catalog.scenes().iter().collect(),
    };
    if scenes.is_empty() {
        tracing::warn!(tag, "no scenes matched");
    }

    for scene in scenes {
        let languages: Vec<_> = scene.language_codes().collect();
        let tags: Vec<_> = scene.tags.iter().map(String::as_str).collect();
        println!(
            "{:<16} {:<24} [{}] {}",
            scene.id,
            scene.title,
            languages.join(", "),
            tags.join(" ")
        );
    }
    Ok(())
}

fn list_languages(catalog: &SceneCatalog) -> scene_speaker_core::Result<()> {
    for language in catalog.languages() {
        println!("{} {:<8} {}", language.flag, language.code, language.name);
    }
    Ok(())
}

fn list_voices<E: SpeechEngine>(
    mut engine: E,
    language: Option<&str>,
) -> scene_speaker_core::Result<()> {
    engine.initialize()?;
    for voice in engine.voices()? {
        if language.is_some_and(|language| language != voice.language) {
            continue;
        }
        println!("{:<24} {:<10} {}", voice.identifier, voice.language, voice.name);
    }
    Ok(())
}

fn run_speak<E: SpeechEngine>(
    engine: E,
    catalog: Arc<SceneCatalog>,
    config: &AppConfig,
    args: &SpeakArgs,
) -> scene_speaker_core::Result<()> {
    let mut session = SessionController::new(engine, catalog, &config.session);
    session.initialize()?;

    if let Some(scene) = &args.scene {
        session.select_scene(scene);
    }
    let settings = session.update_settings(args.patch());
    tracing::info!(
        scene = settings.selected_scene.as_deref(),
        language = %settings.language,
        voice = settings.voice.as_deref(),
        index = settings.selected_sentence_index,
        "session configured"
    );

    let timeout = Duration::from_secs(args.timeout_secs);
    loop {
        speak_current(&mut session, timeout)?;

        if !args.through_end {
            break;
        }
        let before = session.settings().selected_sentence_index;
        if session.next_sentence().selected_sentence_index == before {
            break;
        }
    }
    Ok(())
}

/// Speaks the current sentence and runs the event loop until the session is
/// idle again.
fn speak_current<E: SpeechEngine>(
    session: &mut SessionController<E>,
    timeout: Duration,
) -> scene_speaker_core::Result<()> {
    match session.speak()? {
        SpeakOutcome::Started(request) => {
            println!("{}", session.current_text());
            tracing::info!(%request, "utterance submitted");
        }
        SpeakOutcome::AlreadySpeaking(request) => {
            tracing::warn!(%request, "an utterance is still in flight");
        }
    }

    let deadline = Instant::now() + timeout;
    while session.is_speaking() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::warn!(?timeout, "utterance timed out; stopping");
            session.stop()?;
            let grace = Instant::now() + STOP_GRACE;
            while session.is_speaking() && Instant::now() < grace {
                session.wait_for_event(EVENT_POLL);
            }
            if session.is_speaking() {
                return Err(SceneSpeakerError::msg("speech engine did not confirm stop"));
            }
            break;
        }
        session.wait_for_event(remaining.min(EVENT_POLL));
    }

    match session.last_error() {
        Some(err) => Err(err.clone().into()),
        None => Ok(()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Speak multilingual sample scenes", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// JSON scene catalog to use instead of the built-in scenes.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available scenes.
    Scenes {
        /// Only show scenes carrying this tag.
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// List the languages used by the scenes.
    Languages,
    /// List the voices offered by the speech engine.
    Voices {
        /// Only show voices for this language code.
        #[arg(short, long)]
        language: Option<String>,
        /// Use the built-in scripted engine instead of the speech program.
        #[arg(long)]
        dry_run: bool,
    },
    /// Speak a sentence from a scene.
    Speak(SpeakArgs),
}

#[derive(Args, Debug)]
struct SpeakArgs {
    #[arg(short, long)]
    scene: Option<String>,
    #[arg(short, long)]
    language: Option<String>,
    /// Zero-based sentence index; clamped to the scene.
    #[arg(short, long)]
    index: Option<usize>,
    #[arg(long)]
    voice: Option<String>,
    /// Pitch multiplier in [0.5, 2.0].
    #[arg(long)]
    pitch: Option<f32>,
    /// Rate multiplier in [0.1, 2.0].
    #[arg(long)]
    rate: Option<f32>,
    /// Keep going with the following sentences until the last one.
    #[arg(long)]
    through_end: bool,
    /// Give up on an utterance after this many seconds.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
    /// Use the built-in scripted engine instead of the speech program.
    #[arg(long)]
    dry_run: bool,
}

impl SpeakArgs {
    fn patch(&self) -> SettingsPatch {
        let mut patch = SettingsPatch::new();
        patch.pitch = self.pitch;
        patch.rate = self.rate;
        patch.language = self.language.clone();
        patch.voice = self.voice.clone().map(Some);
        patch.selected_sentence_index = self.index;
        patch
    }
}
