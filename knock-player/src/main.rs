//! Knock Player (knock-player) - Main entry point
//!
//! Plays "The Knock" (or another script) in the terminal: text reveal,
//! speech and procedural sound cues on one timeline, replayable on demand.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use knock_common::config::{resolve_config_path, resolve_script_path, TomlConfig};
use knock_common::events::EventBus;
use knock_common::Script;
use knock_player::audio::{AudioEngine, AudioOutputConfig, CpalAudioEngine, NullAudioEngine};
use knock_player::presentation::{run_session, OutputMode, Presenter, SessionOptions};
use knock_player::speech::{EspeakSpeechEngine, NullSpeechEngine, SpeechEngine, VoiceProfile};
use knock_player::{Scheduler, SchedulerConfig};
use tokio::io::BufReader;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for knock-player
#[derive(Parser, Debug)]
#[command(name = "knock-player")]
#[command(about = "Timed narrative player for The Knock")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "KNOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Alternate script file (TOML); the built-in script when absent
    #[arg(short, long, env = "KNOCK_SCRIPT")]
    script: Option<PathBuf>,

    /// Pause after the last segment before the run is complete
    #[arg(long)]
    settle_delay_ms: Option<u64>,

    /// Run without audio output
    #[arg(long)]
    no_audio: bool,

    /// Run without speech
    #[arg(long)]
    no_speech: bool,

    /// Start playing immediately
    #[arg(long)]
    autoplay: bool,

    /// Exit after the first completed run
    #[arg(long)]
    exit_on_complete: bool,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Log level (overrides RUST_LOG and the config file)
    #[arg(long)]
    log_level: Option<String>,
}

fn log_filter(args: &Args, config_level: &str) -> tracing_subscriber::EnvFilter {
    let directives = |level: &str| format!("knock_player={level},knock_common={level}");

    if let Some(level) = &args.log_level {
        return directives(level).into();
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| directives(config_level).into())
}

fn build_audio(args: &Args, config: &TomlConfig) -> Arc<dyn AudioEngine> {
    if args.no_audio || !config.audio.enabled {
        info!("Audio output disabled");
        return Arc::new(NullAudioEngine);
    }

    match CpalAudioEngine::new(AudioOutputConfig::from(&config.audio)) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            warn!("Audio engine unavailable, continuing silently: {}", e);
            Arc::new(NullAudioEngine)
        }
    }
}

fn build_speech(args: &Args, config: &TomlConfig) -> Arc<dyn SpeechEngine> {
    if args.no_speech || !config.speech.enabled {
        info!("Speech disabled");
        return Arc::new(NullSpeechEngine);
    }

    Arc::new(EspeakSpeechEngine::new(
        config.speech.program.clone(),
        VoiceProfile::from(&config.speech),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging starts so its level can apply
    let loaded = TomlConfig::load_or_default(args.config.as_deref());
    let config_level = loaded
        .as_ref()
        .map(|config| config.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(log_filter(&args, &config_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = loaded.context("Failed to load configuration")?;
    match resolve_config_path(args.config.as_deref()) {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        _ => info!("Configuration: built-in defaults"),
    }
    if let Some(settle) = args.settle_delay_ms {
        config.settle_delay_ms = settle;
    }

    let script = match resolve_script_path(args.script.as_deref(), &config) {
        Some(path) => Script::load(&path)
            .with_context(|| format!("Failed to load script {}", path.display()))?,
        None => Script::builtin().context("Built-in script is invalid")?,
    };
    info!(
        "Script '{}': {} segments, {}ms",
        script.title(),
        script.len(),
        script.total_duration_ms()
    );

    let scheduler = Scheduler::new(
        Arc::new(script),
        SchedulerConfig::from(&config),
        build_audio(&args, &config),
        build_speech(&args, &config),
        EventBus::default(),
    );

    let stdout = std::io::stdout();
    let ansi = stdout.is_terminal() && !args.json;
    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let mut presenter = Presenter::new(stdout, mode, ansi);
    let options = SessionOptions {
        autoplay: args.autoplay,
        exit_on_complete: args.exit_on_complete,
    };

    tokio::select! {
        result = run_session(&scheduler, BufReader::new(tokio::io::stdin()), &mut presenter, options) => {
            result.context("Presentation failed")?;
        }
        _ = signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    scheduler.shutdown();
    info!("Knock player stopped");
    Ok(())
}
