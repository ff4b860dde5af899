//! Bootstrap configuration loading
//!
//! Configuration is read once at startup from a TOML file and never changes
//! while running. Sources are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`<config dir>/knock/config.toml`)
//! 4. Built-in defaults
//!
//! A missing config file is never fatal: the player warns and runs with
//! defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "KNOCK_CONFIG";

/// Environment variable naming an alternate script file
pub const SCRIPT_ENV_VAR: &str = "KNOCK_SCRIPT";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Pause after the last segment before the run is marked complete (ms)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Upper bound on waiting for audio warm-up before the first firing (ms)
    #[serde(default = "default_warmup_timeout_ms")]
    pub warmup_timeout_ms: u64,

    /// Alternate script file (built-in script when absent)
    #[serde(default)]
    pub script: Option<PathBuf>,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Audio output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Output device name (default device when absent or not found)
    #[serde(default)]
    pub device: Option<String>,

    /// Master volume (0.0-1.0)
    #[serde(default = "default_audio_volume")]
    pub volume: f32,
}

/// Speech backend configuration
///
/// Pitch, rate and volume use the browser-style scale (1.0 = normal) and
/// are mapped onto the backend's own units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Speech synthesizer executable
    #[serde(default = "default_speech_program")]
    pub program: String,

    /// Voice / locale identifier
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_pitch")]
    pub pitch: f32,

    #[serde(default = "default_rate")]
    pub rate: f32,

    #[serde(default = "default_speech_volume")]
    pub volume: f32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_settle_delay_ms() -> u64 {
    800
}

fn default_warmup_timeout_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_audio_volume() -> f32 {
    0.9
}

fn default_speech_program() -> String {
    "espeak-ng".to_string()
}

fn default_voice() -> String {
    "hi".to_string()
}

fn default_pitch() -> f32 {
    0.75
}

fn default_rate() -> f32 {
    0.8
}

fn default_speech_volume() -> f32 {
    0.95
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            warmup_timeout_ms: default_warmup_timeout_ms(),
            script: None,
            audio: AudioConfig::default(),
            speech: SpeechConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            volume: default_audio_volume(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_speech_program(),
            voice: default_voice(),
            pitch: default_pitch(),
            rate: default_rate(),
            volume: default_speech_volume(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML source and normalize ranges
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mut config: TomlConfig =
            toml::from_str(source).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.normalize();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Resolve and load configuration, falling back to defaults
    ///
    /// Only a config file that exists but cannot be parsed is an error.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                info!("No config file, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Clamp values that have a fixed valid range
    fn normalize(&mut self) {
        if !(0.0..=1.0).contains(&self.audio.volume) {
            warn!("audio.volume {} out of range, clamping", self.audio.volume);
            self.audio.volume = self.audio.volume.clamp(0.0, 1.0);
        }
        if !(0.0..=1.0).contains(&self.speech.volume) {
            warn!("speech.volume {} out of range, clamping", self.speech.volume);
            self.speech.volume = self.speech.volume.clamp(0.0, 1.0);
        }
        self.speech.pitch = self.speech.pitch.clamp(0.0, 2.0);
        self.speech.rate = self.speech.rate.clamp(0.1, 10.0);
    }
}

/// Resolve the config file path by priority (CLI, environment, user file)
///
/// Returns `None` when no source names a file and the user config file
/// does not exist.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config file, only if present
    default_config_path().filter(|path| path.exists())
}

/// Resolve the script file by priority (CLI, environment, config file)
///
/// `None` means the built-in script.
pub fn resolve_script_path(cli_path: Option<&Path>, config: &TomlConfig) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(SCRIPT_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    config.script.clone()
}

/// Platform config file location: `<config dir>/knock/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("knock").join("config.toml"))
}
