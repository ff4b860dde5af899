//! Speech engine: at most one utterance at a time
//!
//! Callers hand over already-cleaned text (quotes stripped, trimmed). A new
//! utterance always replaces the current one; there is no queue.

pub mod espeak;

pub use espeak::EspeakSpeechEngine;

use knock_common::config::SpeechConfig;
use tracing::trace;

/// Speech backend seam used by the scheduler and dispatcher
pub trait SpeechEngine: Send + Sync {
    /// Cancel any current utterance, then speak `text`
    ///
    /// Empty or whitespace-only text is a no-op. Failures are swallowed.
    fn speak(&self, text: &str);

    /// Stop the current utterance, if any
    fn cancel(&self);

    /// False once the backend is known to be missing
    fn is_available(&self) -> bool {
        true
    }
}

/// Voice parameters on the browser-style scale (1.0 = normal)
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    /// Voice / locale identifier understood by the backend
    pub voice: String,
    pub pitch: f32,
    pub rate: f32,
    pub volume: f32,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self::from(&SpeechConfig::default())
    }
}

impl From<&SpeechConfig> for VoiceProfile {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            voice: config.voice.clone(),
            pitch: config.pitch,
            rate: config.rate,
            volume: config.volume,
        }
    }
}

/// Speech engine for environments without a synthesizer
#[derive(Debug, Default)]
pub struct NullSpeechEngine;

impl SpeechEngine for NullSpeechEngine {
    fn speak(&self, text: &str) {
        trace!("Speech disabled, dropping utterance {:?}", text);
    }

    fn cancel(&self) {}

    fn is_available(&self) -> bool {
        false
    }
}
