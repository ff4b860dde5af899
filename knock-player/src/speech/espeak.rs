//! espeak-ng subprocess backend
//!
//! Each utterance is one child process. The child handle is the single
//! active utterance: speaking again or cancelling kills it first.

use crate::speech::{SpeechEngine, VoiceProfile};
use crate::state::lock;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Command-line arguments for one utterance
///
/// Maps the profile onto espeak's units: pitch 0-99 (50 normal), speed in
/// words per minute (175 normal), amplitude 0-200 (100 normal).
pub fn build_args(profile: &VoiceProfile, text: &str) -> Vec<String> {
    let pitch = (profile.pitch * 50.0).round().clamp(0.0, 99.0) as u32;
    let speed = (profile.rate * 175.0).round().clamp(80.0, 450.0) as u32;
    let amplitude = (profile.volume * 100.0).round().clamp(0.0, 200.0) as u32;

    vec![
        "-v".to_string(),
        profile.voice.clone(),
        "-p".to_string(),
        pitch.to_string(),
        "-s".to_string(),
        speed.to_string(),
        "-a".to_string(),
        amplitude.to_string(),
        "--".to_string(),
        text.to_string(),
    ]
}

pub struct EspeakSpeechEngine {
    program: String,
    profile: VoiceProfile,
    current: Mutex<Option<Child>>,
    available: AtomicBool,
}

impl EspeakSpeechEngine {
    pub fn new(program: impl Into<String>, profile: VoiceProfile) -> Self {
        Self {
            program: program.into(),
            profile,
            current: Mutex::new(None),
            available: AtomicBool::new(true),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// True while an utterance process is still running
    pub fn is_speaking(&self) -> bool {
        match lock(&self.current).as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

fn stop_child(slot: &mut Option<Child>) {
    if let Some(mut child) = slot.take() {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Err(e) = child.kill() {
            debug!("Failed to stop utterance: {}", e);
        }
        let _ = child.wait();
    }
}

impl SpeechEngine for EspeakSpeechEngine {
    fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() || !self.is_available() {
            return;
        }

        let mut current = lock(&self.current);
        stop_child(&mut current);

        let spawned = Command::new(&self.program)
            .args(build_args(&self.profile, text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                debug!("Speaking {:?} (pid {})", text, child.id());
                *current = Some(child);
            }
            Err(e) => {
                if self.available.swap(false, Ordering::SeqCst) {
                    warn!(
                        "Speech program '{}' unavailable, speech disabled: {}",
                        self.program, e
                    );
                }
            }
        }
    }

    fn cancel(&self) {
        stop_child(&mut lock(&self.current));
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

impl Drop for EspeakSpeechEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_args() {
        let args = build_args(&VoiceProfile::default(), "I know you're inside…");
        assert_eq!(
            args,
            vec!["-v", "hi", "-p", "38", "-s", "140", "-a", "95", "--", "I know you're inside…"]
        );
    }

    #[test]
    fn test_args_are_clamped() {
        let profile = VoiceProfile {
            voice: "en".to_string(),
            pitch: 4.0,
            rate: 0.1,
            volume: 3.0,
        };
        let args = build_args(&profile, "x");
        assert_eq!(&args[2..8], &["-p", "99", "-s", "80", "-a", "200"]);
    }

    #[test]
    fn test_missing_program_disables_speech() {
        let engine = EspeakSpeechEngine::new("knock-no-such-synth", VoiceProfile::default());
        assert!(engine.is_available());

        engine.speak("   ");
        assert!(engine.is_available());

        engine.speak("Knock knock.");
        assert!(!engine.is_available());
        assert!(!engine.is_speaking());

        // Still harmless afterwards
        engine.speak("Knock knock.");
        engine.cancel();
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_reaps_utterance() {
        let engine = EspeakSpeechEngine::new("true", VoiceProfile::default());
        engine.speak("Hello");
        assert!(engine.is_available());
        engine.cancel();
        assert!(!engine.is_speaking());
    }
}
