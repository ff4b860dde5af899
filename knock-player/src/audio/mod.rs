//! Audio engine: one output context, procedural cues
//!
//! The scheduler only ever asks for "render cue C now". How a cue sounds is
//! decided by [`cues`]; where it is heard is decided by the output context in
//! [`output`].

pub mod cues;
pub mod envelope;
pub mod output;
pub mod types;

pub use output::{AudioOutputConfig, CpalAudioEngine};
pub use types::AudioFrame;

use crate::error::{Error, Result};
use async_trait::async_trait;
use knock_common::Cue;
use tracing::trace;

/// Audio engine seam used by the scheduler and dispatcher
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Make sure the output context exists and is running
    ///
    /// Creates the context on first use and resumes it if suspended.
    /// Idempotent. Callers swallow failures.
    async fn ensure_ready(&self) -> Result<()>;

    /// Start the cue's waveform at the current output-context time
    ///
    /// Fire-and-forget: nothing is reported back.
    fn render_cue(&self, cue: Cue);

    /// Release the output context; it is never reacquired afterwards
    fn close(&self);
}

/// Engine for environments without audio output
///
/// Every warm-up fails, so every cue is skipped and the timeline runs
/// silently.
#[derive(Debug, Default)]
pub struct NullAudioEngine;

#[async_trait]
impl AudioEngine for NullAudioEngine {
    async fn ensure_ready(&self) -> Result<()> {
        Err(Error::AudioUnavailable("audio output disabled".to_string()))
    }

    fn render_cue(&self, cue: Cue) {
        trace!("Audio disabled, dropping cue {}", cue);
    }

    fn close(&self) {}
}
