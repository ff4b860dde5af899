//! # Knock Player Library (knock-player)
//!
//! Plays a fixed narrative timeline: text reveal, synthesized speech and
//! procedural sound cues, in lock-step with a progress value.
//!
//! **Architecture:**
//! - [`playback::Scheduler`] turns the script into a timer plan and drives it
//!   with one cancellable task per run
//! - Engine calls leave the timeline as [`playback::EngineCommand`] messages,
//!   handled by a dispatcher task that never reports back
//! - [`audio`] owns the single output context (cpal) and the cue synthesizer
//! - [`speech`] owns the single active utterance
//! - [`presentation`] renders snapshots and events to the terminal

pub mod audio;
pub mod error;
pub mod playback;
pub mod presentation;
pub mod speech;
pub mod state;

pub use error::{Error, Result};
pub use playback::{Scheduler, SchedulerConfig};
pub use state::{PlaybackSnapshot, PlaybackState};
