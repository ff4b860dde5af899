//! # Knock Common Library
//!
//! Shared code for the Knock narrative player:
//! - Script model (segments, cues) and TOML script loading
//! - Playback event types and the EventBus
//! - Bootstrap configuration loading
//! - Time utilities

pub mod config;
pub mod error;
pub mod events;
pub mod script;
pub mod time;

pub use error::{Error, Result};
pub use script::{Cue, Script, Segment, SegmentKind};
