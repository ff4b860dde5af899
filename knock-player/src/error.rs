//! Error types for knock-player
//!
//! None of these ever reach the audience: engine failures degrade to
//! "the effect silently did not happen" and are only logged.

use thiserror::Error;

/// Main error type for the player crate
#[derive(Error, Debug)]
pub enum Error {
    /// Script, config or event layer errors
    #[error(transparent)]
    Common(#[from] knock_common::Error),

    /// Audio output device errors (device lookup, stream build/start)
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// No audio output capability in this environment
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Output context already released; it is never reacquired
    #[error("Audio output context closed")]
    AudioClosed,

    /// Speech backend errors
    #[error("Speech error: {0}")]
    Speech(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File or terminal I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
