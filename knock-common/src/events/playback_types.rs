//! Playback-related type definitions

use serde::{Deserialize, Serialize};

/// Observable phase of the player
///
/// Cancellation has no phase of its own: a cancelled run reads as `Idle`
/// until the next `start()` re-enters `Running`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerPhase {
    Idle,
    Running,
    Complete,
}

impl PlayerPhase {
    /// Derive the phase from the two PlaybackState flags
    pub fn from_flags(is_playing: bool, is_complete: bool) -> Self {
        if is_playing {
            PlayerPhase::Running
        } else if is_complete {
            PlayerPhase::Complete
        } else {
            PlayerPhase::Idle
        }
    }
}

impl std::fmt::Display for PlayerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerPhase::Idle => write!(f, "idle"),
            PlayerPhase::Running => write!(f, "running"),
            PlayerPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Why a run stopped before completing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Replay requested while the run was in flight
    Replay,
    /// `start()` called again without an intervening `cancel()`
    Superseded,
    /// Explicit `cancel()` call
    Requested,
    /// Player teardown
    Shutdown,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Replay => write!(f, "replay"),
            CancelReason::Superseded => write!(f, "superseded"),
            CancelReason::Requested => write!(f, "requested"),
            CancelReason::Shutdown => write!(f, "shutdown"),
        }
    }
}
