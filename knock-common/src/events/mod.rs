//! Event types for the Knock event system
//!
//! The scheduler publishes one event per observable state change; the
//! presentation layer (and tests) subscribe through the EventBus. Events are
//! notifications only: the authoritative state is the scheduler snapshot.

mod playback_types;

pub use playback_types::{CancelReason, PlayerPhase};

use crate::script::SegmentKind;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback event types
///
/// Serialized with an internal `type` tag for the JSON-lines output mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// A run was armed; all segment timers are scheduled
    RunStarted {
        run_id: u64,
        /// Number of segments in the script
        segment_count: usize,
        /// Offset of the last segment (ms)
        total_duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A segment fired and was appended to the visible set
    SegmentRevealed {
        run_id: u64,
        /// Position of the segment in the script
        index: usize,
        segment_id: String,
        kind: SegmentKind,
        text: String,
        /// Planned offset from run start (ms)
        offset_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress advanced after a firing
    ProgressChanged {
        run_id: u64,
        /// Ratio in [0, 1]
        progress: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Settle delay elapsed after the last segment; the run is complete
    RunCompleted {
        run_id: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The run was cancelled before completing
    RunCancelled {
        run_id: u64,
        reason: CancelReason,
        /// Segments revealed before cancellation
        revealed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlaybackEvent {
    /// Run the event belongs to
    pub fn run_id(&self) -> u64 {
        match self {
            PlaybackEvent::RunStarted { run_id, .. }
            | PlaybackEvent::SegmentRevealed { run_id, .. }
            | PlaybackEvent::ProgressChanged { run_id, .. }
            | PlaybackEvent::RunCompleted { run_id, .. }
            | PlaybackEvent::RunCancelled { run_id, .. } => *run_id,
        }
    }

    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlaybackEvent::RunStarted { .. } => "RunStarted",
            PlaybackEvent::SegmentRevealed { .. } => "SegmentRevealed",
            PlaybackEvent::ProgressChanged { .. } => "ProgressChanged",
            PlaybackEvent::RunCompleted { .. } => "RunCompleted",
            PlaybackEvent::RunCancelled { .. } => "RunCancelled",
        }
    }

    /// True for events that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackEvent::RunCompleted { .. } | PlaybackEvent::RunCancelled { .. }
        )
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the scheduler)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use knock_common::events::{EventBus, PlaybackEvent};
///
/// let event_bus = EventBus::new(64);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlaybackEvent::RunCompleted {
///     run_id: 1,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().run_id(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlaybackEvent,
    ) -> Result<usize, broadcast::error::SendError<PlaybackEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlaybackEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(run_id: u64) -> PlaybackEvent {
        PlaybackEvent::RunCompleted {
            run_id,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        assert!(bus.emit(completed(1)).is_err());

        // Lossy emission never fails
        bus.emit_lossy(completed(1));
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(completed(7)).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.run_id(), 7);
        assert!(received.is_terminal());
    }

    #[test]
    fn test_event_serialization_uses_type_tag() {
        let event = PlaybackEvent::SegmentRevealed {
            run_id: 3,
            index: 0,
            segment_id: "line-1".to_string(),
            kind: SegmentKind::Whisper,
            text: "hello".to_string(),
            offset_ms: 600,
            timestamp: chrono::Utc::now(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["kind"], "whisper");
        assert_eq!(json["offset_ms"], 600);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_cancel_reason_serialization() {
        let event = PlaybackEvent::RunCancelled {
            run_id: 2,
            reason: CancelReason::Superseded,
            revealed: 4,
            timestamp: chrono::Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RunCancelled");
        assert_eq!(json["reason"], "superseded");
    }

    #[test]
    fn test_player_phase_from_flags() {
        assert_eq!(PlayerPhase::from_flags(false, false), PlayerPhase::Idle);
        assert_eq!(PlayerPhase::from_flags(true, false), PlayerPhase::Running);
        assert_eq!(PlayerPhase::from_flags(false, true), PlayerPhase::Complete);
        assert_eq!(PlayerPhase::Running.to_string(), "running");
    }
}
