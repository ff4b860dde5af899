//! Test helpers for knock-player integration tests
//!
//! - RecordingAudioEngine / RecordingSpeechEngine: engines that record every
//!   call instead of touching devices or processes
//! - Script builders for the small timelines used across tests
//! - Virtual-time helpers (tests run with `start_paused = true`)

#![allow(dead_code)]

use async_trait::async_trait;
use knock_common::events::{EventBus, PlaybackEvent};
use knock_common::{Cue, Script, Segment, SegmentKind};
use knock_player::audio::AudioEngine;
use knock_player::speech::SpeechEngine;
use knock_player::{Error, Result, Scheduler, SchedulerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCall {
    EnsureReady,
    Render(Cue),
    Close,
}

/// Audio engine that records calls; warm-up can be slowed down or failed
#[derive(Default)]
pub struct RecordingAudioEngine {
    calls: Mutex<Vec<AudioCall>>,
    fail_warmup: bool,
    warmup_delay: Duration,
}

impl RecordingAudioEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_warmup: true,
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            warmup_delay: delay,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<AudioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rendered(&self) -> Vec<Cue> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                AudioCall::Render(cue) => Some(cue),
                _ => None,
            })
            .collect()
    }

    pub fn warmups(&self) -> usize {
        self.count(&AudioCall::EnsureReady)
    }

    pub fn closes(&self) -> usize {
        self.count(&AudioCall::Close)
    }

    fn count(&self, wanted: &AudioCall) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }
}

#[async_trait]
impl AudioEngine for RecordingAudioEngine {
    async fn ensure_ready(&self) -> Result<()> {
        self.calls.lock().unwrap().push(AudioCall::EnsureReady);
        if !self.warmup_delay.is_zero() {
            tokio::time::sleep(self.warmup_delay).await;
        }
        if self.fail_warmup {
            return Err(Error::AudioUnavailable("test engine".to_string()));
        }
        Ok(())
    }

    fn render_cue(&self, cue: Cue) {
        self.calls.lock().unwrap().push(AudioCall::Render(cue));
    }

    fn close(&self) {
        self.calls.lock().unwrap().push(AudioCall::Close);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechCall {
    Speak(String),
    Cancel,
}

#[derive(Default)]
pub struct RecordingSpeechEngine {
    calls: Mutex<Vec<SpeechCall>>,
}

impl RecordingSpeechEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SpeechCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SpeechCall::Speak(text) => Some(text),
                SpeechCall::Cancel => None,
            })
            .collect()
    }

    pub fn cancels(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == SpeechCall::Cancel)
            .count()
    }
}

impl SpeechEngine for RecordingSpeechEngine {
    fn speak(&self, text: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(SpeechCall::Speak(text.to_string()));
    }

    fn cancel(&self) {
        self.calls.lock().unwrap().push(SpeechCall::Cancel);
    }
}

/// Scheduler over recording engines plus handles to inspect them
pub struct Harness {
    pub scheduler: Scheduler,
    pub audio: Arc<RecordingAudioEngine>,
    pub speech: Arc<RecordingSpeechEngine>,
    pub events: broadcast::Receiver<PlaybackEvent>,
}

impl Harness {
    pub fn new(script: Script, settle_ms: u64) -> Self {
        Self::with_audio(script, settle_ms, RecordingAudioEngine::new())
    }

    pub fn with_audio(script: Script, settle_ms: u64, audio: Arc<RecordingAudioEngine>) -> Self {
        Self::with_config(
            script,
            SchedulerConfig {
                settle_delay: Duration::from_millis(settle_ms),
                ..SchedulerConfig::default()
            },
            audio,
        )
    }

    pub fn with_config(
        script: Script,
        config: SchedulerConfig,
        audio: Arc<RecordingAudioEngine>,
    ) -> Self {
        let speech = RecordingSpeechEngine::new();
        let bus = EventBus::default();
        let events = bus.subscribe();
        let scheduler = Scheduler::new(
            Arc::new(script),
            config,
            audio.clone(),
            speech.clone(),
            bus,
        );
        Self {
            scheduler,
            audio,
            speech,
            events,
        }
    }

    /// Events received so far
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn visible(&self) -> Vec<String> {
        self.scheduler.snapshot().visible_ids
    }
}

/// A (delay 100, speaks), B (delay 50, knock-soft), C (delay 0)
pub fn abc_script() -> Script {
    Script::new(
        "abc",
        Some("The end.".to_string()),
        vec![
            Segment::new("A", SegmentKind::Voice, 100)
                .with_text("“Hello?”")
                .with_speak(true),
            Segment::new("B", SegmentKind::Sound, 50)
                .with_text("Knock.")
                .with_cue(Cue::KnockSoft),
            Segment::new("C", SegmentKind::Visual, 0).with_text("The door."),
        ],
    )
    .unwrap()
}

/// Single silent segment: no speech, no cue
pub fn silent_script() -> Script {
    Script::new(
        "silent",
        None,
        vec![Segment::new("X", SegmentKind::Voice, 0).with_text("Nothing.")],
    )
    .unwrap()
}

/// Sleep until `ms` after `origin` on the (paused) tokio clock
pub async fn at(origin: Instant, ms: u64) {
    tokio::time::sleep_until(origin + Duration::from_millis(ms)).await;
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
