//! Playback scheduler
//!
//! Turns the script into a [`TimerPlan`] and drives it with one tokio task
//! per run. Each firing is a single critical section over the shared
//! [`PlaybackState`]; `cancel()` invalidates the run inside the same lock,
//! so once it returns no timer of that run can touch the state again.
//!
//! **Lock order:** driver slot, then playback state. The dispatcher and the
//! driver task only ever take the playback state.

use crate::audio::AudioEngine;
use crate::playback::commands::{spawn_dispatcher, EngineCommand};
use crate::playback::plan::{PlanEntry, TimerPlan};
use crate::speech::SpeechEngine;
use crate::state::{lock, PlaybackSnapshot, PlaybackState, TimerId};
use knock_common::config::TomlConfig;
use knock_common::events::{CancelReason, EventBus, PlaybackEvent};
use knock_common::time::millis_to_duration;
use knock_common::Script;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// Timing knobs of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause after the last segment before the run is complete
    pub settle_delay: Duration,
    /// Longest wait for audio warm-up before the first firing
    pub warmup_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(800),
            warmup_timeout: Duration::from_millis(2000),
        }
    }
}

impl From<&TomlConfig> for SchedulerConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            settle_delay: millis_to_duration(config.settle_delay_ms),
            warmup_timeout: millis_to_duration(config.warmup_timeout_ms),
        }
    }
}

/// Drives runs of one script
///
/// Must be created inside a tokio runtime: the engine command dispatcher is
/// spawned on construction.
pub struct Scheduler {
    script: Arc<Script>,
    config: SchedulerConfig,
    state: Arc<Mutex<PlaybackState>>,
    audio: Arc<dyn AudioEngine>,
    speech: Arc<dyn SpeechEngine>,
    events: EventBus,
    commands: mpsc::UnboundedSender<EngineCommand>,
    /// Driver task of the current run
    driver: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    last_run: AtomicU64,
    shut_down: AtomicBool,
}

impl Scheduler {
    pub fn new(
        script: Arc<Script>,
        config: SchedulerConfig,
        audio: Arc<dyn AudioEngine>,
        speech: Arc<dyn SpeechEngine>,
        events: EventBus,
    ) -> Self {
        let state = Arc::new(Mutex::new(PlaybackState::new()));
        let (commands, rx) = mpsc::unbounded_channel();
        let dispatcher = spawn_dispatcher(
            rx,
            Arc::clone(&state),
            Arc::clone(&audio),
            Arc::clone(&speech),
        );

        info!(
            "Scheduler ready: '{}' ({} segments, settle {}ms)",
            script.title(),
            script.len(),
            config.settle_delay.as_millis()
        );

        Self {
            script,
            config,
            state,
            audio,
            speech,
            events,
            commands,
            driver: Mutex::new(None),
            dispatcher: Mutex::new(Some(dispatcher)),
            last_run: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Begin a new run from the first segment
    ///
    /// A run still in flight is superseded: its timers are invalidated and
    /// its driver aborted before the new run is armed. Returns the new run
    /// id, or `None` after [`Scheduler::shutdown`].
    pub fn start(&self) -> Option<u64> {
        if self.shut_down.load(Ordering::SeqCst) {
            warn!("start() called after shutdown, ignoring");
            return None;
        }

        let mut driver = lock(&self.driver);
        let run_id = self.last_run.fetch_add(1, Ordering::SeqCst) + 1;
        let plan = TimerPlan::build(&self.script, self.config.settle_delay);

        {
            let mut state = lock(&self.state);
            if let Some(previous) = state.cancel() {
                warn!("Run {} superseded by run {}", previous, run_id);
                self.events.emit_lossy(PlaybackEvent::RunCancelled {
                    run_id: previous,
                    reason: CancelReason::Superseded,
                    revealed: state.visible_ids().len(),
                    timestamp: knock_common::time::now(),
                });
            }

            state.begin_run(run_id, plan.len());
            self.events.emit_lossy(PlaybackEvent::RunStarted {
                run_id,
                segment_count: plan.len(),
                total_duration_ms: self.script.total_duration_ms(),
                timestamp: knock_common::time::now(),
            });
        }

        if let Some(handle) = driver.take() {
            handle.abort();
        }
        self.speech.cancel();

        let audio = Arc::clone(&self.audio);
        let warmup = tokio::spawn(async move { audio.ensure_ready().await });

        let run = Driver {
            run_id,
            origin: Instant::now(),
            plan,
            script: Arc::clone(&self.script),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            commands: self.commands.clone(),
        };
        *driver = Some(tokio::spawn(run.run(warmup, self.config.warmup_timeout)));

        info!(
            "Run {} started ({} segments)",
            run_id,
            self.script.len()
        );
        Some(run_id)
    }

    /// Cancel the current run, if any
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Requested);
    }

    /// Cancel the current run, recording why
    ///
    /// Clears every pending timer, drops queued engine commands of the run
    /// and stops speech. Visible segments, progress and the completion flag
    /// are left as they were. Safe to call from any state, any number of
    /// times.
    pub fn cancel_with(&self, reason: CancelReason) {
        let mut driver = lock(&self.driver);
        {
            let mut state = lock(&self.state);
            if let Some(run_id) = state.cancel() {
                info!("Run {} cancelled ({})", run_id, reason);
                self.events.emit_lossy(PlaybackEvent::RunCancelled {
                    run_id,
                    reason,
                    revealed: state.visible_ids().len(),
                    timestamp: knock_common::time::now(),
                });
            }
        }

        if let Some(handle) = driver.take() {
            handle.abort();
        }
        self.speech.cancel();
    }

    /// Cancel and release the audio output context for good
    ///
    /// Idempotent. Later calls to `start()` are ignored.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel_with(CancelReason::Shutdown);
        self.audio.close();
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
        info!("Scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        lock(&self.state).snapshot()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).is_playing()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything one run's driver task needs
struct Driver {
    run_id: u64,
    /// Run start; plan offsets are measured from here
    origin: Instant,
    plan: TimerPlan,
    script: Arc<Script>,
    state: Arc<Mutex<PlaybackState>>,
    events: EventBus,
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl Driver {
    async fn run(
        self,
        warmup: JoinHandle<crate::Result<()>>,
        warmup_timeout: Duration,
    ) {
        let mut warmup = Some(warmup);

        for entry in self.plan.entries() {
            sleep_until(self.origin + entry.offset).await;

            if let Some(pending) = warmup.take() {
                await_warmup(pending, warmup_timeout).await;
            }

            if !self.fire(entry) {
                return;
            }
        }

        sleep(self.plan.settle_delay()).await;
        self.settle();
    }

    /// Apply one segment firing; false once the run is no longer active
    fn fire(&self, entry: &PlanEntry) -> bool {
        let Some(segment) = self.script.get(entry.index) else {
            return false;
        };

        let mut state = lock(&self.state);
        if !state.accepts(self.run_id) {
            return false;
        }

        state.disarm(TimerId::Segment(entry.index));
        let revealed = state.reveal(&segment.id);

        if let Some(cue) = segment.cue_to_render() {
            self.send(EngineCommand::RenderCue {
                run_id: self.run_id,
                cue,
            });
        }
        if let Some(text) = segment.speech_text() {
            self.send(EngineCommand::Speak {
                run_id: self.run_id,
                text,
            });
        }

        let progress = self.plan.progress_after(entry.index);
        state.advance_progress(progress);

        if self.plan.is_last(entry.index) {
            state.arm(TimerId::Settle);
        }

        let offset_ms = entry.offset.as_millis() as u64;
        debug!(
            "Run {}: segment {} '{}' at {}",
            self.run_id,
            entry.index,
            segment.id,
            knock_common::time::format_offset(offset_ms)
        );

        if revealed {
            self.events.emit_lossy(PlaybackEvent::SegmentRevealed {
                run_id: self.run_id,
                index: entry.index,
                segment_id: segment.id.clone(),
                kind: segment.kind,
                text: segment.text.clone(),
                offset_ms,
                timestamp: knock_common::time::now(),
            });
        }
        self.events.emit_lossy(PlaybackEvent::ProgressChanged {
            run_id: self.run_id,
            progress: state.progress(),
            timestamp: knock_common::time::now(),
        });
        true
    }

    fn settle(&self) {
        let mut state = lock(&self.state);
        if !state.accepts(self.run_id) {
            return;
        }

        state.complete();
        self.events.emit_lossy(PlaybackEvent::RunCompleted {
            run_id: self.run_id,
            timestamp: knock_common::time::now(),
        });
        info!("Run {} complete", self.run_id);
    }

    fn send(&self, command: EngineCommand) {
        if self.commands.send(command).is_err() {
            debug!("Engine dispatcher gone, command dropped");
        }
    }
}

/// Wait for audio warm-up, bounded; the outcome never blocks the timeline
async fn await_warmup(warmup: JoinHandle<crate::Result<()>>, limit: Duration) {
    match timeout(limit, warmup).await {
        Ok(Ok(Ok(()))) => debug!("Audio warm-up complete"),
        Ok(Ok(Err(e))) => debug!("Audio warm-up failed, continuing silently: {}", e),
        Ok(Err(e)) => debug!("Audio warm-up task ended abnormally: {}", e),
        Err(_) => warn!("Audio warm-up exceeded {}ms, continuing", limit.as_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudioEngine;
    use crate::speech::NullSpeechEngine;

    fn scheduler(script: Script, settle_ms: u64) -> Scheduler {
        Scheduler::new(
            Arc::new(script),
            SchedulerConfig {
                settle_delay: Duration::from_millis(settle_ms),
                ..SchedulerConfig::default()
            },
            Arc::new(NullAudioEngine),
            Arc::new(NullSpeechEngine),
            EventBus::default(),
        )
    }

    #[test]
    fn test_config_from_toml() {
        let toml = TomlConfig {
            settle_delay_ms: 250,
            warmup_timeout_ms: 40,
            ..TomlConfig::default()
        };
        let config = SchedulerConfig::from(&toml);
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.warmup_timeout, Duration::from_millis(40));
        assert_eq!(
            SchedulerConfig::from(&TomlConfig::default()),
            SchedulerConfig::default()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ids_increase() {
        let scheduler = scheduler(Script::builtin().unwrap(), 800);
        assert_eq!(scheduler.start(), Some(1));
        assert_eq!(scheduler.start(), Some(2));
        assert_eq!(scheduler.snapshot().run_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_script_completes_after_settle() {
        let scheduler = scheduler(Script::new("empty", None, Vec::new()).unwrap(), 800);
        scheduler.start();

        sleep(Duration::from_millis(799)).await;
        assert!(scheduler.snapshot().is_playing);

        sleep(Duration::from_millis(2)).await;
        let snapshot = scheduler.snapshot();
        assert!(snapshot.is_complete);
        assert_eq!(snapshot.progress, 0.0);
        assert_eq!(snapshot.pending_timers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_shutdown_is_ignored() {
        let scheduler = scheduler(Script::builtin().unwrap(), 800);
        scheduler.shutdown();
        scheduler.shutdown();
        assert!(scheduler.is_shut_down());
        assert_eq!(scheduler.start(), None);
        assert!(!scheduler.snapshot().is_playing);
    }
}
