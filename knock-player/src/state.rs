//! Playback state owned by the scheduler
//!
//! One `PlaybackState` lives behind a mutex inside the scheduler. Every timer
//! firing, completion and cancellation is a single critical section over it,
//! so a firing is atomic with respect to cancellation. The presentation layer
//! only ever sees [`PlaybackSnapshot`] copies.

use knock_common::events::PlayerPhase;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identifies one outstanding timer of the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerId {
    /// Timer for the segment at this script index
    Segment(usize),
    /// Terminal timer armed after the last segment fires
    Settle,
}

/// Mutable state of the current (or most recent) run
#[derive(Debug, Default)]
pub struct PlaybackState {
    /// Revealed segment ids in firing order, never duplicated
    visible_ids: Vec<String>,

    /// Ratio in [0, 1], monotonic within a run
    progress: f64,

    is_playing: bool,
    is_complete: bool,

    /// Timers of the current run that have not fired yet
    pending_timers: BTreeSet<TimerId>,

    /// Run whose timers may still mutate this state; `None` once cancelled
    active_run: Option<u64>,

    /// Most recently started run (0 before the first start)
    last_run: u64,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new run and arm one timer per segment
    pub(crate) fn begin_run(&mut self, run_id: u64, segment_count: usize) {
        self.visible_ids.clear();
        self.progress = 0.0;
        self.is_playing = true;
        self.is_complete = false;
        self.pending_timers = (0..segment_count).map(TimerId::Segment).collect();
        if segment_count == 0 {
            self.pending_timers.insert(TimerId::Settle);
        }
        self.active_run = Some(run_id);
        self.last_run = run_id;
    }

    /// True if timers of `run_id` may still mutate this state
    pub(crate) fn accepts(&self, run_id: u64) -> bool {
        self.active_run == Some(run_id)
    }

    /// Mark a timer as fired
    pub(crate) fn disarm(&mut self, timer: TimerId) {
        self.pending_timers.remove(&timer);
    }

    pub(crate) fn arm(&mut self, timer: TimerId) {
        self.pending_timers.insert(timer);
    }

    /// Append a segment id unless already visible; returns whether it was added
    pub(crate) fn reveal(&mut self, id: &str) -> bool {
        if self.visible_ids.iter().any(|visible| visible == id) {
            return false;
        }
        self.visible_ids.push(id.to_string());
        true
    }

    /// Raise progress; never lowers it within a run
    pub(crate) fn advance_progress(&mut self, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        if progress > self.progress {
            self.progress = progress;
        }
    }

    pub(crate) fn complete(&mut self) {
        self.pending_timers.clear();
        self.is_complete = true;
        self.is_playing = false;
    }

    /// Invalidate the active run; returns it if it was still playing
    ///
    /// Visible ids, progress and the completion flag are left for the next
    /// `begin_run` to reset.
    pub(crate) fn cancel(&mut self) -> Option<u64> {
        self.pending_timers.clear();
        let run = self.active_run.take();
        let was_playing = std::mem::replace(&mut self.is_playing, false);
        run.filter(|_| was_playing)
    }

    pub fn visible_ids(&self) -> &[String] {
        &self.visible_ids
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn pending_timers(&self) -> &BTreeSet<TimerId> {
        &self.pending_timers
    }

    pub fn active_run(&self) -> Option<u64> {
        self.active_run
    }

    pub fn phase(&self) -> PlayerPhase {
        PlayerPhase::from_flags(self.is_playing, self.is_complete)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            run_id: self.last_run,
            visible_ids: self.visible_ids.clone(),
            progress: self.progress,
            is_playing: self.is_playing,
            is_complete: self.is_complete,
            pending_timers: self.pending_timers.len(),
            phase: self.phase(),
        }
    }
}

/// Read-only copy of the playback state handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    /// Most recently started run (0 before the first start)
    pub run_id: u64,
    pub visible_ids: Vec<String>,
    pub progress: f64,
    pub is_playing: bool,
    pub is_complete: bool,
    /// Number of timers still armed
    pub pending_timers: usize,
    pub phase: PlayerPhase,
}

/// Lock a mutex, recovering the data if a holder panicked
///
/// Every critical section in this crate leaves the data consistent before
/// any call that could panic, so a poisoned lock is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let state = PlaybackState::new();
        assert!(state.visible_ids().is_empty());
        assert_eq!(state.progress(), 0.0);
        assert!(!state.is_playing());
        assert!(!state.is_complete());
        assert_eq!(state.phase(), PlayerPhase::Idle);
        assert_eq!(state.snapshot().run_id, 0);
    }

    #[test]
    fn test_begin_run_resets_and_arms_timers() {
        let mut state = PlaybackState::new();
        state.begin_run(1, 3);
        state.reveal("a");
        state.advance_progress(0.5);
        state.complete();

        state.begin_run(2, 3);
        assert!(state.visible_ids().is_empty());
        assert_eq!(state.progress(), 0.0);
        assert!(state.is_playing());
        assert!(!state.is_complete());
        assert_eq!(state.pending_timers().len(), 3);
        assert!(state.accepts(2));
        assert!(!state.accepts(1));
    }

    #[test]
    fn test_empty_run_arms_settle_timer() {
        let mut state = PlaybackState::new();
        state.begin_run(1, 0);
        assert!(state.pending_timers().contains(&TimerId::Settle));
    }

    #[test]
    fn test_reveal_is_idempotent() {
        let mut state = PlaybackState::new();
        state.begin_run(1, 2);
        assert!(state.reveal("a"));
        assert!(!state.reveal("a"));
        assert!(state.reveal("b"));
        assert_eq!(state.visible_ids(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut state = PlaybackState::new();
        state.begin_run(1, 4);
        state.advance_progress(0.5);
        state.advance_progress(0.25);
        assert_eq!(state.progress(), 0.5);
        state.advance_progress(7.0);
        assert_eq!(state.progress(), 1.0);
    }

    #[test]
    fn test_cancel_keeps_visible_ids_and_progress() {
        let mut state = PlaybackState::new();
        state.begin_run(4, 3);
        state.reveal("a");
        state.disarm(TimerId::Segment(0));
        state.advance_progress(1.0 / 3.0);

        assert_eq!(state.cancel(), Some(4));
        assert!(state.pending_timers().is_empty());
        assert!(!state.is_playing());
        assert!(!state.accepts(4));
        assert_eq!(state.visible_ids().len(), 1);
        assert!(state.progress() > 0.0);

        // Second cancel is a no-op
        assert_eq!(state.cancel(), None);
    }

    #[test]
    fn test_cancel_after_completion_reports_nothing() {
        let mut state = PlaybackState::new();
        state.begin_run(1, 1);
        state.complete();
        assert_eq!(state.cancel(), None);
        assert!(state.is_complete());
        assert_eq!(state.phase(), PlayerPhase::Complete);
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(PlaybackState::new()));
        let poisoner = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert!(!lock(&mutex).is_playing());
    }
}
