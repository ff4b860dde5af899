//! Timer plan
//!
//! The script's inter-segment delays are folded into absolute offsets once,
//! up front. The driver then only has to sleep until each entry's offset,
//! so audio or speech latency can never shift later firings.

use knock_common::time::millis_to_duration;
use knock_common::Script;
use std::time::Duration;

/// One armed timer: fire the segment at `index` at `offset` after run start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEntry {
    pub index: usize,
    pub offset: Duration,
}

/// Ordered (offset, segment) pairs plus the settle delay
///
/// Entries are in script order. Offsets are non-decreasing because delays
/// are non-negative; equal offsets keep script order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerPlan {
    entries: Vec<PlanEntry>,
    settle_delay: Duration,
}

impl TimerPlan {
    pub fn build(script: &Script, settle_delay: Duration) -> Self {
        let entries = script
            .cumulative_offsets()
            .into_iter()
            .enumerate()
            .map(|(index, offset_ms)| PlanEntry {
                index,
                offset: millis_to_duration(offset_ms),
            })
            .collect();

        Self {
            entries,
            settle_delay,
        }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.entries.len()
    }

    /// Progress after the segment at `index` has fired
    pub fn progress_after(&self, index: usize) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        (index + 1) as f64 / self.entries.len() as f64
    }

    /// Planned completion time of an undisturbed run
    pub fn completion_offset(&self) -> Duration {
        self.entries
            .last()
            .map(|entry| entry.offset)
            .unwrap_or_default()
            + self.settle_delay
    }
}
