//! Playback scheduling
//!
//! - [`plan`]: absolute firing offsets computed once per run
//! - [`scheduler`]: start / cancel / shutdown and the per-run driver task
//! - [`commands`]: engine commands and the dispatcher that executes them

pub mod commands;
pub mod plan;
pub mod scheduler;

pub use commands::EngineCommand;
pub use plan::{PlanEntry, TimerPlan};
pub use scheduler::{Scheduler, SchedulerConfig};
