//! Terminal presentation
//!
//! Renders playback events to a writer (stdout in the binary) and binds the
//! Play/Replay control to line input. The presenter never reads playback
//! state on its own; it reacts to events and asks the scheduler for
//! snapshots.

use crate::error::Result;
use crate::playback::Scheduler;
use crate::state::PlaybackSnapshot;
use knock_common::events::{CancelReason, PlayerPhase, PlaybackEvent};
use knock_common::script::SegmentKind;
use knock_common::Script;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub const LABEL_PLAY: &str = "Play The Knock";
pub const LABEL_PLAYING: &str = "Playing…";
pub const LABEL_REPLAY: &str = "Replay Sequence";

const PROGRESS_WIDTH: usize = 24;

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Label of the play control for the given state
pub fn play_label(snapshot: &PlaybackSnapshot) -> &'static str {
    match snapshot.phase {
        PlayerPhase::Running => LABEL_PLAYING,
        PlayerPhase::Complete => LABEL_REPLAY,
        PlayerPhase::Idle => LABEL_PLAY,
    }
}

/// `[#####.......]  42.1%`
pub fn progress_bar(progress: f64, width: usize) -> String {
    let progress = progress.clamp(0.0, 1.0);
    let filled = ((progress * width as f64).round() as usize).min(width);
    format!(
        "[{}{}] {:5.1}%",
        "#".repeat(filled),
        ".".repeat(width - filled),
        progress * 100.0
    )
}

/// One revealed line styled by kind; `None` for pauses
pub fn format_line(kind: SegmentKind, text: &str, ansi: bool) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    let line = match kind {
        SegmentKind::Voice => text.trim().to_string(),
        SegmentKind::Whisper => {
            let inner = text.trim().trim_matches(|c: char| matches!(c, '“' | '”' | '"'));
            let quoted = format!("“{}”", inner);
            if ansi {
                format!("{}{}{}", DIM, quoted, RESET)
            } else {
                quoted
            }
        }
        SegmentKind::Sound => format!("[{}]", text.trim()),
        SegmentKind::Visual => {
            if ansi {
                format!("{}▣ {}{}", BOLD, text.trim(), RESET)
            } else {
                format!("▣ {}", text.trim())
            }
        }
    };
    Some(line)
}

/// Output flavor of the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable lines with a progress bar
    Text,
    /// One JSON object per event
    Json,
}

pub struct Presenter<W: Write> {
    out: W,
    mode: OutputMode,
    ansi: bool,
    /// Final message of the script, printed on completion
    final_text: Option<String>,
    /// Revealed line waiting for its progress update
    pending_line: Option<String>,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W, mode: OutputMode, ansi: bool) -> Self {
        Self {
            out,
            mode,
            ansi,
            final_text: None,
            pending_line: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Title and control hint
    pub fn header(&mut self, script: &Script, snapshot: &PlaybackSnapshot) -> Result<()> {
        self.final_text = script.final_text().map(str::to_string);
        if self.mode == OutputMode::Json {
            return Ok(());
        }

        if self.ansi {
            writeln!(self.out, "{}{}{}", BOLD, script.title(), RESET)?;
        } else {
            writeln!(self.out, "{}", script.title())?;
        }
        self.prompt(snapshot)
    }

    pub fn prompt(&mut self, snapshot: &PlaybackSnapshot) -> Result<()> {
        if self.mode == OutputMode::Text {
            writeln!(
                self.out,
                "Press Enter to {} (q to quit)",
                play_label(snapshot)
            )?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Tell the user the control is disabled right now
    pub fn busy(&mut self) -> Result<()> {
        if self.mode == OutputMode::Text {
            writeln!(self.out, "{}", LABEL_PLAYING)?;
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: &PlaybackEvent) -> Result<()> {
        if self.mode == OutputMode::Json {
            match serde_json::to_string(event) {
                Ok(json) => writeln!(self.out, "{}", json)?,
                Err(e) => warn!("Failed to serialize {}: {}", event.event_type(), e),
            }
            return Ok(self.out.flush()?);
        }

        match event {
            PlaybackEvent::RunStarted { .. } => {
                self.pending_line = None;
                writeln!(self.out)?;
            }
            PlaybackEvent::SegmentRevealed { kind, text, .. } => {
                self.pending_line = format_line(*kind, text, self.ansi);
            }
            PlaybackEvent::ProgressChanged { progress, .. } => {
                if let Some(line) = self.pending_line.take() {
                    writeln!(
                        self.out,
                        "{}  {}",
                        progress_bar(*progress, PROGRESS_WIDTH),
                        line
                    )?;
                }
            }
            PlaybackEvent::RunCompleted { .. } => {
                writeln!(self.out, "{}", progress_bar(1.0, PROGRESS_WIDTH))?;
                if let Some(final_text) = &self.final_text {
                    writeln!(self.out)?;
                    writeln!(self.out, "{}", final_text)?;
                }
                writeln!(self.out)?;
                writeln!(self.out, "Press Enter to {} (q to quit)", LABEL_REPLAY)?;
            }
            PlaybackEvent::RunCancelled { reason, .. } => {
                self.pending_line = None;
                // A replay cancels silently; the new run announces itself
                if !matches!(reason, CancelReason::Replay | CancelReason::Superseded) {
                    writeln!(self.out, "(stopped: {})", reason)?;
                }
            }
        }
        Ok(self.out.flush()?)
    }
}

/// What the play control does when pressed
///
/// Ignored while a run is playing (the control is disabled). Otherwise the
/// previous run is cancelled and a new one started. Returns whether a run
/// was started.
pub fn press_play(scheduler: &Scheduler) -> bool {
    if scheduler.is_playing() {
        debug!("Play pressed while playing, ignored");
        return false;
    }
    scheduler.cancel_with(CancelReason::Replay);
    scheduler.start().is_some()
}

/// Session behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Start one run immediately
    pub autoplay: bool,
    /// Return after the first completed run
    pub exit_on_complete: bool,
}

/// Drive the control and the renderer until the user quits
///
/// Each input line presses the play control; `q` quits. Once input is
/// exhausted the session ends as soon as nothing is playing. The scheduler
/// is shut down before returning.
pub async fn run_session<R, W>(
    scheduler: &Scheduler,
    input: R,
    presenter: &mut Presenter<W>,
    options: SessionOptions,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut events = scheduler.subscribe();
    presenter.header(scheduler.script(), &scheduler.snapshot())?;

    if options.autoplay {
        press_play(scheduler);
    }

    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    if matches!(line.trim(), "q" | "quit") {
                        break;
                    }
                    if !press_play(scheduler) {
                        presenter.busy()?;
                    }
                }
                Ok(None) => {
                    debug!("Input closed");
                    input_open = false;
                    if !scheduler.is_playing() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    input_open = false;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    presenter.handle_event(&event)?;
                    if event.is_terminal() && !scheduler.is_playing() {
                        let completed = matches!(event, PlaybackEvent::RunCompleted { .. });
                        if (completed && options.exit_on_complete) || !input_open {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Presentation lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    scheduler.shutdown();
    Ok(())
}
