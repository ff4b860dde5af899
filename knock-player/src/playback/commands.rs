//! Engine commands and their dispatcher
//!
//! Firings never call the engines directly. They queue an [`EngineCommand`]
//! tagged with the run that produced it, and one dispatcher task hands the
//! command to the audio or speech engine. A command whose run is no longer
//! active is dropped, so nothing from a cancelled run is heard after
//! `cancel()` returns.

use crate::audio::AudioEngine;
use crate::speech::SpeechEngine;
use crate::state::{lock, PlaybackState};
use knock_common::Cue;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Side effect requested by a segment firing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Warm up the output context, then start the cue
    RenderCue { run_id: u64, cue: Cue },

    /// Replace the current utterance with `text` (already cleaned)
    Speak { run_id: u64, text: String },
}

impl EngineCommand {
    pub fn run_id(&self) -> u64 {
        match self {
            EngineCommand::RenderCue { run_id, .. } | EngineCommand::Speak { run_id, .. } => {
                *run_id
            }
        }
    }
}

/// Spawn the dispatcher task; it ends when every command sender is dropped
pub(crate) fn spawn_dispatcher(
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    state: Arc<Mutex<PlaybackState>>,
    audio: Arc<dyn AudioEngine>,
    speech: Arc<dyn SpeechEngine>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            trace!("Dispatching {:?}", command);
            match command {
                EngineCommand::Speak { run_id, text } => {
                    // Speak under the state lock so cancel() cannot slip in
                    // between the check and the call
                    let guard = lock(&state);
                    if !guard.accepts(run_id) {
                        debug!("Dropping speech from stale run {}", run_id);
                        continue;
                    }
                    speech.speak(&text);
                }
                EngineCommand::RenderCue { run_id, cue } => {
                    if !lock(&state).accepts(run_id) {
                        debug!("Dropping cue {} from stale run {}", cue, run_id);
                        continue;
                    }
                    // Warm-up may take a while; later commands must not wait on it
                    tokio::spawn(render_when_ready(
                        run_id,
                        cue,
                        Arc::clone(&state),
                        Arc::clone(&audio),
                    ));
                }
            }
        }
        debug!("Engine command dispatcher stopped");
    })
}

async fn render_when_ready(
    run_id: u64,
    cue: Cue,
    state: Arc<Mutex<PlaybackState>>,
    audio: Arc<dyn AudioEngine>,
) {
    if let Err(e) = audio.ensure_ready().await {
        debug!("Skipping cue {}: {}", cue, e);
        return;
    }

    let state = lock(&state);
    if !state.accepts(run_id) {
        debug!("Dropping cue {} from stale run {}", cue, run_id);
        return;
    }
    audio.render_cue(cue);
}
