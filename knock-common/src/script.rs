//! Script model and loading
//!
//! A script is an immutable, ordered list of segments. Each segment fires a
//! fixed delay after the segment before it, so the absolute fire time of
//! segment `i` is the running sum of delays `0..=i`. Order is fixed at load
//! time and never changes.
//!
//! Scripts are authored as TOML:
//!
//! ```toml
//! title = "The Knock"
//! final_text = "..."
//!
//! [[segment]]
//! id = "line-1"
//! text = "..."
//! delay = 600
//! kind = "voice"
//! speak = true
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Built-in script source, compiled into the binary
const BUILTIN_SCRIPT: &str = include_str!("../assets/the_knock.toml");

/// Rendering style of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Voice,
    Sound,
    Visual,
    Whisper,
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentKind::Voice => write!(f, "voice"),
            SegmentKind::Sound => write!(f, "sound"),
            SegmentKind::Visual => write!(f, "visual"),
            SegmentKind::Whisper => write!(f, "whisper"),
        }
    }
}

/// Procedurally synthesized sound effect identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cue {
    KnockSoft,
    KnockHard,
    Suspense,
    Heartbeat,
    Glitch,
}

impl Cue {
    /// Every cue the audio engine knows how to render
    pub const ALL: [Cue; 5] = [
        Cue::KnockSoft,
        Cue::KnockHard,
        Cue::Suspense,
        Cue::Heartbeat,
        Cue::Glitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::KnockSoft => "knock-soft",
            Cue::KnockHard => "knock-hard",
            Cue::Suspense => "suspense",
            Cue::Heartbeat => "heartbeat",
            Cue::Glitch => "glitch",
        }
    }
}

impl std::fmt::Display for Cue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp an authored delay to a non-negative millisecond count
pub fn clamp_delay(raw_ms: i64) -> u64 {
    raw_ms.max(0) as u64
}

/// Remove quotation marks and surrounding whitespace before speaking
pub fn strip_quotes(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '“' | '”' | '"' | '\''))
        .collect::<String>()
        .trim()
        .to_string()
}

/// One atomic unit of the timeline: a line of text, a sound cue, or a pause
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Unique within a script, stable across replays
    pub id: String,

    /// Display and speech content; whitespace-only means a pure pause
    pub text: String,

    /// Milliseconds after the previous segment fires
    pub delay_ms: u64,

    pub kind: SegmentKind,

    /// Send the text to the speech engine when the segment fires
    pub speak: bool,

    /// Sound effect rendered when the segment fires (sound segments only)
    pub cue: Option<Cue>,
}

impl Segment {
    /// Create a silent segment; negative delays are clamped to zero
    pub fn new(id: impl Into<String>, kind: SegmentKind, delay_ms: i64) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            delay_ms: clamp_delay(delay_ms),
            kind,
            speak: false,
            cue: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_speak(mut self, speak: bool) -> Self {
        self.speak = speak;
        self
    }

    pub fn with_cue(mut self, cue: Cue) -> Self {
        self.cue = Some(cue);
        self
    }

    /// Text to hand to the speech engine, if this segment speaks at all
    ///
    /// Quotation marks and surrounding whitespace are stripped. A speakable
    /// segment whose text is empty after stripping yields `None`.
    pub fn speech_text(&self) -> Option<String> {
        if !self.speak {
            return None;
        }
        let text = strip_quotes(&self.text);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Cue to render on firing; only sound segments render cues
    pub fn cue_to_render(&self) -> Option<Cue> {
        match self.kind {
            SegmentKind::Sound => self.cue,
            _ => None,
        }
    }

    /// Whitespace-only segments are pauses and have nothing to display
    pub fn is_pause(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Immutable ordered sequence of segments plus display metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    title: String,
    final_text: Option<String>,
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct ScriptFile {
    #[serde(default = "default_title")]
    title: String,
    #[serde(default)]
    final_text: Option<String>,
    #[serde(default, rename = "segment")]
    segments: Vec<RawSegment>,
}

#[derive(Deserialize)]
struct RawSegment {
    id: String,
    #[serde(default)]
    text: String,
    /// Signed so authored negative values can be reported and clamped
    #[serde(default)]
    delay: i64,
    kind: SegmentKind,
    #[serde(default)]
    speak: bool,
    #[serde(default)]
    cue: Option<Cue>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

impl Script {
    /// Build a script from segments, rejecting empty or duplicate ids
    pub fn new(
        title: impl Into<String>,
        final_text: Option<String>,
        segments: Vec<Segment>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(segments.len());
        for segment in &segments {
            if segment.id.trim().is_empty() {
                return Err(Error::InvalidScript("segment id must not be empty".to_string()));
            }
            if !seen.insert(segment.id.as_str()) {
                return Err(Error::InvalidScript(format!(
                    "duplicate segment id '{}'",
                    segment.id
                )));
            }
            if segment.cue.is_some() && segment.kind != SegmentKind::Sound {
                warn!(
                    "Segment '{}' has a cue but kind '{}'; the cue will not be rendered",
                    segment.id, segment.kind
                );
            }
        }

        if segments.is_empty() {
            warn!("Script has no segments");
        }

        Ok(Self {
            title: title.into(),
            final_text,
            segments,
        })
    }

    /// The script compiled into the binary ("The Knock")
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_SCRIPT)
    }

    /// Parse a script from TOML source, clamping negative delays
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ScriptFile = toml::from_str(source)?;

        let segments = file
            .segments
            .into_iter()
            .map(|raw| {
                if raw.delay < 0 {
                    warn!(
                        "Segment '{}' has negative delay {}ms, clamping to 0",
                        raw.id, raw.delay
                    );
                }
                Segment {
                    id: raw.id,
                    text: raw.text,
                    delay_ms: clamp_delay(raw.delay),
                    kind: raw.kind,
                    speak: raw.speak,
                    cue: raw.cue,
                }
            })
            .collect();

        Self::new(file.title, file.final_text, segments)
    }

    /// Load a script from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("script file {}", path.display())));
        }
        let source = std::fs::read_to_string(path)?;
        let script = Self::from_toml_str(&source)?;
        debug!(
            "Loaded script '{}' ({} segments) from {}",
            script.title,
            script.len(),
            path.display()
        );
        Ok(script)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn final_text(&self) -> Option<&str> {
        self.final_text.as_deref()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Absolute fire offset (ms from run start) of every segment, in order
    pub fn cumulative_offsets(&self) -> Vec<u64> {
        self.segments
            .iter()
            .scan(0u64, |acc, segment| {
                *acc = acc.saturating_add(segment.delay_ms);
                Some(*acc)
            })
            .collect()
    }

    /// Offset of the last segment, i.e. the sum of all delays
    pub fn total_duration_ms(&self) -> u64 {
        self.segments
            .iter()
            .fold(0u64, |acc, segment| acc.saturating_add(segment.delay_ms))
    }
}
