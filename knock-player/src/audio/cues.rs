//! Procedural cue synthesis
//!
//! Each cue is a handful of voices: an oscillator (or a noise buffer) shaped
//! by a gain automation, started and stopped at fixed times relative to the
//! moment the cue is rendered.
//!
//! | Cue          | Voices                                                    |
//! |--------------|-----------------------------------------------------------|
//! | `knock-soft` | triangle 180 Hz, peak 0.6, tail 0.12, gone by 0.45 s      |
//! | `knock-hard` | triangle 160 Hz, peak 0.9, tail 0.25, gone by 0.45 s      |
//! | `suspense`   | sawtooth 54→44→20 Hz, slow swell to 0.2, 4.6 s            |
//! | `heartbeat`  | sine 55 Hz beat, then sine 48 Hz beat at 0.28 s           |
//! | `glitch`     | 0.12 s white noise at 1.8× rate, linear fade              |

use crate::audio::envelope::Automation;
use crate::audio::types::AudioFrame;
use knock_common::Cue;
use rand::Rng;
use std::f32::consts::TAU;

/// Periodic oscillator shapes; phase is in [0, 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
}

impl Waveform {
    /// Sample at `phase`; every shape starts at 0.0 and rises
    pub fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
            Waveform::Sawtooth => 2.0 * ((phase + 0.5).fract()) - 1.0,
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    Oscillator {
        waveform: Waveform,
        frequency: Automation,
        phase: f32,
    },
    Buffer {
        samples: Vec<f32>,
        /// Playback rate multiplier
        rate: f32,
    },
}

/// One sound source with its gain shape and lifetime
#[derive(Debug, Clone)]
pub struct Voice {
    source: Source,
    gain: Automation,
    /// Seconds after the cue is rendered
    start: f32,
    stop: f32,
}

impl Voice {
    pub fn oscillator(
        waveform: Waveform,
        frequency: Automation,
        gain: Automation,
        start: f32,
        stop: f32,
    ) -> Self {
        Self {
            source: Source::Oscillator {
                waveform,
                frequency,
                phase: 0.0,
            },
            gain,
            start,
            stop,
        }
    }

    pub fn buffer(samples: Vec<f32>, rate: f32, gain: Automation, start: f32, stop: f32) -> Self {
        Self {
            source: Source::Buffer { samples, rate },
            gain,
            start,
            stop,
        }
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn stop(&self) -> f32 {
        self.stop
    }

    pub fn is_finished(&self, time: f32) -> bool {
        time >= self.stop
    }

    /// Produce the sample at `time` seconds after the cue started
    ///
    /// Must be called with monotonically increasing times, one call per
    /// output frame; oscillators advance their phase on every audible call.
    pub fn next_sample(&mut self, time: f32, sample_rate: f32) -> f32 {
        if time < self.start || time >= self.stop {
            return 0.0;
        }

        let gain = self.gain.value_at(time);
        match &mut self.source {
            Source::Oscillator {
                waveform,
                frequency,
                phase,
            } => {
                let sample = waveform.sample(*phase);
                *phase = (*phase + frequency.value_at(time) / sample_rate).fract();
                sample * gain
            }
            Source::Buffer { samples, rate } => {
                let local = time - self.start;
                let index = (local * sample_rate * *rate) as usize;
                samples.get(index).copied().unwrap_or(0.0) * gain
            }
        }
    }
}

/// Short triangle thump with a two-step attack and exponential tail
fn knock(frequency: f32, peak: f32, tail: f32) -> Vec<Voice> {
    let gain = Automation::constant(0.0)
        .linear(0.0, peak)
        .linear(0.03, tail)
        .exponential(0.4, 0.0001);
    vec![Voice::oscillator(
        Waveform::Triangle,
        Automation::constant(frequency),
        gain,
        0.0,
        0.45,
    )]
}

fn suspense() -> Vec<Voice> {
    let gain = Automation::constant(0.0001)
        .linear(0.2, 0.12)
        .linear(3.3, 0.2)
        .exponential(4.5, 0.00001);
    let frequency = Automation::constant(54.0).linear(3.5, 44.0).linear(4.2, 20.0);
    vec![Voice::oscillator(Waveform::Sawtooth, frequency, gain, 0.0, 4.6)]
}

fn heartbeat() -> Vec<Voice> {
    let first = Voice::oscillator(
        Waveform::Sine,
        Automation::constant(55.0),
        Automation::constant(0.0001)
            .exponential(0.02, 0.4)
            .exponential(0.3, 0.0001),
        0.0,
        0.35,
    );
    let second = Voice::oscillator(
        Waveform::Sine,
        Automation::constant(48.0),
        Automation::constant(0.0001)
            .step(0.28, 0.0001)
            .exponential(0.31, 0.3)
            .exponential(0.6, 0.0001),
        0.28,
        0.62,
    );
    vec![first, second]
}

fn glitch(sample_rate: u32) -> Vec<Voice> {
    const LENGTH: f32 = 0.12;
    let mut rng = rand::thread_rng();
    let count = (sample_rate as f32 * LENGTH) as usize;
    let samples: Vec<f32> = (0..count).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let gain = Automation::constant(0.6).linear(LENGTH, 0.0001);
    vec![Voice::buffer(samples, 1.8, gain, 0.0, LENGTH)]
}

/// Voices making up `cue`, timed relative to the moment it is rendered
pub fn cue_voices(cue: Cue, sample_rate: u32) -> Vec<Voice> {
    match cue {
        Cue::KnockSoft => knock(180.0, 0.6, 0.12),
        Cue::KnockHard => knock(160.0, 0.9, 0.25),
        Cue::Suspense => suspense(),
        Cue::Heartbeat => heartbeat(),
        Cue::Glitch => glitch(sample_rate),
    }
}

/// Length of a cue in seconds (latest voice stop)
pub fn cue_duration(cue: Cue) -> f32 {
    cue_voices(cue, 8000)
        .iter()
        .map(Voice::stop)
        .fold(0.0, f32::max)
}

struct ScheduledVoice {
    voice: Voice,
    start_frame: u64,
}

/// Sums every active voice into the output, one frame at a time
///
/// The frame counter is the output-context clock: a cue scheduled now
/// starts at the next frame pulled by the device callback.
pub struct VoiceMixer {
    sample_rate: u32,
    frame: u64,
    active: Vec<ScheduledVoice>,
}

impl VoiceMixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frame: 0,
            active: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output-context time in seconds
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn active_voices(&self) -> usize {
        self.active.len()
    }

    /// Start a cue at the current output-context time
    pub fn schedule(&mut self, cue: Cue) {
        let start_frame = self.frame;
        self.active.extend(
            cue_voices(cue, self.sample_rate)
                .into_iter()
                .map(|voice| ScheduledVoice { voice, start_frame }),
        );
    }

    /// Pull the next frame, dropping voices that have stopped
    pub fn next_frame(&mut self) -> AudioFrame {
        let sample_rate = self.sample_rate as f32;
        let frame = self.frame;
        let mut mixed = 0.0f32;

        self.active.retain_mut(|scheduled| {
            let time = (frame - scheduled.start_frame) as f32 / sample_rate;
            if scheduled.voice.is_finished(time) {
                return false;
            }
            mixed += scheduled.voice.next_sample(time, sample_rate);
            true
        });

        self.frame += 1;
        AudioFrame::from_mono(mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    /// Render a cue alone until all voices stop; returns the mono samples
    fn render(cue: Cue) -> Vec<f32> {
        let mut mixer = VoiceMixer::new(RATE);
        mixer.schedule(cue);
        let mut out = Vec::new();
        while mixer.active_voices() > 0 {
            out.push(mixer.next_frame().left);
            assert!(out.len() < RATE as usize * 10, "cue never finished");
        }
        out
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_waveforms_start_at_zero() {
        for waveform in [Waveform::Sine, Waveform::Triangle, Waveform::Sawtooth] {
            assert!(waveform.sample(0.0).abs() < 1e-6, "{:?}", waveform);
        }
        assert!((Waveform::Triangle.sample(0.25) - 1.0).abs() < 1e-6);
        assert!((Waveform::Triangle.sample(0.75) + 1.0).abs() < 1e-6);
        assert!((Waveform::Sawtooth.sample(0.49) - 0.98).abs() < 1e-4);
    }

    #[test]
    fn test_cue_durations() {
        assert_eq!(cue_duration(Cue::KnockSoft), 0.45);
        assert_eq!(cue_duration(Cue::KnockHard), 0.45);
        assert_eq!(cue_duration(Cue::Suspense), 4.6);
        assert_eq!(cue_duration(Cue::Heartbeat), 0.62);
        assert_eq!(cue_duration(Cue::Glitch), 0.12);
    }

    #[test]
    fn test_voice_counts() {
        assert_eq!(cue_voices(Cue::KnockSoft, RATE).len(), 1);
        assert_eq!(cue_voices(Cue::Heartbeat, RATE).len(), 2);
        assert_eq!(cue_voices(Cue::Glitch, RATE).len(), 1);
    }

    #[test]
    fn test_rendered_length_matches_duration() {
        let samples = render(Cue::KnockSoft);
        let expected = (0.45 * RATE as f32) as usize;
        assert!(samples.len().abs_diff(expected) <= 1, "{}", samples.len());
    }

    #[test]
    fn test_hard_knock_is_louder_than_soft() {
        let soft = peak(&render(Cue::KnockSoft));
        let hard = peak(&render(Cue::KnockHard));
        assert!(soft <= 0.6 + 1e-3);
        assert!(hard <= 0.9 + 1e-3);
        assert!(hard > soft);
    }

    #[test]
    fn test_knock_decays() {
        let samples = render(Cue::KnockHard);
        let head = peak(&samples[..400]);
        let tail = peak(&samples[samples.len() - 400..]);
        assert!(tail < head / 100.0, "head {} tail {}", head, tail);
    }

    #[test]
    fn test_glitch_noise_is_bounded() {
        let samples = render(Cue::Glitch);
        assert!(peak(&samples) <= 0.6 + 1e-3);
        assert!(peak(&samples) > 0.0);
    }

    #[test]
    fn test_second_heartbeat_waits() {
        let mut second = cue_voices(Cue::Heartbeat, RATE).remove(1);
        assert_eq!(second.start(), 0.28);
        assert_eq!(second.next_sample(0.1, RATE as f32), 0.0);
    }

    #[test]
    fn test_cues_overlap_in_mixer() {
        let mut mixer = VoiceMixer::new(RATE);
        mixer.schedule(Cue::Suspense);
        for _ in 0..RATE {
            mixer.next_frame();
        }
        mixer.schedule(Cue::Heartbeat);
        assert_eq!(mixer.active_voices(), 3);
        assert!((mixer.current_time() - 1.0).abs() < 1e-9);

        // Heartbeat ends long before the suspense hum
        for _ in 0..RATE {
            mixer.next_frame();
        }
        assert_eq!(mixer.active_voices(), 1);
    }
}
