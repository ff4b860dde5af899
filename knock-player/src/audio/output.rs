//! Audio output using cpal
//!
//! A cpal stream is not `Send`, so the single output context lives on a
//! dedicated audio thread. [`CpalAudioEngine`] is the handle the rest of the
//! player holds; it talks to the thread with [`AudioRequest`] messages.
//!
//! The device callback pulls frames from a shared [`VoiceMixer`], so a cue
//! rendered "now" starts at the next buffer the device asks for.

use crate::audio::cues::VoiceMixer;
use crate::audio::AudioEngine;
use crate::error::{Error, Result};
use crate::state::lock;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use knock_common::config::AudioConfig;
use knock_common::Cue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Output device selection and level
#[derive(Debug, Clone, PartialEq)]
pub struct AudioOutputConfig {
    /// Device name (None = default device)
    pub device: Option<String>,
    /// Master volume applied in the callback (0.0-1.0)
    pub volume: f32,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            volume: 1.0,
        }
    }
}

impl From<&AudioConfig> for AudioOutputConfig {
    fn from(config: &AudioConfig) -> Self {
        Self {
            device: config.device.clone(),
            volume: config.volume.clamp(0.0, 1.0),
        }
    }
}

/// The output context: one device, one stream, one mixer
struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    volume: f32,
    mixer: Arc<Mutex<VoiceMixer>>,
    /// Set by the stream error callback; the context is rebuilt on next warm-up
    error_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open the configured device, falling back to the default device
    fn open(settings: &AudioOutputConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match settings.device.as_ref() {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioUnavailable(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host.default_output_device().ok_or_else(|| {
                Error::AudioUnavailable("No default output device found".to_string())
            })?,
        };

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = Self::get_best_config(&device)?;

        info!(
            "Using audio device {}: sample_rate={}, channels={}, format={:?}",
            name, config.sample_rate.0, config.channels, sample_format
        );

        let mixer = Arc::new(Mutex::new(VoiceMixer::new(config.sample_rate.0)));

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            volume: settings.volume,
            mixer,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Prefer 44.1kHz stereo f32, otherwise the device default
    fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= 44100
                && config.max_sample_rate().0 >= 44100
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(44100))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        Ok((supported_config.config(), supported_config.sample_format()))
    }

    fn start(&mut self) -> Result<()> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>()?,
            SampleFormat::I16 => self.build_stream::<i16>()?,
            SampleFormat::U16 => self.build_stream::<u16>()?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        debug!("Audio stream started");
        Ok(())
    }

    fn build_stream<T>(&self) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels as usize;
        let volume = self.volume;
        let mixer = Arc::clone(&self.mixer);
        let error_flag = Arc::clone(&self.error_flag);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut mixer = lock(&mixer);
                    for frame in data.chunks_mut(channels) {
                        let mut audio_frame = mixer.next_frame();
                        audio_frame.apply_volume(volume);
                        let audio_frame = audio_frame.clamped();

                        frame[0] = T::from_sample(audio_frame.left);
                        if channels > 1 {
                            frame[1] = T::from_sample(audio_frame.right);
                        }
                        for extra in frame.iter_mut().skip(2) {
                            *extra = <T as Sample>::EQUILIBRIUM;
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {} - marking for rebuild", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Resume a paused stream; a playing stream is left alone
    fn resume(&self) -> Result<()> {
        match self.stream.as_ref() {
            Some(stream) => stream
                .play()
                .map_err(|e| Error::AudioOutput(format!("Failed to resume stream: {}", e))),
            None => Err(Error::InvalidState("audio stream not started".to_string())),
        }
    }

    fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    fn schedule(&self, cue: Cue) {
        let mut mixer = lock(&self.mixer);
        mixer.schedule(cue);
        debug!("Cue {} scheduled at {:.3}s", cue, mixer.current_time());
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Failed to pause stream on release: {}", e);
            }
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Messages handled by the audio thread
enum AudioRequest {
    EnsureReady(oneshot::Sender<Result<()>>),
    Render(Cue),
    Close,
}

/// Create the context if missing or broken, resume it otherwise
fn ensure_output(slot: &mut Option<AudioOutput>, settings: &AudioOutputConfig) -> Result<()> {
    if let Some(output) = slot.as_ref() {
        if !output.has_error() {
            return output.resume();
        }
        warn!("Audio context errored, rebuilding");
        *slot = None;
    }

    let mut output = AudioOutput::open(settings)?;
    output.start()?;
    *slot = Some(output);
    info!("Audio output context ready");
    Ok(())
}

fn audio_thread(settings: AudioOutputConfig, requests: mpsc::Receiver<AudioRequest>) {
    let mut output: Option<AudioOutput> = None;

    while let Ok(request) = requests.recv() {
        match request {
            AudioRequest::EnsureReady(reply) => {
                let result = ensure_output(&mut output, &settings);
                if let Err(e) = &result {
                    debug!("Audio warm-up failed: {}", e);
                }
                let _ = reply.send(result);
            }
            AudioRequest::Render(cue) => match output.as_ref() {
                Some(out) if !out.has_error() => out.schedule(cue),
                _ => debug!("No running output context, cue {} dropped", cue),
            },
            AudioRequest::Close => break,
        }
    }

    if output.take().is_some() {
        info!("Audio output context released");
    }
    debug!("Audio thread exiting");
}

/// Audio engine backed by the default cpal host
///
/// The device is not touched until the first `ensure_ready`.
pub struct CpalAudioEngine {
    requests: Mutex<Option<mpsc::Sender<AudioRequest>>>,
    closed: AtomicBool,
}

impl CpalAudioEngine {
    pub fn new(settings: AudioOutputConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("knock-audio".to_string())
            .spawn(move || audio_thread(settings, rx))?;

        Ok(Self {
            requests: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
        })
    }

    fn send(&self, request: AudioRequest) -> bool {
        match lock(&self.requests).as_ref() {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AudioEngine for CpalAudioEngine {
    async fn ensure_ready(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::AudioClosed);
        }

        let (reply, response) = oneshot::channel();
        if !self.send(AudioRequest::EnsureReady(reply)) {
            return Err(Error::AudioClosed);
        }
        response.await.map_err(|_| Error::AudioClosed)?
    }

    fn render_cue(&self, cue: Cue) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.send(AudioRequest::Render(cue));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send(AudioRequest::Close);
        // Dropping the sender also ends the thread if Close was lost
        lock(&self.requests).take();
        debug!("Audio engine closed");
    }
}

impl Drop for CpalAudioEngine {
    fn drop(&mut self) {
        self.close();
    }
}
