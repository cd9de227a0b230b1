//! Interruptible playback of synthesized sentences.
//!
//! A sentence sounds through one of two sources: decoded PCM written to a
//! cpal output stream, or the encoded clip handed to an external player.
//! Either way the caller holds a [`PlaybackHandle`] with the same `stop()`
//! and `finished()` surface.

use crate::audio::decode::{PcmBuffer, decode_to_mono, interleave_mono, resample_linear_mono};
use crate::audio::player::ExternalPlayer;
use crate::config::AudioConfig;
use crate::error::{Result, SpeechError};
use crate::tts::SynthesizedAudio;
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a playback unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All audio was played.
    Completed,
    /// `stop()` cut playback short.
    Stopped,
    /// The device or player failed mid-way.
    Failed(String),
}

/// Which mechanism is sounding a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    /// Decoded samples on an output stream.
    Buffer,
    /// Encoded clip in an external player.
    Element,
}

/// An encoded clip the built-in decoder could not handle.
#[derive(Debug, Clone)]
pub struct EncodedClip {
    /// The synthesized payload, untouched.
    pub audio: SynthesizedAudio,
    /// Player that will sound it.
    pub player: ExternalPlayer,
    /// The payload on disk, for the player to open.
    pub file: Option<Arc<ClipFile>>,
}

impl EncodedClip {
    /// Write the payload to a temporary file so starting it does no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Io`] if the file cannot be written.
    pub async fn write(audio: SynthesizedAudio, player: ExternalPlayer) -> Result<Self> {
        let extension = audio.extension_hint().unwrap_or("audio");
        let path = std::env::temp_dir().join(format!("parley-{}.{extension}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &audio.bytes).await?;
        Ok(Self {
            audio,
            player,
            file: Some(Arc::new(ClipFile { path })),
        })
    }
}

/// Temporary clip file, removed when the last owner drops it.
#[derive(Debug)]
pub struct ClipFile {
    path: PathBuf,
}

impl ClipFile {
    /// Location of the clip.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClipFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(error = %e, path = %self.path.display(), "temporary clip already gone");
        }
    }
}

/// Audio ready to start, chosen by the fallback policy.
#[derive(Debug, Clone)]
pub enum PlaybackSource {
    /// Decoded PCM.
    Buffer(PcmBuffer),
    /// Undecodable clip for an external player.
    Element(EncodedClip),
}

impl PlaybackSource {
    /// The mechanism this source plays through.
    #[must_use]
    pub fn kind(&self) -> PlaybackKind {
        match self {
            Self::Buffer(_) => PlaybackKind::Buffer,
            Self::Element(_) => PlaybackKind::Element,
        }
    }
}

/// The currently sounding unit.
///
/// Dropping the handle stops playback.
#[derive(Debug)]
pub struct PlaybackHandle {
    kind: PlaybackKind,
    cancel: CancellationToken,
    done: oneshot::Receiver<PlaybackOutcome>,
    settled: Option<PlaybackOutcome>,
}

/// Backend side of a [`PlaybackHandle`].
#[derive(Debug)]
pub struct PlaybackControl {
    cancel: CancellationToken,
    done: oneshot::Sender<PlaybackOutcome>,
}

impl PlaybackHandle {
    /// Create a handle and the control its backend reports through.
    #[must_use]
    pub fn channel(kind: PlaybackKind) -> (Self, PlaybackControl) {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        (
            Self {
                kind,
                cancel: cancel.clone(),
                done: done_rx,
                settled: None,
            },
            PlaybackControl {
                cancel,
                done: done_tx,
            },
        )
    }

    /// The mechanism sounding this unit.
    #[must_use]
    pub fn kind(&self) -> PlaybackKind {
        self.kind
    }

    /// Ask the backend to stop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether `stop()` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the unit to end. Cancel-safe; repeat calls return the same outcome.
    pub async fn finished(&mut self) -> PlaybackOutcome {
        if let Some(outcome) = &self.settled {
            return outcome.clone();
        }
        let outcome = match (&mut self.done).await {
            Ok(outcome) => outcome,
            Err(_) if self.cancel.is_cancelled() => PlaybackOutcome::Stopped,
            Err(_) => PlaybackOutcome::Failed("playback ended without reporting".to_owned()),
        };
        self.settled = Some(outcome.clone());
        outcome
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl PlaybackControl {
    /// Whether the handle asked for a stop (or was dropped).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once a stop is requested.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }

    /// A token that fires on stop, for backends running off-task.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Report the outcome. The handle may already be gone.
    pub fn finish(self, outcome: PlaybackOutcome) {
        let _ = self.done.send(outcome);
    }
}

/// Output side of the playback queue.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Turn synthesized bytes into a startable source.
    ///
    /// Runs before the queue decides whether the sentence is still wanted,
    /// so it must not produce sound.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Audio`] when neither source can play the clip.
    async fn prepare(&self, audio: SynthesizedAudio) -> Result<PlaybackSource>;

    /// Start sounding `source` and return immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Audio`] if playback cannot be launched.
    fn start(&self, source: PlaybackSource) -> Result<PlaybackHandle>;
}

/// System speaker output: cpal first, external player as fallback.
pub struct SpeakerOutput {
    output_device: Option<String>,
    player: Option<ExternalPlayer>,
}

impl SpeakerOutput {
    /// Create an output for the configured device and fallback policy.
    pub fn new(config: &AudioConfig) -> Self {
        let player = ExternalPlayer::discover(config);
        match &player {
            Some(p) => info!(player = %p.program().display(), "fallback audio player available"),
            None => debug!("no fallback audio player"),
        }
        Self {
            output_device: config.output_device.clone(),
            player,
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?;
        Ok(devices
            .filter_map(|device| device.description().ok().map(|d| d.name().to_owned()))
            .collect())
    }

    fn start_element(&self, clip: EncodedClip) -> Result<PlaybackHandle> {
        let Some(file) = clip.file else {
            return Err(SpeechError::Audio("fallback clip was never written to disk".to_owned()));
        };
        let mut child = clip.player.command(file.path()).spawn().map_err(|e| {
            SpeechError::Audio(format!("failed to launch {}: {e}", clip.player.program().display()))
        })?;

        let (handle, control) = PlaybackHandle::channel(PlaybackKind::Element);
        let program = clip.player.program().display().to_string();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => PlaybackOutcome::Completed,
                    Ok(s) => PlaybackOutcome::Failed(format!("{program} exited with {s}")),
                    Err(e) => PlaybackOutcome::Failed(format!("{program} wait failed: {e}")),
                },
                () = control.stopped() => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill fallback player");
                    }
                    PlaybackOutcome::Stopped
                }
            };
            drop(file);
            control.finish(outcome);
        });
        Ok(handle)
    }

    fn start_buffer(&self, pcm: PcmBuffer) -> Result<PlaybackHandle> {
        let (handle, control) = PlaybackHandle::channel(PlaybackKind::Buffer);
        let device_name = self.output_device.clone();
        std::thread::Builder::new()
            .name("parley-playback".to_owned())
            .spawn(move || {
                let token = control.token();
                let outcome = match play_buffer(device_name.as_deref(), &pcm, &token) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(error = %e, "buffer playback failed");
                        PlaybackOutcome::Failed(e.to_string())
                    }
                };
                control.finish(outcome);
            })
            .map_err(|e| SpeechError::Audio(format!("failed to spawn playback thread: {e}")))?;
        Ok(handle)
    }
}

#[async_trait]
impl AudioOutput for SpeakerOutput {
    async fn prepare(&self, audio: SynthesizedAudio) -> Result<PlaybackSource> {
        let bytes = audio.bytes.clone();
        let mime = audio.content_type.clone();
        let extension = audio.extension_hint();
        let decoded = tokio::task::spawn_blocking(move || decode_to_mono(bytes, Some(&mime), extension))
            .await
            .map_err(|e| SpeechError::Audio(format!("decode task failed: {e}")))?;

        match decoded {
            Ok(pcm) => Ok(PlaybackSource::Buffer(pcm)),
            Err(e) => match &self.player {
                Some(player) => {
                    warn!(error = %e, "decode failed; using fallback player");
                    let clip = EncodedClip::write(audio, player.clone()).await?;
                    Ok(PlaybackSource::Element(clip))
                }
                None => Err(e),
            },
        }
    }

    fn start(&self, source: PlaybackSource) -> Result<PlaybackHandle> {
        match source {
            PlaybackSource::Buffer(pcm) => self.start_buffer(pcm),
            PlaybackSource::Element(clip) => self.start_element(clip),
        }
    }
}

struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

fn open_output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| d.description().ok().is_some_and(|desc| desc.name() == name))
            .ok_or_else(|| SpeechError::Audio(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| SpeechError::Audio("no default output device".into())),
    }
}

/// Play `pcm` on the output device, blocking until done or stopped.
fn play_buffer(device_name: Option<&str>, pcm: &PcmBuffer, cancel: &CancellationToken) -> Result<PlaybackOutcome> {
    let device = open_output_device(device_name)?;
    let default_config = device
        .default_output_config()
        .map_err(|e| SpeechError::Audio(format!("no default output config: {e}")))?;
    let sample_rate = default_config.sample_rate();
    let channels = default_config.channels();

    let mono = resample_linear_mono(&pcm.samples, pcm.sample_rate, sample_rate);
    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples: interleave_mono(&mono, channels),
        position: 0,
        finished: false,
    }));

    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let buffer_clone = Arc::clone(&buffer);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let Ok(mut buf) = buffer_clone.lock() else {
                    return;
                };
                for sample in data.iter_mut() {
                    if buf.position < buf.samples.len() {
                        *sample = buf.samples[buf.position];
                        buf.position += 1;
                    } else {
                        *sample = 0.0;
                        buf.finished = true;
                    }
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeechError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| SpeechError::Audio(format!("failed to start output stream: {e}")))?;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(10));
        if cancel.is_cancelled() {
            return Ok(PlaybackOutcome::Stopped);
        }
        let buf = buffer
            .lock()
            .map_err(|e| SpeechError::Audio(format!("playback buffer lock poisoned: {e}")))?;
        if buf.finished {
            return Ok(PlaybackOutcome::Completed);
        }
    }
}
