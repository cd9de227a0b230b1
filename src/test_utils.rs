//! Scripted collaborators for exercising the turn controller without a
//! microphone, speaker or network.
//!
//! Shared by unit tests and the integration tests under `tests/`.

use crate::audio::player::ExternalPlayer;
use crate::audio::playback::{AudioOutput, EncodedClip, PlaybackHandle, PlaybackOutcome, PlaybackSource};
use crate::error::{Result, SpeechError};
use crate::reply::ReplySource;
use crate::reply::consumer::ByteStream;
use crate::stt::Recognizer;
use crate::tts::{SynthesizedAudio, Synthesizer};
use crate::vad::VoiceActivity;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Synthesizer that echoes the text back as "audio".
#[derive(Default)]
pub struct ScriptedSynthesizer {
    latency: Duration,
    requests: Mutex<Vec<String>>,
    voices: Mutex<Vec<Option<String>>>,
    failing: Mutex<HashSet<String>>,
    json: Mutex<HashSet<String>>,
}

impl ScriptedSynthesizer {
    /// Answer immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer after `latency` of (tokio) time.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Fail with a synthesis error for this exact text.
    pub fn fail_on(&self, text: &str) {
        lock(&self.failing).insert(text.to_owned());
    }

    /// Answer this exact text with a JSON body instead of audio.
    pub fn reply_json_on(&self, text: &str) {
        lock(&self.json).insert(text.to_owned());
    }

    /// Texts sent for synthesis, in call order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }

    /// Voices requested, in call order.
    pub fn voices(&self) -> Vec<Option<String>> {
        lock(&self.voices).clone()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<SynthesizedAudio> {
        lock(&self.requests).push(text.to_owned());
        lock(&self.voices).push(voice.map(str::to_owned));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if lock(&self.failing).contains(text) {
            return Err(SpeechError::Tts(format!("scripted failure for {text}")));
        }
        if lock(&self.json).contains(text) {
            return Ok(SynthesizedAudio {
                bytes: Bytes::from_static(br#"{"error":"not audio"}"#),
                content_type: "application/json".to_owned(),
            });
        }
        Ok(SynthesizedAudio {
            bytes: Bytes::from(text.as_bytes().to_vec()),
            content_type: "audio/mpeg".to_owned(),
        })
    }
}

/// Output that "plays" each clip for a fixed duration of tokio time.
pub struct ScriptedOutput {
    play_for: Duration,
    started: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    stopped: Arc<AtomicUsize>,
}

impl ScriptedOutput {
    /// Each clip lasts `play_for`.
    pub fn new(play_for: Duration) -> Self {
        Self {
            play_for,
            started: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            stopped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report a device failure while playing this exact text.
    pub fn fail_playback_of(&self, text: &str) {
        lock(&self.failing).insert(text.to_owned());
    }

    /// Texts whose playback started, in order.
    pub fn started(&self) -> Vec<String> {
        lock(&self.started).clone()
    }

    /// How many clips were cut short by `stop()`.
    pub fn stopped_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioOutput for ScriptedOutput {
    async fn prepare(&self, audio: SynthesizedAudio) -> Result<PlaybackSource> {
        if !audio.content_type.starts_with("audio/") {
            return Err(SpeechError::Audio(format!(
                "cannot decode {} payload",
                audio.content_type
            )));
        }
        Ok(PlaybackSource::Element(EncodedClip {
            audio,
            player: ExternalPlayer::new(PathBuf::from("scripted"), Vec::new()),
            file: None,
        }))
    }

    fn start(&self, source: PlaybackSource) -> Result<PlaybackHandle> {
        let text = match &source {
            PlaybackSource::Element(clip) => String::from_utf8_lossy(&clip.audio.bytes).into_owned(),
            PlaybackSource::Buffer(_) => "<pcm>".to_owned(),
        };
        lock(&self.started).push(text.clone());
        let fails = lock(&self.failing).contains(&text);

        let (handle, control) = PlaybackHandle::channel(source.kind());
        let play_for = self.play_for;
        let stopped = Arc::clone(&self.stopped);
        tokio::spawn(async move {
            if fails {
                control.finish(PlaybackOutcome::Failed(format!("scripted device failure for {text}")));
                return;
            }
            let outcome = tokio::select! {
                () = tokio::time::sleep(play_for) => PlaybackOutcome::Completed,
                () = control.stopped() => {
                    stopped.fetch_add(1, Ordering::SeqCst);
                    PlaybackOutcome::Stopped
                }
            };
            control.finish(outcome);
        });
        Ok(handle)
    }
}

/// A canned reply-service response.
pub enum ScriptedReply {
    /// Accept after `accept_after`, then send each chunk `every` apart.
    Stream {
        accept_after: Duration,
        every: Duration,
        chunks: Vec<String>,
    },
    /// Reject after `after` with an upstream error.
    Reject { after: Duration, message: String },
    /// Accept, send `chunks`, then fail the read.
    BreakAfter { chunks: Vec<String> },
}

impl ScriptedReply {
    /// Accept immediately and stream `data:` frames with `answer` deltas, then `[DONE]`.
    pub fn answers(deltas: &[&str], every: Duration) -> Self {
        let mut chunks: Vec<String> = deltas
            .iter()
            .map(|d| format!("data: {}\n", serde_json::json!({ "answer": d })))
            .collect();
        chunks.push("data: [DONE]\n".to_owned());
        Self::Stream {
            accept_after: Duration::ZERO,
            every,
            chunks,
        }
    }
}

/// Reply source that plays back scripted responses in order.
#[derive(Default)]
pub struct ScriptedReplySource {
    replies: Mutex<VecDeque<ScriptedReply>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedReplySource {
    /// No replies scripted yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response.
    pub fn push(&self, reply: ScriptedReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Queries received, in order.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl ReplySource for ScriptedReplySource {
    async fn open(&self, query: &str) -> Result<ByteStream> {
        lock(&self.queries).push(query.to_owned());
        let next = lock(&self.replies).pop_front();
        match next {
            Some(ScriptedReply::Stream {
                accept_after,
                every,
                chunks,
            }) => {
                tokio::time::sleep(accept_after).await;
                let stream = futures_util::stream::iter(chunks).then(move |chunk| async move {
                    tokio::time::sleep(every).await;
                    Ok::<_, SpeechError>(Bytes::from(chunk.into_bytes()))
                });
                Ok(Box::pin(stream))
            }
            Some(ScriptedReply::Reject { after, message }) => {
                tokio::time::sleep(after).await;
                Err(SpeechError::Upstream(message))
            }
            Some(ScriptedReply::BreakAfter { chunks }) => {
                let items: Vec<Result<Bytes>> = chunks
                    .into_iter()
                    .map(|c| Ok(Bytes::from(c.into_bytes())))
                    .chain(std::iter::once(Err(SpeechError::Upstream(
                        "connection reset".to_owned(),
                    ))))
                    .collect();
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
            None => Err(SpeechError::Upstream("no scripted reply".to_owned())),
        }
    }
}

/// Voice activity detector that records arm/disarm calls.
#[derive(Default)]
pub struct RecordingVad {
    calls: Mutex<Vec<&'static str>>,
    resume_failure: Mutex<Option<(bool, String)>>,
}

impl RecordingVad {
    /// A detector that arms successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `resume` fail; `permission` selects a permission refusal.
    pub fn fail_resume(&self, permission: bool, message: &str) {
        *lock(&self.resume_failure) = Some((permission, message.to_owned()));
    }

    /// Let `resume` succeed again.
    pub fn heal(&self) {
        *lock(&self.resume_failure) = None;
    }

    /// `"resume"` / `"pause"` in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    /// Whether the last successful call left the detector armed.
    pub fn is_armed(&self) -> bool {
        lock(&self.calls).last() == Some(&"resume")
    }
}

impl VoiceActivity for RecordingVad {
    fn resume(&self) -> Result<()> {
        if let Some((permission, message)) = lock(&self.resume_failure).clone() {
            return Err(if permission {
                SpeechError::Permission(message)
            } else {
                SpeechError::Vad(message)
            });
        }
        lock(&self.calls).push("resume");
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        lock(&self.calls).push("pause");
        Ok(())
    }
}

/// Recognizer that records start/stop calls.
#[derive(Default)]
pub struct RecordingRecognizer {
    calls: Mutex<Vec<&'static str>>,
    fail_start: Mutex<bool>,
}

impl RecordingRecognizer {
    /// A recognizer that starts successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start` fail.
    pub fn fail_start(&self) {
        *lock(&self.fail_start) = true;
    }

    /// `"start"` / `"stop"` in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }
}

impl Recognizer for RecordingRecognizer {
    fn start(&self) -> Result<()> {
        if *lock(&self.fail_start) {
            return Err(SpeechError::Stt("scripted start failure".to_owned()));
        }
        lock(&self.calls).push("start");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        lock(&self.calls).push("stop");
        Ok(())
    }
}
