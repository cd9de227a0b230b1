//! Ordered sentence-by-sentence speech.
//!
//! The queue owns the FIFO of pending sentences, the one in-flight synthesis
//! call and the one live playback handle. It never spawns a loop of its own:
//! the turn controller polls [`PlaybackQueue::next_event`] from its event
//! loop, and each call advances the drain by exactly one step before handing
//! control back.
//!
//! Interruption bumps a generation counter. A synthesis call that started
//! under an older generation still completes, but its audio is discarded
//! rather than played.

use crate::audio::playback::{AudioOutput, PlaybackHandle, PlaybackKind, PlaybackOutcome, PlaybackSource};
use crate::error::{Result, SpeechError};
use crate::tts::{Synthesizer, sanitize_for_speech};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One step of progress from the drain loop.
#[derive(Debug)]
pub enum QueueEvent {
    /// Audio for a sentence started sounding.
    Started { text: String, kind: PlaybackKind },
    /// A sentence finished sounding (or was stopped).
    Finished { text: String },
    /// A sentence had nothing speakable and was skipped without synthesis.
    Skipped { text: String },
    /// Synthesis finished after an interruption; the audio was dropped.
    /// Followed by [`QueueEvent::Drained`] when nothing else is pending.
    Discarded { text: String, generation: u64 },
    /// Synthesis or playback failed. The queue has halted and is empty.
    Failed { text: String, error: SpeechError },
    /// Nothing left to play; the drain loop is idle.
    Drained,
}

struct InFlight {
    generation: u64,
    text: String,
    future: BoxFuture<'static, Result<PlaybackSource>>,
}

struct Live {
    text: String,
    handle: PlaybackHandle,
}

/// FIFO of sentences awaiting synthesis and playback.
pub struct PlaybackQueue {
    pending: VecDeque<String>,
    generation: u64,
    draining: bool,
    in_flight: Option<InFlight>,
    live: Option<Live>,
    synthesizer: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    voice: Option<String>,
}

impl PlaybackQueue {
    /// Create an idle queue over the given collaborators.
    pub fn new(synthesizer: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>, voice: Option<String>) -> Self {
        Self {
            pending: VecDeque::new(),
            generation: 0,
            draining: false,
            in_flight: None,
            live: None,
            synthesizer,
            output,
            voice,
        }
    }

    /// Append a sentence. Never blocks and never starts work by itself.
    pub fn enqueue(&mut self, sentence: impl Into<String>) {
        self.pending.push_back(sentence.into());
    }

    /// Start the drain loop. Returns `false` if it was already running.
    pub fn drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    /// Drop everything pending, stop live audio and bump the generation.
    ///
    /// Returns how many sentences were dropped, counting the live one.
    /// An in-flight synthesis call keeps running; its result will surface
    /// as [`QueueEvent::Discarded`].
    pub fn invalidate(&mut self) -> usize {
        let mut dropped = self.pending.len();
        self.pending.clear();
        self.generation += 1;
        if let Some(live) = self.live.take() {
            live.handle.stop();
            dropped += 1;
            debug!(text = %live.text, "stopped live playback");
        }
        if let Some(in_flight) = &self.in_flight {
            dropped += 1;
            debug!(text = %in_flight.text, "in-flight synthesis will be discarded");
        }
        self.draining = self.in_flight.is_some();
        info!(generation = self.generation, dropped, "playback queue invalidated");
        dropped
    }

    /// Whether [`next_event`](Self::next_event) has anything to report.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.draining || self.in_flight.is_some() || self.live.is_some()
    }

    /// Whether the drain loop is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Whether audio is sounding right now.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.live.is_some()
    }

    /// Sentences waiting behind the current one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Current generation; bumped by every invalidation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Advance the drain loop by one step.
    ///
    /// Cancel-safe: dropping the returned future loses no state, so it can
    /// sit in a `select!` next to other event sources. Pends forever while
    /// the queue is inactive.
    pub async fn next_event(&mut self) -> QueueEvent {
        loop {
            if let Some(live) = self.live.as_mut() {
                let outcome = live.handle.finished().await;
                let Some(live) = self.live.take() else {
                    continue;
                };
                return match outcome {
                    PlaybackOutcome::Completed | PlaybackOutcome::Stopped => QueueEvent::Finished { text: live.text },
                    PlaybackOutcome::Failed(message) => {
                        self.halt();
                        QueueEvent::Failed {
                            text: live.text,
                            error: SpeechError::Audio(message),
                        }
                    }
                };
            }

            if let Some(in_flight) = self.in_flight.as_mut() {
                let result = in_flight.future.as_mut().await;
                let Some(InFlight { generation, text, .. }) = self.in_flight.take() else {
                    continue;
                };
                if generation != self.generation {
                    debug!(generation, current = self.generation, text = %text, "discarding stale synthesis");
                    // Still draining: the next step reports `Drained` if nothing is pending.
                    self.draining = true;
                    return QueueEvent::Discarded { text, generation };
                }
                return self.start_playback(text, result);
            }

            if !self.draining {
                return std::future::pending().await;
            }

            let Some(sentence) = self.pending.pop_front() else {
                self.draining = false;
                return QueueEvent::Drained;
            };
            let cleaned = sanitize_for_speech(&sentence);
            if cleaned.is_empty() {
                debug!(text = %sentence, "nothing speakable; skipping");
                return QueueEvent::Skipped { text: sentence };
            }
            self.in_flight = Some(self.synthesize(sentence, cleaned));
        }
    }

    fn synthesize(&self, text: String, cleaned: String) -> InFlight {
        let synthesizer = Arc::clone(&self.synthesizer);
        let output = Arc::clone(&self.output);
        let voice = self.voice.clone();
        let future = async move {
            let audio = synthesizer.synthesize(&cleaned, voice.as_deref()).await?;
            output.prepare(audio).await
        }
        .boxed();
        InFlight {
            generation: self.generation,
            text,
            future,
        }
    }

    fn start_playback(&mut self, text: String, prepared: Result<PlaybackSource>) -> QueueEvent {
        let started = prepared.and_then(|source| self.output.start(source));
        match started {
            Ok(handle) => {
                debug_assert!(self.live.is_none(), "a second live playback handle");
                let kind = handle.kind();
                self.live = Some(Live {
                    text: text.clone(),
                    handle,
                });
                QueueEvent::Started { text, kind }
            }
            Err(error) => {
                warn!(error = %error, text = %text, "sentence abandoned");
                self.halt();
                QueueEvent::Failed { text, error }
            }
        }
    }

    fn halt(&mut self) {
        self.pending.clear();
        self.draining = false;
    }
}
