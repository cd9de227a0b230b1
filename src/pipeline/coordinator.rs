//! Turn controller: the single event loop that owns conversation state.
//!
//! Four sources feed the loop: control events (talk button, voice activity,
//! recognizer), the pending reply request, the reply delta stream and the
//! playback queue. Each `select!` arm handles exactly one step and returns,
//! so a barge-in is observed between any two sentences, deltas or reads.

use crate::audio::playback::AudioOutput;
use crate::config::SpeechConfig;
use crate::error::{Result, SpeechError};
use crate::pipeline::echo_guard::EchoGuard;
use crate::pipeline::messages::{ControlEvent, ConversationState, Transcription};
use crate::pipeline::playback_queue::{PlaybackQueue, QueueEvent};
use crate::reply::ReplySource;
use crate::reply::consumer::{ByteStream, DeltaStream, StreamConsumer, consume};
use crate::runtime::RuntimeEvent;
use crate::stt::Recognizer;
use crate::tts::Synthesizer;
use crate::vad::VoiceActivity;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Control channel capacity.
const CONTROL_CHANNEL_SIZE: usize = 64;
/// Runtime event broadcast capacity.
const RUNTIME_CHANNEL_SIZE: usize = 256;

/// Degraded-mode label reported when listening runs without a detector.
pub const SIMPLIFIED_MODE: &str = "simplified";

/// External engines the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub reply: Arc<dyn ReplySource>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub output: Arc<dyn AudioOutput>,
    pub vad: Arc<dyn VoiceActivity>,
    pub recognizer: Arc<dyn Recognizer>,
}

/// How the current session detects the start of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    /// Not started, or stopped by the user.
    Closed,
    /// The voice activity detector is armed.
    Detector,
    /// No detector; the recognizer is started directly.
    Simplified,
    /// Microphone refused. Nothing listens until the next `Start`.
    Denied,
}

impl Session {
    fn is_open(self) -> bool {
        matches!(self, Self::Detector | Self::Simplified)
    }
}

/// Cloneable handle for talking to a running [`TurnController`].
#[derive(Clone)]
pub struct ControlHandle {
    events: mpsc::Sender<ControlEvent>,
    state: watch::Receiver<ConversationState>,
    runtime: broadcast::Sender<RuntimeEvent>,
    cancel: CancellationToken,
}

impl ControlHandle {
    /// Deliver a control event to the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Channel`] once the controller has exited.
    pub async fn send(&self, event: ControlEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| SpeechError::Channel("turn controller has stopped".to_owned()))
    }

    /// Current conversation state.
    #[must_use]
    pub fn state(&self) -> ConversationState {
        *self.state.borrow()
    }

    /// Wait until the controller reports `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Channel`] if the controller exits first.
    pub async fn wait_for_state(&self, target: ConversationState) -> Result<()> {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| *s == target).await.map(|_| ());
        reached.map_err(|_| SpeechError::Channel("turn controller has stopped".to_owned()))
    }

    /// Subscribe to runtime events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.runtime.subscribe()
    }

    /// Ask the loop to exit.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled when the controller shuts down.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Owns [`ConversationState`] and every resource of a turn.
pub struct TurnController {
    state: ConversationState,
    session: Session,
    echo_guard: EchoGuard,
    echo_window: Duration,
    queue: PlaybackQueue,
    consumer: StreamConsumer,
    opening: Option<BoxFuture<'static, Result<ByteStream>>>,
    deltas: Option<DeltaStream>,
    reply: Arc<dyn ReplySource>,
    vad: Arc<dyn VoiceActivity>,
    recognizer: Arc<dyn Recognizer>,
    events_tx: mpsc::Sender<ControlEvent>,
    events_rx: mpsc::Receiver<ControlEvent>,
    state_tx: watch::Sender<ConversationState>,
    runtime_tx: broadcast::Sender<RuntimeEvent>,
    cancel: CancellationToken,
}

impl TurnController {
    /// Create an idle controller.
    pub fn new(config: &SpeechConfig, collaborators: Collaborators) -> Self {
        let (events_tx, events_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let (state_tx, _) = watch::channel(ConversationState::Idle);
        let (runtime_tx, _) = broadcast::channel(RUNTIME_CHANNEL_SIZE);
        let Collaborators {
            reply,
            synthesizer,
            output,
            vad,
            recognizer,
        } = collaborators;
        Self {
            state: ConversationState::Idle,
            session: Session::Closed,
            echo_guard: EchoGuard::new(),
            echo_window: config.echo_guard.window(),
            queue: PlaybackQueue::new(synthesizer, output, config.synthesis.voice.clone()),
            consumer: StreamConsumer::new(),
            opening: None,
            deltas: None,
            reply,
            vad,
            recognizer,
            events_tx,
            events_rx,
            state_tx,
            runtime_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish runtime events on an existing broadcast channel.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = tx;
        self
    }

    /// Handle for sending events and observing state.
    #[must_use]
    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            events: self.events_tx.clone(),
            state: self.state_tx.subscribe(),
            runtime: self.runtime_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Current conversation state.
    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> (ControlHandle, tokio::task::JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(error = %e, "turn controller exited with error");
            }
        });
        (handle, task)
    }

    /// Run until the cancel token fires.
    ///
    /// # Errors
    ///
    /// Currently always `Ok`; failures inside a turn are reported as
    /// [`RuntimeEvent::Error`] and never end the loop.
    pub async fn run(mut self) -> Result<()> {
        info!("turn controller started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_control(event),
                    None => break,
                },
                opened = next_opened(&mut self.opening) => self.on_reply_opened(opened),
                delta = next_delta(&mut self.deltas) => self.on_delta(delta),
                step = self.queue.next_event(), if self.queue.is_active() => self.on_queue_event(step),
            }
        }

        self.teardown();
        info!("turn controller stopped");
        Ok(())
    }

    // ── control events ──────────────────────────────────────────────

    fn handle_control(&mut self, event: ControlEvent) {
        debug!(?event, state = %self.state, "control event");
        match event {
            ControlEvent::Start => self.start_session(),
            ControlEvent::Stop => self.stop_session(),
            ControlEvent::SpeechStart => self.on_speech_start(),
            ControlEvent::SpeechEnd => self.on_speech_end(),
            ControlEvent::Transcription(t) => self.on_transcription(t),
            ControlEvent::RecognitionFailed { message } => {
                self.on_recognition_lost(SpeechError::Stt(message));
            }
            ControlEvent::RecognitionEnded => {
                self.on_recognition_lost(SpeechError::Stt("no speech recognized".to_owned()));
            }
            ControlEvent::VadFailed { permission, message } => {
                let err = if permission {
                    SpeechError::Permission(message)
                } else {
                    SpeechError::Vad(message)
                };
                self.detector_unavailable(err);
            }
        }
    }

    fn start_session(&mut self) {
        if self.session.is_open() {
            debug!(session = ?self.session, "session already running");
            return;
        }
        info!("session starting");
        self.session = Session::Detector;
        self.arm_detector();
    }

    fn stop_session(&mut self) {
        info!(state = %self.state, "manual stop");
        if let Err(e) = self.vad.pause() {
            warn!(error = %e, "failed to pause voice activity detector");
        }
        self.emit(RuntimeEvent::MicStatus { active: false });
        if self.state == ConversationState::Listening
            && let Err(e) = self.recognizer.stop()
        {
            warn!(error = %e, "failed to stop recognizer");
        }
        if self.state != ConversationState::Idle {
            self.interrupt();
        }
        self.session = Session::Closed;
        self.set_state(ConversationState::Idle);
    }

    fn on_speech_start(&mut self) {
        if !self.session.is_open() {
            debug!(session = ?self.session, "speech start outside a session; ignoring");
            return;
        }
        if self.state == ConversationState::Listening {
            return;
        }
        let now = tokio::time::Instant::now();
        if self.echo_guard.is_suppressed(now) {
            debug!(
                state = %self.state,
                remaining_ms = self.echo_guard.deadline().map_or(0, |d| d.duration_since(now).as_millis()),
                "speech start inside echo window; ignoring"
            );
            return;
        }
        if matches!(self.state, ConversationState::Thinking | ConversationState::Speaking) {
            info!(state = %self.state, "barge-in");
            self.interrupt();
        }
        self.begin_listening();
    }

    fn on_speech_end(&mut self) {
        if self.state != ConversationState::Listening {
            return;
        }
        if let Err(e) = self.recognizer.stop() {
            warn!(error = %e, "failed to finalize recognizer");
            self.emit(RuntimeEvent::from_error(&e));
        }
    }

    fn on_transcription(&mut self, transcription: Transcription) {
        if self.state != ConversationState::Listening {
            warn!(state = %self.state, text = %transcription.text, "transcription outside listening; ignoring");
            return;
        }
        let text = transcription.text.trim().to_owned();
        if !transcription.is_final {
            self.emit(RuntimeEvent::UserTranscript { text, is_final: false });
            return;
        }
        if text.is_empty() {
            info!("empty final transcription");
            self.set_state(ConversationState::Idle);
            self.rearm();
            return;
        }

        info!(text = %text, "user turn complete");
        self.emit(RuntimeEvent::UserTranscript {
            text: text.clone(),
            is_final: true,
        });
        let dropped = self.queue.invalidate();
        if dropped > 0 {
            self.emit(RuntimeEvent::Interrupted { dropped });
        }
        self.consumer.reset();
        self.deltas = None;
        let reply = Arc::clone(&self.reply);
        self.opening = Some(async move { reply.open(&text).await }.boxed());
        self.set_state(ConversationState::Thinking);
    }

    fn on_recognition_lost(&mut self, err: SpeechError) {
        if self.state != ConversationState::Listening {
            debug!(error = %err, state = %self.state, "recognizer event outside listening; ignoring");
            return;
        }
        warn!(error = %err, "recognition ended without a result");
        self.emit(RuntimeEvent::from_error(&err));
        self.set_state(ConversationState::Idle);
        match self.session {
            Session::Detector => self.arm_detector(),
            Session::Simplified => self.suspend_listening(),
            Session::Closed | Session::Denied => {}
        }
    }

    // ── reply stream ────────────────────────────────────────────────

    fn on_reply_opened(&mut self, opened: Result<ByteStream>) {
        match opened {
            Ok(bytes) => {
                info!("reply stream accepted");
                self.deltas = Some(consume(bytes));
                self.set_state(ConversationState::Speaking);
                self.echo_guard.arm(self.echo_window);
            }
            Err(e) => {
                error!(error = %e, "reply request failed");
                self.fail_turn(&e);
            }
        }
    }

    fn on_delta(&mut self, delta: Option<Result<String>>) {
        match delta {
            Some(Ok(delta)) => {
                self.emit(RuntimeEvent::AssistantDelta { text: delta.clone() });
                let sentences = self.consumer.push_delta(&delta);
                self.enqueue_all(sentences);
            }
            Some(Err(e)) => {
                error!(error = %e, "reply stream broke");
                self.deltas = None;
                self.fail_turn(&e);
            }
            None => {
                self.deltas = None;
                let tail = self.consumer.finish();
                debug!(flushed = tail.is_some(), sentences = self.consumer.sentences_emitted(), "reply stream ended");
                self.enqueue_all(tail);
                self.emit(RuntimeEvent::AssistantComplete);
                if !self.queue.is_active() {
                    self.finish_turn();
                }
            }
        }
    }

    fn enqueue_all(&mut self, sentences: impl IntoIterator<Item = String>) {
        let mut queued = false;
        for sentence in sentences {
            self.emit(RuntimeEvent::AssistantSentence { text: sentence.clone() });
            self.queue.enqueue(sentence);
            queued = true;
        }
        if queued {
            self.queue.drain();
        }
    }

    // ── playback queue ──────────────────────────────────────────────

    fn on_queue_event(&mut self, step: QueueEvent) {
        match step {
            QueueEvent::Started { text, kind } => {
                debug!(?kind, text = %text, "playback started");
                self.echo_guard.arm(self.echo_window);
                self.emit(RuntimeEvent::PlaybackStarted { text });
            }
            QueueEvent::Finished { text } => {
                self.emit(RuntimeEvent::PlaybackFinished { text });
            }
            QueueEvent::Skipped { text } => {
                debug!(text = %text, "skipped unspeakable sentence");
            }
            QueueEvent::Discarded { text, generation } => {
                debug!(generation, text = %text, "stale synthesis dropped");
            }
            QueueEvent::Failed { text, error } => {
                error!(error = %error, text = %text, "sentence could not be spoken");
                self.fail_turn(&error);
            }
            QueueEvent::Drained => {
                if self.state == ConversationState::Speaking && self.deltas.is_none() {
                    self.finish_turn();
                }
            }
        }
    }

    // ── transitions ─────────────────────────────────────────────────

    /// Drop the reply, empty the queue and silence the speaker.
    fn interrupt(&mut self) {
        self.opening = None;
        self.deltas = None;
        self.consumer.reset();
        let dropped = self.queue.invalidate();
        info!(dropped, generation = self.queue.generation(), "interrupted");
        self.emit(RuntimeEvent::Interrupted { dropped });
    }

    fn begin_listening(&mut self) {
        match self.recognizer.start() {
            Ok(()) => self.set_state(ConversationState::Listening),
            Err(e) => {
                error!(error = %e, "failed to start recognizer");
                self.emit(RuntimeEvent::from_error(&e));
                self.set_state(ConversationState::Idle);
                match self.session {
                    Session::Detector => self.arm_detector(),
                    Session::Simplified => self.suspend_listening(),
                    Session::Closed | Session::Denied => {}
                }
            }
        }
    }

    /// Natural end of a turn.
    fn finish_turn(&mut self) {
        info!("turn finished");
        self.set_state(ConversationState::Idle);
        self.rearm();
    }

    /// Unrecoverable failure inside a turn: report, reset and re-arm.
    fn fail_turn(&mut self, err: &SpeechError) {
        self.emit(RuntimeEvent::from_error(err));
        self.opening = None;
        self.deltas = None;
        self.consumer.reset();
        self.queue.invalidate();
        self.set_state(ConversationState::Idle);
        self.rearm();
    }

    /// Get ready for the next user turn.
    fn rearm(&mut self) {
        match self.session {
            Session::Detector => self.arm_detector(),
            Session::Simplified => self.begin_listening(),
            Session::Closed | Session::Denied => {}
        }
    }

    fn arm_detector(&mut self) {
        if self.session != Session::Detector {
            return;
        }
        match self.vad.resume() {
            Ok(()) => self.emit(RuntimeEvent::MicStatus { active: true }),
            Err(e) => self.detector_unavailable(e),
        }
    }

    fn detector_unavailable(&mut self, err: SpeechError) {
        if err.is_session_fatal() {
            error!(error = %err, "microphone unavailable for this session");
            self.session = Session::Denied;
            self.emit(RuntimeEvent::from_error(&err));
            self.emit(RuntimeEvent::MicStatus { active: false });
            return;
        }
        if self.session != Session::Detector {
            debug!(error = %err, session = ?self.session, "detector failure outside a detector session; ignoring");
            return;
        }
        warn!(error = %err, "voice activity detector unavailable; listening without it");
        self.session = Session::Simplified;
        self.emit(RuntimeEvent::DegradedMode {
            mode: SIMPLIFIED_MODE.to_owned(),
        });
        if self.state == ConversationState::Idle {
            self.begin_listening();
        }
    }

    /// Without a detector nothing can restart the recognizer, so the session
    /// closes with the mic reported inactive until the next `Start`.
    fn suspend_listening(&mut self) {
        warn!("listening without a detector ended; waiting for the next start");
        self.session = Session::Closed;
        self.emit(RuntimeEvent::MicStatus { active: false });
    }

    fn set_state(&mut self, to: ConversationState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!(%from, %to, "state change");
        self.state = to;
        self.state_tx.send_replace(to);
        self.emit(RuntimeEvent::StateChanged { from, to });
    }

    fn emit(&self, event: RuntimeEvent) {
        // No subscribers is fine.
        let _ = self.runtime_tx.send(event);
    }

    fn teardown(&mut self) {
        self.opening = None;
        self.deltas = None;
        self.queue.invalidate();
        if self.session.is_open()
            && let Err(e) = self.vad.pause()
        {
            warn!(error = %e, "failed to pause voice activity detector on shutdown");
        }
        self.session = Session::Closed;
        self.set_state(ConversationState::Idle);
    }
}

async fn next_opened(opening: &mut Option<BoxFuture<'static, Result<ByteStream>>>) -> Result<ByteStream> {
    match opening.as_mut() {
        Some(future) => {
            let result = future.await;
            *opening = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn next_delta(deltas: &mut Option<DeltaStream>) -> Option<Result<String>> {
    match deltas.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
