//! Turn controller scenarios driven by scripted collaborators on a paused
//! tokio clock.

use parley::audio::playback::AudioOutput;
use parley::config::SpeechConfig;
use parley::pipeline::messages::{ControlEvent, ConversationState, Transcription};
use parley::reply::ReplySource;
use parley::stt::Recognizer;
use parley::test_utils::{
    RecordingRecognizer, RecordingVad, ScriptedOutput, ScriptedReply, ScriptedReplySource, ScriptedSynthesizer,
};
use parley::tts::Synthesizer;
use parley::vad::VoiceActivity;
use parley::{Collaborators, ControlHandle, RuntimeEvent, TurnController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Rig {
    reply: Arc<ScriptedReplySource>,
    synth: Arc<ScriptedSynthesizer>,
    output: Arc<ScriptedOutput>,
    vad: Arc<RecordingVad>,
    recognizer: Arc<RecordingRecognizer>,
    handle: ControlHandle,
    events: broadcast::Receiver<RuntimeEvent>,
    log: Vec<RuntimeEvent>,
}

impl Rig {
    fn spawn(config: SpeechConfig, play_for: Duration) -> Self {
        Self::spawn_with(config, play_for, ScriptedSynthesizer::new())
    }

    /// Synthesis takes `latency` per sentence, so barge-ins can land mid-call.
    fn with_synthesis_latency(latency: Duration, play_for: Duration) -> Self {
        Self::spawn_with(SpeechConfig::default(), play_for, ScriptedSynthesizer::with_latency(latency))
    }

    fn spawn_with(config: SpeechConfig, play_for: Duration, synth: ScriptedSynthesizer) -> Self {
        let reply = Arc::new(ScriptedReplySource::new());
        let synth = Arc::new(synth);
        let output = Arc::new(ScriptedOutput::new(play_for));
        let vad = Arc::new(RecordingVad::new());
        let recognizer = Arc::new(RecordingRecognizer::new());
        let collaborators = Collaborators {
            reply: Arc::clone(&reply) as Arc<dyn ReplySource>,
            synthesizer: Arc::clone(&synth) as Arc<dyn Synthesizer>,
            output: Arc::clone(&output) as Arc<dyn AudioOutput>,
            vad: Arc::clone(&vad) as Arc<dyn VoiceActivity>,
            recognizer: Arc::clone(&recognizer) as Arc<dyn Recognizer>,
        };
        let controller = TurnController::new(&config, collaborators);
        let handle = controller.handle();
        let events = handle.subscribe();
        tokio::spawn(controller.run());
        Self {
            reply,
            synth,
            output,
            vad,
            recognizer,
            handle,
            events,
            log: Vec::new(),
        }
    }

    fn new() -> Self {
        Self::spawn(SpeechConfig::default(), Duration::from_millis(300))
    }

    async fn send(&self, event: ControlEvent) {
        self.handle.send(event).await.expect("controller running");
    }

    async fn say(&self, text: &str) {
        self.send(ControlEvent::Transcription(Transcription {
            text: text.to_owned(),
            is_final: true,
        }))
        .await;
    }

    /// Receive events until `done` matches one; everything seen is logged.
    async fn until(&mut self, done: impl Fn(&RuntimeEvent) -> bool) -> RuntimeEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(120), self.events.recv())
                .await
                .expect("timed out waiting for runtime event")
                .expect("runtime channel open");
            self.log.push(event.clone());
            if done(&event) {
                return event;
            }
        }
    }

    async fn until_state(&mut self, target: ConversationState) {
        self.until(|e| matches!(e, RuntimeEvent::StateChanged { to, .. } if *to == target))
            .await;
    }

    /// Let every ready task run without advancing past `ms`.
    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn states(&self) -> Vec<ConversationState> {
        self.log
            .iter()
            .filter_map(|e| match e {
                RuntimeEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<String> {
        self.log
            .iter()
            .filter_map(|e| match e {
                RuntimeEvent::Error { code, .. } => Some(code.clone()),
                _ => None,
            })
            .collect()
    }

    async fn start_listening(&mut self) {
        self.send(ControlEvent::Start).await;
        self.send(ControlEvent::SpeechStart).await;
        self.until_state(ConversationState::Listening).await;
    }
}

// ---------------------------------------------------------------------------
// Full turns
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn full_turn_speaks_in_order_and_returns_to_idle() {
    let mut rig = Rig::new();
    rig.reply.push(ScriptedReply::answers(
        &["Hello", " world.", " How are", " you?"],
        Duration::from_millis(20),
    ));

    rig.start_listening().await;
    rig.say("hi there").await;
    rig.until_state(ConversationState::Speaking).await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(
        rig.states(),
        vec![
            ConversationState::Listening,
            ConversationState::Thinking,
            ConversationState::Speaking,
            ConversationState::Idle,
        ]
    );
    assert_eq!(rig.reply.queries(), vec!["hi there"]);
    assert_eq!(rig.synth.requests(), vec!["Hello world.", "How are you?"]);
    assert_eq!(rig.output.started(), vec!["Hello world.", "How are you?"]);
    assert_eq!(rig.recognizer.calls(), vec!["start"]);
    assert!(rig.vad.is_armed());
    assert!(rig.log.contains(&RuntimeEvent::AssistantComplete));
    assert!(rig.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deltas_joined_into_one_sentence() {
    let mut rig = Rig::new();
    rig.reply.push(ScriptedReply::answers(&["Hello", " world."], Duration::from_millis(10)));

    rig.start_listening().await;
    rig.say("greet me").await;
    rig.until_state(ConversationState::Idle).await;

    let sentences: Vec<_> = rig
        .log
        .iter()
        .filter_map(|e| match e {
            RuntimeEvent::AssistantSentence { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sentences, vec!["Hello world."]);
    assert_eq!(rig.synth.requests(), vec!["Hello world."]);
}

#[tokio::test(start_paused = true)]
async fn unterminated_tail_is_flushed_at_stream_end() {
    let mut rig = Rig::new();
    rig.reply.push(ScriptedReply::answers(&["A. B. C"], Duration::from_millis(10)));

    rig.start_listening().await;
    rig.say("letters").await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.synth.requests(), vec!["A.", "B.", "C"]);
}

#[tokio::test(start_paused = true)]
async fn empty_reply_goes_straight_back_to_idle() {
    let mut rig = Rig::new();
    rig.reply.push(ScriptedReply::answers(&[], Duration::from_millis(10)));

    rig.start_listening().await;
    rig.say("say nothing").await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(
        rig.states(),
        vec![
            ConversationState::Listening,
            ConversationState::Thinking,
            ConversationState::Speaking,
            ConversationState::Idle,
        ]
    );
    assert!(rig.synth.requests().is_empty());
    assert!(rig.vad.is_armed());
}

#[tokio::test(start_paused = true)]
async fn configured_voice_reaches_synthesizer() {
    let mut config = SpeechConfig::default();
    config.synthesis.voice = Some("zh-CN-XiaoxiaoNeural".to_owned());
    let mut rig = Rig::spawn(config, Duration::from_millis(100));
    rig.reply.push(ScriptedReply::answers(&["Done."], Duration::from_millis(10)));

    rig.start_listening().await;
    rig.say("voice").await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.synth.voices(), vec![Some("zh-CN-XiaoxiaoNeural".to_owned())]);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn non_audio_synthesis_payload_fails_the_turn() {
    let mut rig = Rig::new();
    rig.synth.reply_json_on("Hello.");
    rig.reply.push(ScriptedReply::answers(&["Hello.", " More."], Duration::from_millis(10)));

    rig.start_listening().await;
    rig.say("break it").await;
    rig.until(|e| matches!(e, RuntimeEvent::Error { .. })).await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.errors(), vec!["PLAYBACK_FAILED"]);
    assert!(rig.output.started().is_empty());
    assert_eq!(rig.synth.requests(), vec!["Hello."]);
    assert!(rig.vad.is_armed());
}

#[tokio::test(start_paused = true)]
async fn synthesis_error_fails_the_turn() {
    let mut rig = Rig::new();
    rig.synth.fail_on("Two.");
    rig.reply.push(ScriptedReply::answers(&["One. Two. Three."], Duration::from_millis(10)));

    rig.start_listening().await;
    rig.say("count").await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.errors(), vec!["TTS_FAILED"]);
    assert_eq!(rig.output.started(), vec!["One."]);
    assert_eq!(rig.synth.requests(), vec!["One.", "Two."]);
}

#[tokio::test(start_paused = true)]
async fn rejected_reply_returns_to_idle_and_rearms() {
    let mut rig = Rig::new();
    rig.reply.push(ScriptedReply::Reject {
        after: Duration::from_millis(100),
        message: "HTTP 502: bad gateway".to_owned(),
    });

    rig.start_listening().await;
    rig.say("anyone there").await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.errors(), vec!["UPSTREAM_FAILED"]);
    assert!(!rig.states().contains(&ConversationState::Speaking));
    assert_eq!(rig.vad.calls(), vec!["resume", "resume"]);
    assert!(rig.synth.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn broken_stream_abandons_the_turn() {
    let mut rig = Rig::spawn(SpeechConfig::default(), Duration::from_secs(5));
    rig.reply.push(ScriptedReply::BreakAfter {
        chunks: vec!["data: {\"answer\":\"First one. Sec\"}\n".to_owned()],
    });

    rig.start_listening().await;
    rig.say("go").await;
    rig.until_state(ConversationState::Idle).await;
    Rig::settle(10).await;

    assert_eq!(rig.errors(), vec!["UPSTREAM_FAILED"]);
    assert!(rig.synth.requests().len() <= 1);
    assert!(rig.vad.is_armed());
    assert_eq!(rig.handle.state(), ConversationState::Idle);
}

#[tokio::test(start_paused = true)]
async fn recognizer_end_without_result_returns_to_idle() {
    let mut rig = Rig::new();
    rig.start_listening().await;
    rig.send(ControlEvent::RecognitionEnded).await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.errors(), vec!["STT_FAILED"]);
    assert_eq!(rig.vad.calls(), vec!["resume", "resume"]);
}

#[tokio::test(start_paused = true)]
async fn recognizer_failure_returns_to_idle() {
    let mut rig = Rig::new();
    rig.start_listening().await;
    rig.send(ControlEvent::RecognitionFailed {
        message: "network".to_owned(),
    })
    .await;
    rig.until_state(ConversationState::Idle).await;
    assert_eq!(rig.errors(), vec!["STT_FAILED"]);
}

#[tokio::test(start_paused = true)]
async fn transcription_outside_listening_is_ignored() {
    let rig = Rig::new();
    rig.send(ControlEvent::Start).await;
    rig.say("stray").await;
    Rig::settle(50).await;

    assert!(rig.reply.queries().is_empty());
    assert_eq!(rig.handle.state(), ConversationState::Idle);
}

// ---------------------------------------------------------------------------
// Barge-in and the echo window
// ---------------------------------------------------------------------------

async fn speaking_three_sentences(rig: &mut Rig) {
    rig.reply.push(ScriptedReply::answers(&["One. Two. Three."], Duration::from_millis(10)));
    rig.start_listening().await;
    rig.say("count to three").await;
    rig.until(|e| matches!(e, RuntimeEvent::PlaybackStarted { text } if text == "One."))
        .await;
}

#[tokio::test(start_paused = true)]
async fn speech_after_echo_window_interrupts() {
    let mut rig = Rig::spawn(SpeechConfig::default(), Duration::from_secs(5));
    speaking_three_sentences(&mut rig).await;

    Rig::settle(1300).await;
    rig.send(ControlEvent::SpeechStart).await;
    rig.until_state(ConversationState::Listening).await;
    Rig::settle(1).await;

    assert!(rig.log.contains(&RuntimeEvent::Interrupted { dropped: 3 }));
    assert_eq!(rig.output.stopped_count(), 1);
    assert_eq!(rig.output.started(), vec!["One."]);
    assert_eq!(rig.synth.requests(), vec!["One."]);
    assert_eq!(rig.recognizer.calls(), vec!["start", "start"]);
}

#[tokio::test(start_paused = true)]
async fn speech_inside_echo_window_is_ignored() {
    let mut rig = Rig::spawn(SpeechConfig::default(), Duration::from_secs(5));
    speaking_three_sentences(&mut rig).await;

    Rig::settle(500).await;
    rig.send(ControlEvent::SpeechStart).await;
    Rig::settle(10).await;

    assert_eq!(rig.handle.state(), ConversationState::Speaking);
    assert_eq!(rig.recognizer.calls(), vec!["start"]);
    assert_eq!(rig.output.stopped_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn echo_window_follows_each_sentence() {
    let mut config = SpeechConfig::default();
    config.echo_guard.window_ms = 1200;
    let mut rig = Rig::spawn(config, Duration::from_millis(1000));
    speaking_three_sentences(&mut rig).await;

    // "Two." starts at ~1000 ms and re-arms the window until ~2200 ms.
    rig.until(|e| matches!(e, RuntimeEvent::PlaybackStarted { text } if text == "Two."))
        .await;
    Rig::settle(700).await;
    rig.send(ControlEvent::SpeechStart).await;
    Rig::settle(10).await;
    assert_eq!(rig.handle.state(), ConversationState::Speaking);
}

#[tokio::test(start_paused = true)]
async fn barge_in_while_thinking_drops_the_reply() {
    let mut rig = Rig::new();
    rig.reply.push(ScriptedReply::Stream {
        accept_after: Duration::from_secs(2),
        every: Duration::from_millis(10),
        chunks: vec!["data: {\"answer\":\"Too late.\"}\n".to_owned()],
    });

    rig.start_listening().await;
    rig.say("slow one").await;
    rig.until_state(ConversationState::Thinking).await;
    rig.send(ControlEvent::SpeechStart).await;
    rig.until_state(ConversationState::Listening).await;
    Rig::settle(5000).await;

    assert_eq!(rig.handle.state(), ConversationState::Listening);
    assert!(!rig.states().contains(&ConversationState::Speaking));
    assert!(rig.synth.requests().is_empty());
    assert!(rig.log.contains(&RuntimeEvent::Interrupted { dropped: 0 }));
}

#[tokio::test(start_paused = true)]
async fn new_turn_after_barge_in_plays_only_new_sentences() {
    let mut rig = Rig::spawn(SpeechConfig::default(), Duration::from_secs(2));
    speaking_three_sentences(&mut rig).await;
    rig.reply.push(ScriptedReply::answers(&["Fresh start."], Duration::from_millis(10)));

    Rig::settle(1500).await;
    rig.send(ControlEvent::SpeechStart).await;
    rig.until_state(ConversationState::Listening).await;
    rig.say("never mind").await;
    rig.until(|e| matches!(e, RuntimeEvent::PlaybackFinished { text } if text == "Fresh start."))
        .await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.output.started(), vec!["One.", "Fresh start."]);
    assert_eq!(rig.reply.queries(), vec!["count to three", "never mind"]);
}

/// Barge in while the first sentence of "hello" is still being synthesized.
async fn barge_in_during_synthesis(rig: &mut Rig) {
    rig.start_listening().await;
    rig.say("hello").await;
    rig.until_state(ConversationState::Speaking).await;
    Rig::settle(1500).await;
    assert_eq!(rig.synth.requests(), vec!["First sentence."]);
    assert!(rig.output.started().is_empty());

    rig.send(ControlEvent::SpeechStart).await;
    rig.until(|e| matches!(e, RuntimeEvent::Interrupted { .. })).await;
    rig.until_state(ConversationState::Listening).await;
}

#[tokio::test(start_paused = true)]
async fn empty_reply_after_stale_synthesis_returns_to_idle() {
    let mut rig = Rig::with_synthesis_latency(Duration::from_secs(2), Duration::from_millis(300));
    rig.reply
        .push(ScriptedReply::answers(&["First sentence."], Duration::from_millis(10)));
    rig.reply.push(ScriptedReply::answers(&[], Duration::from_millis(10)));
    barge_in_during_synthesis(&mut rig).await;

    rig.say("actually nothing").await;
    rig.until_state(ConversationState::Speaking).await;
    rig.until_state(ConversationState::Idle).await;
    Rig::settle(5_000).await;

    assert_eq!(rig.handle.state(), ConversationState::Idle);
    assert!(rig.log.contains(&RuntimeEvent::Interrupted { dropped: 1 }));
    assert!(rig.output.started().is_empty());
    assert!(rig.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_synthesis_is_never_played_in_the_next_turn() {
    let mut rig = Rig::with_synthesis_latency(Duration::from_secs(2), Duration::from_millis(300));
    rig.reply
        .push(ScriptedReply::answers(&["First sentence."], Duration::from_millis(10)));
    rig.reply.push(ScriptedReply::answers(&["Fresh."], Duration::from_millis(10)));
    barge_in_during_synthesis(&mut rig).await;

    rig.say("something else").await;
    rig.until(|e| matches!(e, RuntimeEvent::PlaybackFinished { text } if text == "Fresh."))
        .await;
    rig.until_state(ConversationState::Idle).await;

    assert_eq!(rig.output.started(), vec!["Fresh."]);
    assert_eq!(rig.synth.requests(), vec!["First sentence.", "Fresh."]);
    assert_eq!(rig.reply.queries(), vec!["hello", "something else"]);
}

// ---------------------------------------------------------------------------
// Session control
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn manual_stop_pauses_detector_and_silences_playback() {
    let mut rig = Rig::spawn(SpeechConfig::default(), Duration::from_secs(5));
    speaking_three_sentences(&mut rig).await;

    rig.send(ControlEvent::Stop).await;
    rig.until_state(ConversationState::Idle).await;
    Rig::settle(10).await;

    assert_eq!(rig.vad.calls().last(), Some(&"pause"));
    assert!(rig.log.contains(&RuntimeEvent::MicStatus { active: false }));
    assert_eq!(rig.output.stopped_count(), 1);

    // The session is closed: detections no longer start a turn.
    rig.send(ControlEvent::SpeechStart).await;
    Rig::settle(10).await;
    assert_eq!(rig.handle.state(), ConversationState::Idle);
    assert_eq!(rig.recognizer.calls(), vec!["start"]);
}

#[tokio::test(start_paused = true)]
async fn permission_refusal_ends_the_session() {
    let mut rig = Rig::new();
    rig.vad.fail_resume(true, "NotAllowedError");

    rig.send(ControlEvent::Start).await;
    rig.until(|e| matches!(e, RuntimeEvent::Error { .. })).await;
    rig.send(ControlEvent::SpeechStart).await;
    Rig::settle(10).await;

    assert_eq!(rig.errors(), vec!["PERMISSION_DENIED"]);
    assert_eq!(rig.handle.state(), ConversationState::Idle);
    assert!(rig.recognizer.calls().is_empty());

    // A fresh start is allowed once the user grants access.
    rig.vad.heal();
    rig.send(ControlEvent::Start).await;
    rig.until(|e| *e == RuntimeEvent::MicStatus { active: true }).await;
    rig.send(ControlEvent::SpeechStart).await;
    rig.until_state(ConversationState::Listening).await;
}

#[tokio::test(start_paused = true)]
async fn detector_failure_falls_back_to_simplified_listening() {
    let mut rig = Rig::new();
    rig.vad.fail_resume(false, "audio worklet unavailable");
    rig.reply.push(ScriptedReply::answers(&["Sure."], Duration::from_millis(10)));

    rig.send(ControlEvent::Start).await;
    rig.until(|e| matches!(e, RuntimeEvent::DegradedMode { .. })).await;
    rig.until_state(ConversationState::Listening).await;

    rig.say("hello").await;
    rig.until_state(ConversationState::Speaking).await;
    rig.until_state(ConversationState::Idle).await;
    rig.until_state(ConversationState::Listening).await;

    assert_eq!(rig.recognizer.calls(), vec!["start", "start"]);
    assert!(
        rig.log
            .contains(&RuntimeEvent::DegradedMode { mode: "simplified".to_owned() })
    );
    assert!(rig.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn vad_failure_event_mid_session_switches_mode() {
    let mut rig = Rig::new();
    rig.send(ControlEvent::Start).await;
    rig.send(ControlEvent::VadFailed {
        permission: false,
        message: "stream ended".to_owned(),
    })
    .await;
    rig.until_state(ConversationState::Listening).await;
    assert_eq!(rig.recognizer.calls(), vec!["start"]);
}

#[tokio::test(start_paused = true)]
async fn speech_end_asks_recognizer_to_finalize() {
    let mut rig = Rig::new();
    rig.start_listening().await;
    rig.send(ControlEvent::SpeechEnd).await;
    Rig::settle(10).await;
    assert_eq!(rig.recognizer.calls(), vec!["start", "stop"]);
    assert_eq!(rig.handle.state(), ConversationState::Listening);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_loop() {
    let rig = Rig::new();
    rig.handle.shutdown();
    Rig::settle(10).await;
    assert!(rig.handle.send(ControlEvent::Start).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn detector_failure_after_stop_keeps_session_closed() {
    let mut rig = Rig::new();
    rig.send(ControlEvent::Start).await;
    rig.send(ControlEvent::Stop).await;
    rig.until(|e| *e == RuntimeEvent::MicStatus { active: false }).await;

    rig.send(ControlEvent::VadFailed {
        permission: false,
        message: "stream ended".to_owned(),
    })
    .await;
    Rig::settle(10).await;

    assert_eq!(rig.handle.state(), ConversationState::Idle);
    assert!(rig.recognizer.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn detector_failure_before_start_is_ignored() {
    let rig = Rig::new();
    rig.send(ControlEvent::VadFailed {
        permission: false,
        message: "stream ended".to_owned(),
    })
    .await;
    Rig::settle(10).await;

    assert_eq!(rig.handle.state(), ConversationState::Idle);
    assert!(rig.recognizer.calls().is_empty());

    rig.send(ControlEvent::SpeechStart).await;
    Rig::settle(10).await;
    assert_eq!(rig.handle.state(), ConversationState::Idle);
}

#[tokio::test(start_paused = true)]
async fn denied_session_stays_denied_after_detector_failure() {
    let mut rig = Rig::new();
    rig.vad.fail_resume(true, "NotAllowedError");
    rig.send(ControlEvent::Start).await;
    rig.until(|e| matches!(e, RuntimeEvent::Error { .. })).await;

    rig.send(ControlEvent::VadFailed {
        permission: false,
        message: "stream ended".to_owned(),
    })
    .await;
    Rig::settle(10).await;

    assert_eq!(rig.handle.state(), ConversationState::Idle);
    assert!(rig.recognizer.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn simplified_mode_relistens_after_empty_transcription() {
    let mut rig = Rig::new();
    rig.vad.fail_resume(false, "audio worklet unavailable");
    rig.send(ControlEvent::Start).await;
    rig.until_state(ConversationState::Listening).await;

    rig.say("   ").await;
    rig.until_state(ConversationState::Idle).await;
    rig.until_state(ConversationState::Listening).await;

    assert_eq!(rig.recognizer.calls(), vec!["start", "start"]);
    assert!(rig.reply.queries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn simplified_recognition_failure_waits_for_next_start() {
    let mut rig = Rig::new();
    rig.vad.fail_resume(false, "audio worklet unavailable");
    rig.send(ControlEvent::Start).await;
    rig.until_state(ConversationState::Listening).await;

    rig.send(ControlEvent::RecognitionFailed {
        message: "network".to_owned(),
    })
    .await;
    rig.until_state(ConversationState::Idle).await;
    rig.until(|e| *e == RuntimeEvent::MicStatus { active: false }).await;
    Rig::settle(10).await;
    assert_eq!(rig.handle.state(), ConversationState::Idle);
    assert_eq!(rig.recognizer.calls(), vec!["start"]);

    rig.send(ControlEvent::Start).await;
    rig.until_state(ConversationState::Listening).await;
    assert_eq!(rig.recognizer.calls(), vec!["start", "start"]);
    assert_eq!(rig.errors(), vec!["STT_FAILED"]);
}
