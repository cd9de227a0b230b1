//! HTTP contract tests for the reply and synthesis collaborators.
//!
//! These verify request bodies, success parsing and the mapping of every
//! failure shape onto `SpeechError`, against a local mock server.

use futures_util::StreamExt;
use parley::audio::playback::AudioOutput;
use parley::config::{ReplyConfig, SpeechConfig, SynthesisConfig};
use parley::error::SpeechError;
use parley::pipeline::messages::{ControlEvent, ConversationState, Transcription};
use parley::reply::consumer::consume;
use parley::reply::{HttpReplySource, ReplySource};
use parley::stt::Recognizer;
use parley::test_utils::{RecordingRecognizer, RecordingVad, ScriptedOutput};
use parley::tts::{HttpSynthesizer, Synthesizer};
use parley::vad::VoiceActivity;
use parley::{Collaborators, RuntimeEvent, TurnController};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_BODY: &str = "data: {\"answer\":\"Hello\"}\n\ndata: {\"answer\":\" world.\"}\n\ndata: [DONE]\n\n";

fn reply_config(server: &MockServer) -> ReplyConfig {
    ReplyConfig {
        url: format!("{}/api/dify-stream", server.uri()),
        ..ReplyConfig::default()
    }
}

fn synthesis_config(server: &MockServer) -> SynthesisConfig {
    SynthesisConfig {
        url: format!("{}/api/azure-tts", server.uri()),
        ..SynthesisConfig::default()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reply service
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reply_stream_yields_deltas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dify-stream"))
        .and(body_partial_json(json!({"query": "hello", "user": "web-user", "inputs": {}})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpReplySource::new(reply_config(&server));
    let bytes = source.open("hello").await.expect("stream accepted");
    let deltas: Vec<String> = consume(bytes).map(|d| d.expect("delta")).collect().await;

    assert_eq!(deltas, vec!["Hello", " world."]);
}

#[tokio::test]
async fn reply_request_carries_configured_inputs_and_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "query": "weather",
            "user": "kiosk-7",
            "inputs": {"city": "Hangzhou"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = reply_config(&server);
    config.user = "kiosk-7".to_owned();
    config.inputs.insert("city".to_owned(), json!("Hangzhou"));
    let source = HttpReplySource::new(config);

    let bytes = source.open("weather").await.expect("stream accepted");
    let deltas: Vec<_> = consume(bytes).collect().await;
    assert!(deltas.is_empty());
}

#[tokio::test]
async fn reply_error_status_reports_error_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({"error": "model overloaded"})))
        .mount(&server)
        .await;

    let source = HttpReplySource::new(reply_config(&server));
    let Err(err) = source.open("hello").await else {
        panic!("expected upstream failure");
    };
    assert!(matches!(err, SpeechError::Upstream(_)));
    assert!(err.to_string().contains("model overloaded"), "{err}");
    assert!(err.to_string().contains("502"), "{err}");
}

#[tokio::test]
async fn reply_with_wrong_content_type_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "maintenance window"})))
        .mount(&server)
        .await;

    let source = HttpReplySource::new(reply_config(&server));
    let Err(err) = source.open("hello").await else {
        panic!("expected content-type failure");
    };
    assert!(matches!(err, SpeechError::Upstream(_)));
    assert!(err.to_string().contains("maintenance window"), "{err}");
}

#[tokio::test]
async fn unreachable_reply_service_is_upstream_error() {
    let source = HttpReplySource::new(ReplyConfig {
        url: "http://127.0.0.1:1/api/dify-stream".to_owned(),
        ..ReplyConfig::default()
    });
    let Err(err) = source.open("hello").await else {
        panic!("expected connection failure");
    };
    assert_eq!(err.code(), "UPSTREAM_FAILED");
}

// ────────────────────────────────────────────────────────────────────────────
// Synthesis service
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn synthesis_returns_audio_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/azure-tts"))
        .and(body_partial_json(json!({"text": "Hi."})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0xFF_u8, 0xFB, 0x90, 0x00], "audio/mpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let synth = HttpSynthesizer::new(synthesis_config(&server));
    let audio = synth.synthesize("Hi.", None).await.expect("audio");
    assert_eq!(audio.content_type, "audio/mpeg");
    assert_eq!(audio.bytes.as_ref(), &[0xFF, 0xFB, 0x90, 0x00]);
}

#[tokio::test]
async fn synthesis_sends_configured_voice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"text": "Hi.", "voice": "zh-CN-YunxiNeural"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1_u8, 2, 3], "audio/mpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = synthesis_config(&server);
    config.voice = Some("zh-CN-YunxiNeural".to_owned());
    let synth = HttpSynthesizer::new(config);
    assert_eq!(synth.default_voice(), Some("zh-CN-YunxiNeural"));
    synth.synthesize("Hi.", None).await.expect("audio");
}

#[tokio::test]
async fn synthesis_json_success_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "voice not found"})))
        .mount(&server)
        .await;

    let synth = HttpSynthesizer::new(synthesis_config(&server));
    let err = synth.synthesize("Hi.", None).await.unwrap_err();
    assert!(matches!(err, SpeechError::Tts(_)));
    assert!(err.to_string().contains("voice not found"), "{err}");
}

#[tokio::test]
async fn synthesis_error_status_reports_error_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "quota exceeded"})))
        .mount(&server)
        .await;

    let synth = HttpSynthesizer::new(synthesis_config(&server));
    let err = synth.synthesize("Hi.", None).await.unwrap_err();
    assert_eq!(err.code(), "TTS_FAILED");
    assert!(err.to_string().contains("quota exceeded"), "{err}");
}

#[tokio::test]
async fn synthesis_empty_audio_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(Vec::<u8>::new(), "audio/mpeg"))
        .mount(&server)
        .await;

    let synth = HttpSynthesizer::new(synthesis_config(&server));
    assert!(synth.synthesize("Hi.", None).await.is_err());
}

// ────────────────────────────────────────────────────────────────────────────
// Full turn over HTTP
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn turn_over_http_speaks_every_sentence() {
    let reply_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"query": "tell me"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"answer\":\"First. Second\"}\n\ndata: [DONE]\n\n", "text/event-stream"),
        )
        .expect(1)
        .mount(&reply_server)
        .await;

    let tts_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("AUDIO", "audio/mpeg"))
        .expect(2)
        .mount(&tts_server)
        .await;

    let mut config = SpeechConfig::default();
    config.reply = reply_config(&reply_server);
    config.synthesis = synthesis_config(&tts_server);

    let output = Arc::new(ScriptedOutput::new(Duration::from_millis(20)));
    let collaborators = Collaborators {
        reply: Arc::new(HttpReplySource::new(config.reply.clone())),
        synthesizer: Arc::new(HttpSynthesizer::new(config.synthesis.clone())),
        output: Arc::clone(&output) as Arc<dyn AudioOutput>,
        vad: Arc::new(RecordingVad::new()) as Arc<dyn VoiceActivity>,
        recognizer: Arc::new(RecordingRecognizer::new()) as Arc<dyn Recognizer>,
    };
    let (handle, _task) = TurnController::new(&config, collaborators).spawn();
    let mut events = handle.subscribe();

    handle.send(ControlEvent::Start).await.unwrap();
    handle.send(ControlEvent::SpeechStart).await.unwrap();
    handle
        .send(ControlEvent::Transcription(Transcription {
            text: "tell me".to_owned(),
            is_final: true,
        }))
        .await
        .unwrap();

    let mut sentences = Vec::new();
    let mut reached_speaking = false;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("turn finished in time")
            .expect("runtime channel open");
        match event {
            RuntimeEvent::AssistantSentence { text } => sentences.push(text),
            RuntimeEvent::StateChanged { to: ConversationState::Speaking, .. } => reached_speaking = true,
            RuntimeEvent::StateChanged { to: ConversationState::Idle, .. } if reached_speaking => break,
            RuntimeEvent::Error { code, message } => panic!("unexpected {code}: {message}"),
            _ => {}
        }
    }

    assert_eq!(sentences, vec!["First.", "Second"]);
    assert_eq!(output.started(), vec!["AUDIO", "AUDIO"]);
    handle.shutdown();
}
