//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! routes them into the turn controller, and writes `ResponseEnvelope` and
//! `EventEnvelope` messages as newline-delimited JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::audio::playback::{AudioOutput, SpeakerOutput};
use crate::config::SpeechConfig;
use crate::error::{Result, SpeechError};
use crate::host::collaborators::{HostRecognizer, HostVoiceActivity};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::handler::{HostCommandHandler, forward_runtime_events};
use crate::pipeline::coordinator::{Collaborators, TurnController};
use crate::reply::{HttpReplySource, ReplySource};
use crate::tts::{HttpSynthesizer, Synthesizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

/// Default event broadcast channel capacity for the stdio bridge.
const EVENT_CAPACITY: usize = 256;

/// How long to wait for trailing events to reach stdout on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Network and speaker services; the detector and recognizer are the host's.
#[derive(Clone)]
pub struct BridgeServices {
    pub reply: Arc<dyn ReplySource>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub output: Arc<dyn AudioOutput>,
}

impl BridgeServices {
    /// HTTP collaborators and the local speaker, as configured.
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            reply: Arc::new(HttpReplySource::new(config.reply.clone())),
            synthesizer: Arc::new(HttpSynthesizer::new(config.synthesis.clone())),
            output: Arc::new(SpeakerOutput::new(&config.audio)),
        }
    }
}

/// Run the bridge over the process's stdin and stdout.
///
/// Returns when stdin closes or a `runtime.stop` command is received.
pub async fn run_stdio_bridge(config: SpeechConfig) -> Result<()> {
    let services = BridgeServices::from_config(&config);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = BufWriter::new(tokio::io::stdout());
    run_bridge(&config, services, stdin, stdout).await
}

/// Run the bridge over arbitrary line-oriented streams.
///
/// Three concurrent tasks operate in parallel:
///
/// 1. **Reader** -- reads newline-delimited JSON commands, routes each one
///    through the [`HostCommandHandler`], and writes the response.
/// 2. **Event writer** -- writes every [`EventEnvelope`] (runtime events
///    and host engine requests) as a JSON line.
/// 3. **Controller** -- the turn controller event loop.
pub async fn run_bridge<R, W>(config: &SpeechConfig, services: BridgeServices, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = broadcast::channel::<EventEnvelope>(EVENT_CAPACITY);
    let writer = Arc::new(Mutex::new(output));

    let event_handle = tokio::spawn(write_events(event_rx, Arc::clone(&writer)));

    let collaborators = Collaborators {
        reply: services.reply,
        synthesizer: services.synthesizer,
        output: services.output,
        vad: Arc::new(HostVoiceActivity::new(event_tx.clone())),
        recognizer: Arc::new(HostRecognizer::new(event_tx.clone(), config.recognizer.clone())),
    };
    let controller = TurnController::new(config, collaborators);
    let control = controller.handle();
    let forward_handle = tokio::spawn(forward_runtime_events(control.subscribe(), event_tx));
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            tracing::error!(error = %e, "turn controller failed");
        }
    });

    let handler = HostCommandHandler::new(control.clone());
    let reader_result = run_reader(&handler, input, &writer).await;

    // Stopping the controller drops its runtime sender and the host
    // collaborators' event senders, which lets both forwarders drain.
    control.shutdown();
    drop(handler);
    drop(control);
    let _ = controller_handle.await;
    let _ = forward_handle.await;
    let mut event_handle = event_handle;
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut event_handle).await.is_err() {
        tracing::warn!("event writer did not drain in time");
        event_handle.abort();
    }

    reader_result
}

async fn write_events<W>(mut event_rx: broadcast::Receiver<EventEnvelope>, writer: Arc<Mutex<W>>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        match event_rx.recv().await {
            Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                Ok(json) => {
                    let mut w = writer.lock().await;
                    if let Err(e) = write_line(&mut *w, &json).await {
                        tracing::warn!(
                            error = %e,
                            "failed to write event envelope; stopping event writer"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event writer lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("event channel closed; stopping event writer");
                break;
            }
        }
    }
}

/// Read commands line-by-line, route each one, and write responses.
async fn run_reader<R, W>(handler: &HostCommandHandler, mut reader: R, writer: &Mutex<W>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| SpeechError::Channel(format!("failed to read from stdin: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                let response = ResponseEnvelope::error("parse-error", format!("failed to parse command envelope: {e}"));
                write_response(writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let response = handler.respond(&envelope).await;
        write_response(writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

async fn write_response<W>(writer: &Mutex<W>, response: &ResponseEnvelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response)
        .map_err(|e| SpeechError::Pipeline(format!("failed to serialize response envelope: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut *w, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W>(writer: &mut W, json: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| SpeechError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| SpeechError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| SpeechError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
