//! WebSocket Handler
//!
//! Translates the `ClientEvent`/`ServerEvent` wire contract to and from
//! `Orchestrator::process_query` and, when voice is enabled for the
//! connection, a per-session `VoicePipeline`.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{stream, SinkExt, StreamExt};
use qorch_core::{AudioChunk, AudioDirection, Citation, PipelineState, ResponseMetadata, TranscriptKind};
use qorch_voice::{PipelineEvent, VoicePipeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::confirmation::CURRENT_SESSION;
use crate::session::Session;
use crate::state::AppState;

/// Inbound frames a client may send over the connection (SPEC_FULL.md §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "message")]
    Message { text: String },
    #[serde(rename = "audio.input")]
    AudioInput { data: String },
    #[serde(rename = "audio.input.complete")]
    AudioInputComplete,
    #[serde(rename = "barge_in")]
    BargeIn,
    #[serde(rename = "tool.confirmation")]
    ToolConfirmation { call_id: Uuid, approved: bool },
    #[serde(rename = "ping")]
    Ping,
}

/// Outbound frames the server may send over the connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.ready")]
    SessionReady { session_id: Uuid },
    #[serde(rename = "transcript.partial")]
    TranscriptPartial { text: String },
    #[serde(rename = "transcript.final")]
    TranscriptFinal { text: String },
    #[serde(rename = "response.start")]
    ResponseStart { trace_id: Uuid },
    #[serde(rename = "response.chunk")]
    ResponseChunk { text: String },
    #[serde(rename = "response.done")]
    ResponseDone { message_id: Uuid, citations: Vec<Citation>, metadata: ResponseMetadata },
    #[serde(rename = "audio.output")]
    AudioOutput { data: String },
    #[serde(rename = "tool.call_request")]
    ToolCallRequest { call_id: Uuid, name: String, arguments: serde_json::Value },
    #[serde(rename = "voice.state")]
    VoiceState { state: PipelineState },
    #[serde(rename = "error")]
    Error { code: String, message: String, retry_after_ms: Option<u64>, trace_id: Uuid },
    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: Option<String>,
    voice: Option<bool>,
    voice_name: Option<String>,
    language: Option<String>,
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let session_id = Uuid::new_v4();
    let user_id = query.user_id.unwrap_or_else(|| format!("anon-{session_id}"));
    crate::metrics::record_ws_connections(1);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.confirmation_router.register_connection(session_id, out_tx.clone());

    let voice_pipeline = if query.voice.unwrap_or(false) {
        Some(spawn_voice_pipeline(&state, session_id, query.voice_name, query.language, out_tx.clone()))
    } else {
        None
    };

    let session = Arc::new(Session::new(session_id, user_id.clone(), voice_pipeline.clone()));
    if state.sessions.insert(session.clone()).is_err() {
        let _ = out_tx.send(ServerEvent::Error {
            code: "CAPACITY".to_string(),
            message: "too many active sessions".to_string(),
            retry_after_ms: None,
            trace_id: session_id,
        });
    }

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else { continue };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let _ = out_tx.send(ServerEvent::SessionReady { session_id });

    let mut audio_buffer: Vec<u8> = Vec::new();

    while let Some(Ok(message)) = ws_rx.next().await {
        session.touch();

        if state.rate_limiter.check(&session_id.to_string()).is_err() {
            let _ = out_tx.send(ServerEvent::Error {
                code: "RATE_LIMITED".to_string(),
                message: "too many messages this minute".to_string(),
                retry_after_ms: Some(1000),
                trace_id: session_id,
            });
            continue;
        }

        let event: Option<ClientEvent> = match message {
            WsMessage::Text(text) => serde_json::from_str(&text).ok(),
            WsMessage::Binary(data) => {
                audio_buffer.extend_from_slice(&data);
                None
            }
            WsMessage::Close(_) => break,
            _ => None,
        };

        let Some(event) = event else { continue };

        match event {
            ClientEvent::Ping => {
                let _ = out_tx.send(ServerEvent::Pong);
            }
            ClientEvent::Message { text } => {
                dispatch_query(&state, &session, session_id, &user_id, &out_tx, text).await;
            }
            ClientEvent::AudioInput { data } => {
                if let Ok(bytes) = BASE64.decode(data) {
                    audio_buffer.extend_from_slice(&bytes);
                }
            }
            ClientEvent::AudioInputComplete => {
                let pcm = std::mem::take(&mut audio_buffer);
                if let Some(pipeline) = &voice_pipeline {
                    if let Some(text) = transcribe_buffer(&state, pcm, pipeline).await {
                        dispatch_query(&state, &session, session_id, &user_id, &out_tx, text).await;
                    }
                }
            }
            ClientEvent::BargeIn => {
                if let Some(pipeline) = &voice_pipeline {
                    pipeline.cancel(0);
                }
            }
            ClientEvent::ToolConfirmation { call_id, approved } => {
                state.confirmation_router.resolve(call_id, approved);
            }
        }
    }

    state.confirmation_router.unregister_connection(session_id);
    state.sessions.remove(session_id);
    writer.abort();
    crate::metrics::record_ws_connections(-1);
}

/// Wires a voice pipeline for this connection and spawns the task that
/// forwards its events onto the connection's outbound channel.
fn spawn_voice_pipeline(
    state: &Arc<AppState>,
    session_id: Uuid,
    voice_name: Option<String>,
    language: Option<String>,
    out_tx: mpsc::UnboundedSender<ServerEvent>,
) -> Arc<VoicePipeline> {
    let voice_session = qorch_core::VoiceSession::new(
        session_id,
        session_id,
        voice_name.unwrap_or_else(|| "default".to_string()),
        language.unwrap_or_else(|| "en-US".to_string()),
    );
    let (pipeline, mut events) =
        VoicePipeline::new(voice_session, state.tts.clone(), state.turn_config.clone(), state.barge_in_config.clone());
    let pipeline = Arc::new(pipeline);

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let server_event = match event {
                PipelineEvent::StateChanged(state) => Some(ServerEvent::VoiceState { state }),
                PipelineEvent::Transcript(t) => Some(match t.kind {
                    TranscriptKind::UserPartial => ServerEvent::TranscriptPartial { text: t.text },
                    TranscriptKind::UserFinal => ServerEvent::TranscriptFinal { text: t.text },
                    TranscriptKind::Assistant => ServerEvent::ResponseChunk { text: t.text },
                }),
                PipelineEvent::ResponseChunk { text, .. } => Some(ServerEvent::ResponseChunk { text }),
                PipelineEvent::Audio(chunk) => Some(ServerEvent::AudioOutput { data: BASE64.encode(&chunk.pcm16) }),
                PipelineEvent::BargeIn { .. } => None,
                PipelineEvent::Error(message) => {
                    Some(ServerEvent::Error { code: "VOICE_ERROR".to_string(), message, retry_after_ms: None, trace_id: session_id })
                }
            };
            if let Some(server_event) = server_event {
                if out_tx.send(server_event).is_err() {
                    break;
                }
            }
        }
    });

    pipeline
}

/// Runs one query through the orchestrator and streams its answer back.
/// `Orchestrator::process_query` resolves to a single assembled response
/// rather than a token stream, so the connection sees one `response.chunk`
/// before `response.done`; this is the limit of the current orchestrator
/// API, not a transport simplification.
async fn dispatch_query(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    session_id: Uuid,
    user_id: &str,
    out_tx: &mpsc::UnboundedSender<ServerEvent>,
    text: String,
) {
    let trace_id = Uuid::new_v4();
    let _ = out_tx.send(ServerEvent::ResponseStart { trace_id });

    if let Some(pipeline) = &session.voice {
        pipeline.begin_generating();
    }

    let started = Instant::now();
    let result = CURRENT_SESSION.scope(session_id, state.orchestrator.process_query(session_id, user_id, trace_id, &text)).await;

    match result {
        Ok(response) => {
            crate::metrics::record_query_latency(started.elapsed(), response.metadata.degraded);
            let _ = out_tx.send(ServerEvent::ResponseChunk { text: response.answer.text.clone() });

            if let Some(pipeline) = &session.voice {
                for sentence in pipeline.push_generated_token(&response.answer.text) {
                    speak(pipeline, sentence).await;
                }
                if let Some(sentence) = pipeline.flush_generated() {
                    speak(pipeline, sentence).await;
                }
                pipeline.finish_turn();
            }

            let _ = out_tx.send(ServerEvent::ResponseDone {
                message_id: response.message_id,
                citations: response.citations,
                metadata: response.metadata,
            });
        }
        Err(err) => {
            crate::metrics::record_error("ws.message", err.code());
            if let Some(pipeline) = &session.voice {
                pipeline.fail(err.to_string());
            }
            let _ = out_tx.send(ServerEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
                retry_after_ms: err.retry_after().map(|d| d.as_millis() as u64),
                trace_id,
            });
        }
    }
}

async fn speak(pipeline: &Arc<VoicePipeline>, sentence: String) {
    if let Err(err) = pipeline.speak_chunk(sentence).await {
        tracing::warn!(error = %err, "tts synthesis failed");
    }
}

/// Batches buffered PCM16 audio through the STT collaborator once the
/// client signals end-of-utterance, replaying partial transcripts into the
/// pipeline and returning the final transcript text, if any.
async fn transcribe_buffer(state: &Arc<AppState>, pcm: Vec<u8>, pipeline: &Arc<VoicePipeline>) -> Option<String> {
    if pcm.is_empty() {
        return None;
    }

    let chunk = AudioChunk { sequence: 0, pcm16: pcm, direction: AudioDirection::Ingress, timestamp: chrono::Utc::now() };
    let audio_stream: std::pin::Pin<Box<dyn futures::Stream<Item = AudioChunk> + Send>> = Box::pin(stream::once(async move { chunk }));
    let mut transcripts = state.stt.transcribe_stream(audio_stream);

    let mut final_text = None;
    while let Some(result) = transcripts.next().await {
        match result {
            Ok(transcript) => {
                let is_final = transcript.kind == TranscriptKind::UserFinal;
                pipeline.emit_transcript(transcript.clone());
                if is_final {
                    final_text = Some(transcript.text);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "stt transcription failed");
                break;
            }
        }
    }
    final_text
}
