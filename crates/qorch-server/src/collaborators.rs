//! HTTP-backed implementations of the retrieval, voice and audit
//! collaborator traits `qorch_core` defines but does not ship a concrete
//! client for. Modeled on `qorch_llm::http_client::HttpLlmClient`: a thin
//! `reqwest::Client` wrapper with a JSON request/response shape and
//! exponential backoff on transient failures.
//!
//! Endpoint configuration is read straight from the environment rather than
//! `qorch_config::Settings`, which has no fields for these backends.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use qorch_core::{AudioChunk, AudioDirection, AuditEvent, AuditSink, Result, SearchResult, SourceClient, SttClient, Transcript, TranscriptKind, TtsClient};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// A search source reached over HTTP: `POST {endpoint}/search {query, limit}`
/// returning a JSON array of results.
pub struct HttpSourceClient {
    client: Client,
    endpoint: String,
    dependency_key: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl HttpSourceClient {
    pub fn new(dependency_key: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| qorch_core::Error::Internal(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            dependency_key: dependency_key.into(),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.endpoint.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let request = SearchRequest { query, limit };
        let mut backoff = self.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::warn!(source = %self.dependency_key, attempt, ?backoff, "retrying source search");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.client.post(self.search_url()).json(&request).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<Vec<SearchResult>>()
                        .await
                        .map_err(|e| qorch_core::Error::Internal(e.to_string()));
                }
                Ok(response) if response.status().is_server_error() => {
                    last_error = Some(qorch_core::Error::Internal(format!("server error {}", response.status())));
                }
                Ok(response) => {
                    let status = response.status();
                    return Err(qorch_core::Error::Internal(format!("source {} returned {status}", self.dependency_key)));
                }
                Err(e) => last_error = Some(qorch_core::Error::Internal(e.to_string())),
            }
        }

        Err(last_error.unwrap_or_else(|| qorch_core::Error::Internal("source unreachable".to_string())))
    }

    fn dependency_key(&self) -> &str {
        &self.dependency_key
    }
}

/// Streams microphone audio to a websocket-free batch STT endpoint: the
/// chunk stream is buffered to completion, POSTed once, and the response's
/// transcript segments are replayed as a stream of `Transcript` items.
pub struct HttpSttClient {
    client: Client,
    endpoint: String,
}

impl HttpSttClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| qorch_core::Error::Internal(e.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    fn transcribe_url(&self) -> String {
        format!("{}/transcribe", self.endpoint.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    segments: Vec<TranscribeSegment>,
}

#[derive(Debug, Deserialize)]
struct TranscribeSegment {
    text: String,
    #[serde(default)]
    is_final: bool,
}

impl SttClient for HttpSttClient {
    fn transcribe_stream<'a>(
        &'a self,
        audio: Pin<Box<dyn Stream<Item = AudioChunk> + Send + 'a>>,
    ) -> Pin<Box<dyn Stream<Item = Result<Transcript>> + Send + 'a>> {
        let stream = async_stream::try_stream! {
            let mut audio = audio;
            let mut pcm: Vec<u8> = Vec::new();
            while let Some(chunk) = audio.next().await {
                if chunk.direction == AudioDirection::Ingress {
                    pcm.extend_from_slice(&chunk.pcm16);
                }
            }

            let response = self
                .client
                .post(self.transcribe_url())
                .header("content-type", "application/octet-stream")
                .body(pcm)
                .send()
                .await
                .map_err(|e| qorch_core::Error::Internal(e.to_string()))?;

            if !response.status().is_success() {
                Err(qorch_core::Error::Internal(format!("stt returned {}", response.status())))?;
            }

            let parsed: TranscribeResponse = response
                .json()
                .await
                .map_err(|e| qorch_core::Error::Internal(e.to_string()))?;

            for segment in parsed.segments {
                yield Transcript {
                    kind: if segment.is_final { TranscriptKind::UserFinal } else { TranscriptKind::UserPartial },
                    text: segment.text,
                    words: None,
                    message_id: None,
                };
            }
        };
        Box::pin(stream)
    }
}

/// Synthesizes one sentence at a time against a TTS endpoint returning raw
/// 16-bit PCM; each input string yields exactly one output `AudioChunk`.
pub struct HttpTtsClient {
    client: Client,
    endpoint: String,
}

impl HttpTtsClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| qorch_core::Error::Internal(e.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    fn synthesize_url(&self) -> String {
        format!("{}/synthesize", self.endpoint.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

impl TtsClient for HttpTtsClient {
    fn synthesize_stream<'a>(
        &'a self,
        text: Pin<Box<dyn Stream<Item = String> + Send + 'a>>,
    ) -> Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send + 'a>> {
        let stream = async_stream::try_stream! {
            let mut text = text;
            let mut sequence = 0u64;
            while let Some(sentence) = text.next().await {
                let response = self
                    .client
                    .post(self.synthesize_url())
                    .json(&SynthesizeRequest { text: &sentence })
                    .send()
                    .await
                    .map_err(|e| qorch_core::Error::Internal(e.to_string()))?;

                if !response.status().is_success() {
                    Err(qorch_core::Error::Internal(format!("tts returned {}", response.status())))?;
                }

                let bytes = response.bytes().await.map_err(|e| qorch_core::Error::Internal(e.to_string()))?;

                sequence += 1;
                yield AudioChunk {
                    sequence,
                    pcm16: bytes.to_vec(),
                    direction: AudioDirection::Egress,
                    timestamp: chrono::Utc::now(),
                };
            }
        };
        Box::pin(stream)
    }
}

/// Audit sink that writes structured log lines rather than persisting to a
/// durable store; a later iteration can swap this for one backed by a real
/// append-only log without touching `qorch_orchestrator`.
pub struct ConsoleAuditSink;

#[async_trait]
impl AuditSink for ConsoleAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<()> {
        tracing::info!(
            trace_id = %event.trace_id,
            session_id = %event.session_id,
            user_id_hash = %event.user_id_hash,
            action = %event.action,
            subject_id = %event.subject_id,
            outcome = %event.outcome,
            phi_involved = event.phi_involved,
            duration_ms = event.duration_ms,
            "audit"
        );
        Ok(())
    }
}
