//! Generic HTTP-backed [`LlmClient`] for Ollama-compatible chat endpoints.
//!
//! Used for both the local and cloud model slots; which one a given
//! instance represents is just a matter of `endpoint` and `local_capable`.

use crate::error::LlmError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use qorch_core::{FinishReason, LlmClient, LlmParams, LlmStreamItem};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpLlmConfig {
    pub model: String,
    pub endpoint: String,
    pub local_capable: bool,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

pub struct HttpLlmClient {
    client: Client,
    config: HttpLlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: HttpLlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.endpoint.trim_end_matches('/'))
    }

    /// Opens the streaming connection, retrying transient (network/server)
    /// failures with doubling backoff before the first byte is read.
    async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, LlmError> {
        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    model = %self.config.model,
                    attempt,
                    ?backoff,
                    "retrying llm request"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.client.post(self.chat_url()).json(request).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status().is_server_error() => {
                    last_error = Some(LlmError::Network(format!("server error {}", response.status())));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(LlmError::Generation(format!("{status}: {body}")));
                }
                Err(e) => last_error = Some(LlmError::from(e)),
            }
        }

        Err(last_error.unwrap_or(LlmError::NoModelAvailable))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn local_capable(&self) -> bool {
        self.config.local_capable
    }

    fn stream(
        &self,
        prompt: &str,
        params: &LlmParams,
    ) -> Pin<Box<dyn Stream<Item = qorch_core::Result<LlmStreamItem>> + Send + '_>> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
            stream: true,
            options: ChatOptions { temperature: params.temperature, num_predict: params.max_tokens },
        };

        let stream = async_stream::try_stream! {
            let response = self.open_stream(&request).await.map_err(qorch_core::Error::from)?;
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut prompt_tokens = 0u32;
            let mut completion_tokens = 0u32;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| qorch_core::Error::from(LlmError::from(e)))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer = buffer[pos + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let parsed: StreamChunk = serde_json::from_str(&line)
                        .map_err(|e| qorch_core::Error::from(LlmError::Generation(e.to_string())))?;

                    if !parsed.message.content.is_empty() {
                        completion_tokens += 1;
                        yield LlmStreamItem::Token { chunk_index: completion_tokens - 1, content: parsed.message.content };
                    }
                    if parsed.done {
                        prompt_tokens = parsed.prompt_eval_count.unwrap_or(0);
                        yield LlmStreamItem::Done {
                            finish_reason: FinishReason::Stop,
                            prompt_tokens,
                            completion_tokens,
                            cost_usd: 0.0,
                        };
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    message: ChatMessage,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}
