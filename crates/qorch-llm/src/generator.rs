//! Answer Generator (C7).

use crate::error::LlmError;
use futures::StreamExt;
use qorch_core::{AnswerChunk, FinishReason, GeneratedAnswer, LlmClient, LlmParams, LlmStreamItem};
use std::sync::Arc;

/// What happened on one `generate` call. A `ToolCallRequested` outcome means
/// generation suspended; the caller routes the request through the Tool
/// Executor (C9) and calls `generate` again with the tool result folded into
/// the prompt to resume (§4.7 "Tool-call protocol").
pub enum GenerateOutcome {
    Complete(GeneratedAnswer),
    ToolCallRequested {
        name: String,
        arguments: serde_json::Value,
        chunks_so_far: Vec<AnswerChunk>,
    },
}

/// Streams an answer from `client`, invoking `on_chunk` for every emitted
/// token in issuance order with a gap-free `chunk_index` sequence starting
/// at 0. Measures and logs time-to-first-token.
pub async fn generate(
    prompt: &str,
    client: &Arc<dyn LlmClient>,
    params: &LlmParams,
    mut on_chunk: impl FnMut(&AnswerChunk),
) -> Result<GenerateOutcome, LlmError> {
    let mut stream = client.stream(prompt, params);
    let start = std::time::Instant::now();
    let mut first_token_logged = false;
    let mut text = String::new();
    let mut chunks = Vec::new();
    let mut next_index = 0u32;

    while let Some(item) = stream.next().await {
        let item = item.map_err(|e| LlmError::Generation(e.to_string()))?;
        match item {
            LlmStreamItem::Token { content, .. } => {
                if !first_token_logged {
                    tracing::info!(
                        model = client.model_id(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "first token"
                    );
                    first_token_logged = true;
                }
                let chunk = AnswerChunk { chunk_index: next_index, content: content.clone() };
                next_index += 1;
                text.push_str(&content);
                on_chunk(&chunk);
                chunks.push(chunk);
            }
            LlmStreamItem::ToolCallRequested { name, arguments } => {
                return Ok(GenerateOutcome::ToolCallRequested {
                    name,
                    arguments,
                    chunks_so_far: chunks,
                });
            }
            LlmStreamItem::Done {
                finish_reason,
                prompt_tokens,
                completion_tokens,
                cost_usd,
            } => {
                return Ok(GenerateOutcome::Complete(GeneratedAnswer {
                    text,
                    model_id: client.model_id().to_string(),
                    prompt_tokens,
                    completion_tokens,
                    cost_usd,
                    finish_reason,
                }));
            }
        }
    }

    // Stream closed without an explicit Done marker: treat as a clean stop.
    Ok(GenerateOutcome::Complete(GeneratedAnswer {
        text,
        model_id: client.model_id().to_string(),
        prompt_tokens: 0,
        completion_tokens: next_index,
        cost_usd: 0.0,
        finish_reason: FinishReason::Stop,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::Stream;
    use qorch_core::Result;
    use std::pin::Pin;

    struct StubClient;

    #[async_trait]
    impl LlmClient for StubClient {
        fn model_id(&self) -> &str {
            "stub"
        }
        fn local_capable(&self) -> bool {
            true
        }
        fn stream(
            &self,
            _prompt: &str,
            _params: &LlmParams,
        ) -> Pin<Box<dyn Stream<Item = Result<LlmStreamItem>> + Send + '_>> {
            Box::pin(futures::stream::iter(vec![
                Ok(LlmStreamItem::Token { chunk_index: 0, content: "Hello".to_string() }),
                Ok(LlmStreamItem::Token { chunk_index: 1, content: " world".to_string() }),
                Ok(LlmStreamItem::Done {
                    finish_reason: FinishReason::Stop,
                    prompt_tokens: 10,
                    completion_tokens: 2,
                    cost_usd: 0.001,
                }),
            ]))
        }
    }

    #[tokio::test]
    async fn chunk_indices_are_gap_free_from_zero() {
        let client: Arc<dyn LlmClient> = Arc::new(StubClient);
        let mut seen = Vec::new();
        let outcome = generate(
            "prompt",
            &client,
            &LlmParams { temperature: 0.2, max_tokens: 100 },
            |chunk| seen.push(chunk.chunk_index),
        )
        .await
        .unwrap();
        assert_eq!(seen, vec![0, 1]);
        match outcome {
            GenerateOutcome::Complete(answer) => assert_eq!(answer.text, "Hello world"),
            _ => panic!("expected completion"),
        }
    }
}
