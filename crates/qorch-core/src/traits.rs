//! Collaborator interfaces consumed by the orchestrator (§6). Every external
//! system the orchestrator depends on — PHI detectors, search sources,
//! LLM/STT/TTS providers, stores, caches — is reached only through one of
//! these narrow traits, never through a concrete client type.

use crate::answer::FinishReason;
use crate::error::Result;
use crate::message::{ConversationContext, Message};
use crate::phi::PhiVerdict;
use crate::source::SearchResult;
use crate::tool::ToolResult;
use crate::voice::AudioChunk;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// C1 collaborator. Pure, side-effect-free; `detect` must not mutate state.
#[async_trait]
pub trait PhiDetector: Send + Sync + 'static {
    async fn detect(&self, text: &str) -> Result<PhiVerdict>;
}

/// C2 collaborator. Implementations may be rule-based or learned; the
/// orchestrator tries the learned backend first and falls back to rules
/// when it is unavailable (§4.2).
#[async_trait]
pub trait IntentClassifier: Send + Sync + 'static {
    async fn classify(&self, text: &str, context: &ConversationContext) -> Result<crate::intent::Intent>;
}

/// C4 collaborator; one instance per `SourceDescriptor`.
#[async_trait]
pub trait SourceClient: Send + Sync + 'static {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Dependency key this client registers under with the circuit breaker
    /// registry (C11). Defaults to the source name.
    fn dependency_key(&self) -> &str;
}

/// Optional collaborator used by the reranker's fallback scoring path.
#[async_trait]
pub trait EmbeddingService: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// C5 collaborator.
#[async_trait]
pub trait RerankerService: Send + Sync + 'static {
    async fn score(&self, query: &str, docs: &[String]) -> Result<Vec<f32>>;
}

/// A single streamed token plus an end-of-stream marker carrying totals.
#[derive(Debug, Clone)]
pub enum LlmStreamItem {
    Token { chunk_index: u32, content: String },
    ToolCallRequested { name: String, arguments: serde_json::Value },
    Done {
        finish_reason: FinishReason,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost_usd: f64,
    },
}

#[derive(Debug, Clone)]
pub struct LlmParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// C6/C7 collaborator. One implementation per model backend (local, cloud).
#[async_trait]
pub trait LlmClient: Send + Sync + 'static {
    fn model_id(&self) -> &str;

    /// Whether this backend may be used to answer PHI-bearing queries.
    fn local_capable(&self) -> bool;

    fn stream(
        &self,
        prompt: &str,
        params: &LlmParams,
    ) -> Pin<Box<dyn Stream<Item = Result<LlmStreamItem>> + Send + '_>>;
}

/// C14 collaborator.
#[async_trait]
pub trait SttClient: Send + Sync + 'static {
    fn transcribe_stream<'a>(
        &'a self,
        audio: Pin<Box<dyn Stream<Item = AudioChunk> + Send + 'a>>,
    ) -> Pin<Box<dyn Stream<Item = Result<crate::voice::Transcript>> + Send + 'a>>;
}

/// C14 collaborator.
#[async_trait]
pub trait TtsClient: Send + Sync + 'static {
    fn synthesize_stream<'a>(
        &'a self,
        text: Pin<Box<dyn Stream<Item = String> + Send + 'a>>,
    ) -> Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send + 'a>>;
}

/// C9 collaborator: the executable behavior behind one registered tool name.
/// Handlers receive only a narrow callback surface (user, args), not the
/// orchestrator itself (§9 design notes: "cyclic references... tool handlers
/// receive a narrow callback surface").
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, args: serde_json::Value, user_id: &str) -> Result<serde_json::Value>;
}

/// C10 collaborator: persistent store for sessions and messages.
#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    async fn load_session(&self, session_id: Uuid) -> Result<Option<crate::message::Session>>;
    async fn save_session(&self, session: &crate::message::Session) -> Result<()>;
    /// Most recent `limit` messages, in chronological order.
    async fn load_recent_messages(&self, session_id: Uuid, limit: usize) -> Result<Vec<Message>>;
    async fn append_message(&self, session_id: Uuid, message: &Message) -> Result<()>;
}

/// C10 collaborator: write-through cache in front of `ConversationStore`.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn invalidate(&self, key: &str) -> Result<()>;
}

/// C9 collaborator: correlates a tool-confirmation request with the user's
/// eventual approve/deny response delivered over the transport.
#[async_trait]
pub trait ConfirmationChannel: Send + Sync + 'static {
    /// Publishes a confirmation request and awaits the correlated response,
    /// or `Ok(false)` if the 60s window elapses with no response.
    async fn request(&self, call_id: Uuid, payload: serde_json::Value) -> Result<bool>;
}

/// C13 collaborator.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub trace_id: Uuid,
    pub user_id_hash: String,
    pub session_id: Uuid,
    pub action: String,
    pub subject_id: String,
    pub outcome: String,
    pub phi_involved: bool,
    pub duration_ms: u64,
}

#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    /// Non-blocking, at-least-once. Implementations must not let a slow or
    /// failing downstream persist block the caller past enqueue.
    async fn append(&self, event: AuditEvent) -> Result<()>;
}

/// Outcome recorded against a circuit breaker key (C11). Only transient
/// failures should count toward the consecutive-failure threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysCleanDetector;

    #[async_trait]
    impl PhiDetector for AlwaysCleanDetector {
        async fn detect(&self, _text: &str) -> Result<PhiVerdict> {
            Ok(PhiVerdict::clean())
        }
    }

    #[tokio::test]
    async fn trait_object_is_usable_behind_arc() {
        let detector: std::sync::Arc<dyn PhiDetector> = std::sync::Arc::new(AlwaysCleanDetector);
        let verdict = detector.detect("no phi here").await.unwrap();
        assert!(!verdict.has_phi);
    }
}
