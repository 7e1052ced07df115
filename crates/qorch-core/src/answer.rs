//! Answer generation (C7) and response assembly (C8) types.

use crate::intent::IntentTag;
use crate::source::{Citation, SourceQueryOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single streamed token/chunk from the Answer Generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerChunk {
    pub chunk_index: u32,
    pub content: String,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    ToolCall,
    Cancelled,
    Error,
}

/// Totals produced once generation completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub model_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub finish_reason: FinishReason,
}

/// Final, assembled response metadata (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub model_id: String,
    pub phi_detected: bool,
    pub intent: IntentTag,
    pub sources_queried: Vec<SourceQueryOutcome>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub trace_id: Uuid,
    pub tool_call_ids: Vec<Uuid>,
    pub degraded: bool,
}

/// The complete answer delivered to a client, with inline citation markers
/// aligned to `citations` (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub message_id: Uuid,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub metadata: ResponseMetadata,
}
