//! Core data model and collaborator traits for the query orchestrator.
//!
//! This crate provides the types and interfaces shared across all other
//! crates in the workspace:
//! - The request/response data model (§3): sessions, messages, PHI
//!   verdicts, intents, sources, results, citations, tool calls.
//! - Collaborator traits (§6): the narrow interfaces the orchestrator
//!   depends on for every external system (PHI detection, search sources,
//!   LLM/STT/TTS, stores, caches, confirmation, audit).
//! - The crate-wide error type.

pub mod answer;
pub mod breaker;
pub mod error;
pub mod intent;
pub mod message;
pub mod phi;
pub mod source;
pub mod tool;
pub mod traits;
pub mod voice;

pub use answer::{AnswerChunk, FinishReason, GeneratedAnswer, QueryResponse, ResponseMetadata};
pub use breaker::{BreakerMode, CircuitBreakerState};
pub use error::{Error, Result};
pub use intent::{Intent, IntentTag};
pub use message::{ClinicalContext, ConversationContext, Message, Session, TurnRole, UserPreferences};
pub use phi::{PhiEntityKind, PhiMode, PhiSpan, PhiVerdict};
pub use source::{
    Citation, RankedResult, SearchResult, SourceCapability, SourceDescriptor, SourceKind,
    SourceOutcome, SourceQueryOutcome,
};
pub use tool::{RiskLevel, ToolCall, ToolCallState, ToolDefinition, ToolErrorKind, ToolResult};
pub use traits::{
    AuditEvent, AuditSink, Cache, CallOutcome, ConfirmationChannel, ConversationStore,
    EmbeddingService, IntentClassifier, LlmClient, LlmParams, LlmStreamItem, PhiDetector,
    RerankerService, SourceClient, SttClient, ToolHandler, TtsClient,
};
pub use voice::{
    AudioChunk, AudioDirection, PipelineState, Transcript, TranscriptKind, VoiceSession,
    WordTimestamp,
};
