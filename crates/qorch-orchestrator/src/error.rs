//! Orchestrator-level error, carrying the user-visible failure shape from
//! §7 (`code`, `message`, optional `retry_after`, `trace_id`, `component`).

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("query failed validation: {0}")]
    Validation(String),

    #[error("tool call denied: {0}")]
    PermissionDenied(String),

    #[error("arguments contain protected health information")]
    PhiViolation,

    #[error("rate limit exceeded, retry after {0:?}")]
    RateLimitExceeded(Duration),

    #[error("no knowledge source available")]
    KbUnavailable,

    #[error("model generation timed out")]
    LlmTimeout,

    #[error("no model available under the current routing policy")]
    LlmUnavailable,

    #[error("tool execution timed out")]
    ToolTimeout,

    #[error("tool execution failed: {0}")]
    ToolInternalError(String),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// The `code` field of the user-visible error shape (§6 error codes).
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "VALIDATION_ERROR",
            OrchestratorError::PermissionDenied(_) => "PERMISSION_DENIED",
            OrchestratorError::PhiViolation => "PHI_VIOLATION",
            OrchestratorError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            OrchestratorError::KbUnavailable => "KB_UNAVAILABLE",
            OrchestratorError::LlmTimeout => "LLM_TIMEOUT",
            OrchestratorError::LlmUnavailable => "LLM_UNAVAILABLE",
            OrchestratorError::ToolTimeout => "TOOL_TIMEOUT",
            OrchestratorError::ToolInternalError(_) => "TOOL_INTERNAL_ERROR",
            OrchestratorError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            OrchestratorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OrchestratorError::RateLimitExceeded(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<qorch_core::Error> for OrchestratorError {
    fn from(err: qorch_core::Error) -> Self {
        match err {
            qorch_core::Error::SessionNotFound(id) => OrchestratorError::SessionNotFound(id),
            qorch_core::Error::Validation(msg) => OrchestratorError::Validation(msg),
            qorch_core::Error::Timeout(_) => OrchestratorError::LlmTimeout,
            other => OrchestratorError::Internal(other.to_string()),
        }
    }
}

impl From<qorch_llm::LlmError> for OrchestratorError {
    fn from(err: qorch_llm::LlmError) -> Self {
        match err {
            qorch_llm::LlmError::NoModelAvailable | qorch_llm::LlmError::PhiRoutingDenied => {
                OrchestratorError::LlmUnavailable
            }
            qorch_llm::LlmError::Network(_) => OrchestratorError::LlmTimeout,
            qorch_llm::LlmError::Generation(msg) => OrchestratorError::Internal(msg),
        }
    }
}
