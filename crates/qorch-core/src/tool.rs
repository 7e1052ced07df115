//! Tool execution data types (C9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Static description of a registered tool, carried by the tool registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub argument_schema: serde_json::Value,
    pub category: String,
    pub requires_phi: bool,
    pub requires_confirmation: bool,
    pub risk_level: RiskLevel,
    /// Per-(tool,user) quota within the rate limiter's sliding window.
    pub rate_limit_per_minute: u32,
    pub timeout_seconds: u64,
}

/// State machine positions for a `ToolCall`, per spec.md §4.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Received,
    Validated,
    Authorized,
    RateChecked,
    AwaitingConfirmation,
    Executing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolErrorKind {
    ValidationError,
    PermissionDenied,
    PhiViolation,
    RateLimitExceeded,
    Timeout,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Uuid,
    pub name: String,
    pub arguments: serde_json::Value,
    pub session_id: Uuid,
    pub user_id: String,
    pub trace_id: Uuid,
    pub state: ToolCallState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(
        name: impl Into<String>,
        arguments: serde_json::Value,
        session_id: Uuid,
        user_id: impl Into<String>,
        trace_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            arguments,
            session_id,
            user_id: user_id.into(),
            trace_id,
            state: ToolCallState::Received,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, state: ToolCallState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: Uuid,
    pub success: bool,
    pub payload: Option<serde_json::Value>,
    pub error_kind: Option<ToolErrorKind>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(call_id: Uuid, payload: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            call_id,
            success: true,
            payload: Some(payload),
            error_kind: None,
            error_message: None,
            duration_ms,
        }
    }

    pub fn failure(
        call_id: Uuid,
        error_kind: ToolErrorKind,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            call_id,
            success: false,
            payload: None,
            error_kind: Some(error_kind),
            error_message: Some(message.into()),
            duration_ms,
        }
    }
}
