//! Session, conversation context, and message types (§3).

use crate::intent::Intent;
use crate::source::Citation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
    Tool,
}

/// One message within a session's history. User messages are immutable on
/// receipt; assistant messages become immutable once `response.done` fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub citations: Vec<Citation>,
    pub tool_call_id: Option<Uuid>,
}

impl Message {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            citations: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Snapshot of clinical context pinned to a session (e.g. an active patient
/// chart reference). Opaque to the orchestrator beyond being threaded
/// through to the prompt builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalContext {
    pub summary: String,
    pub fields: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    pub preferred_sources: Vec<String>,
    pub excluded_sources: Vec<String>,
}

/// A user account's active conversation. Owned by the orchestrator for the
/// session's active window; persisted externally. Created on first request;
/// expires from the cache after a bounded idle interval (default 30 min).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub pinned_clinical_context: Option<ClinicalContext>,
    pub preferences: UserPreferences,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            created_at: now,
            last_activity_at: now,
            pinned_clinical_context: None,
            preferences: UserPreferences::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity_at
    }
}

/// Bounded, derived view over a session's recent history (§3, §4.10).
/// Mutated only by the orchestrator; written through cache then store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: Uuid,
    pub history: std::collections::VecDeque<Message>,
    pub history_limit: usize,
    pub pinned_clinical_context: Option<ClinicalContext>,
    pub preferences: UserPreferences,
    pub current_intent: Option<Intent>,
    pub awaiting_clarification: bool,
}

impl ConversationContext {
    pub fn new(session_id: Uuid, history_limit: usize) -> Self {
        Self {
            session_id,
            history: std::collections::VecDeque::with_capacity(history_limit),
            history_limit,
            pinned_clinical_context: None,
            preferences: UserPreferences::default(),
            current_intent: None,
            awaiting_clarification: false,
        }
    }

    /// Appends a message, dropping the oldest entry in FIFO order once the
    /// cap is reached (§3 invariant: history length never exceeds N).
    pub fn append(&mut self, message: Message) {
        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    /// Last `n` messages in chronological order, for prompt building (§4.7).
    pub fn recent(&self, n: usize) -> Vec<&Message> {
        let len = self.history.len();
        let start = len.saturating_sub(n);
        self.history.iter().skip(start).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_drops_oldest_once_cap_reached() {
        let session_id = Uuid::new_v4();
        let mut ctx = ConversationContext::new(session_id, 2);
        ctx.append(Message::new(TurnRole::User, "first"));
        ctx.append(Message::new(TurnRole::Assistant, "second"));
        ctx.append(Message::new(TurnRole::User, "third"));
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history.front().unwrap().content, "second");
    }

    #[test]
    fn recent_returns_chronological_tail() {
        let mut ctx = ConversationContext::new(Uuid::new_v4(), 10);
        for i in 0..5 {
            ctx.append(Message::new(TurnRole::User, format!("msg {i}")));
        }
        let last_two = ctx.recent(2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "msg 3");
        assert_eq!(last_two[1].content, "msg 4");
    }
}
