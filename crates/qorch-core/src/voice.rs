//! Voice pipeline data types (C14).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Listening,
    Processing,
    ToolCalling,
    Generating,
    Speaking,
    Cancelled,
}

/// Lifecycle and quality-metric snapshot for one voice session (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSession {
    pub session_id: Uuid,
    pub conversation_id: Uuid,
    pub voice: String,
    pub language: String,
    pub state: PipelineState,
    pub ingress_bytes: u64,
    pub egress_bytes: u64,
    pub last_barge_in_offset_ms: Option<u64>,
}

impl VoiceSession {
    pub fn new(session_id: Uuid, conversation_id: Uuid, voice: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            session_id,
            conversation_id,
            voice: voice.into(),
            language: language.into(),
            state: PipelineState::Idle,
            ingress_bytes: 0,
            egress_bytes: 0,
            last_barge_in_offset_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioDirection {
    Ingress,
    Egress,
}

/// PCM16 audio chunk with a monotonic per-direction sequence index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub sequence: u64,
    pub pcm16: Vec<u8>,
    pub direction: AudioDirection,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptKind {
    UserPartial,
    UserFinal,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start_ms: u32,
    pub end_ms: u32,
}

/// Speech-to-text or text-to-speech transcript fragment. Linked to a
/// `Message` once finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub kind: TranscriptKind,
    pub text: String,
    pub words: Option<Vec<WordTimestamp>>,
    pub message_id: Option<Uuid>,
}
