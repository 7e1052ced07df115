//! Voice Pipeline Orchestrator (C14): turn detection, barge-in, TTS sentence
//! chunking, and the idle/listening/processing/tool_calling/generating/
//! speaking/cancelled state machine (§4.14).

pub mod barge_in;
pub mod pipeline;
pub mod sentence_chunker;
pub mod turn_detection;

pub use barge_in::{BargeInConfig, BargeInDetector, BargeInEvent};
pub use pipeline::{PipelineEvent, VoicePipeline};
pub use sentence_chunker::SentenceChunker;
pub use turn_detection::{TurnDetectionConfig, TurnDetector, TurnEvent};
