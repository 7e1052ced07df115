//! Voice Pipeline Orchestrator (C14) state machine: idle -> listening ->
//! processing -> {tool_calling -> generating | generating} -> speaking ->
//! {idle | cancelled -> listening} (§4.14).

use crate::barge_in::{BargeInConfig, BargeInDetector, BargeInEvent};
use crate::sentence_chunker::SentenceChunker;
use crate::turn_detection::{TurnDetectionConfig, TurnDetector, TurnEvent};
use futures::{stream, Stream, StreamExt};
use parking_lot::Mutex;
use qorch_core::{PipelineState, Result, Transcript, TtsClient, VoiceSession};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged(PipelineState),
    Transcript(Transcript),
    ResponseChunk { text: String, is_final: bool },
    Audio(qorch_core::AudioChunk),
    BargeIn { at_offset_ms: u64 },
    Error(String),
}

/// Drives one voice session through its state machine. Audio ingestion and
/// STT/LLM orchestration are handled by the caller (the top-level
/// orchestrator); this type owns turn detection, barge-in, sentence
/// chunking, and the state transitions and cancellation semantics those
/// imply.
pub struct VoicePipeline {
    session: Mutex<VoiceSession>,
    turn_detector: Mutex<TurnDetector>,
    barge_in: Mutex<BargeInDetector>,
    chunker: Mutex<SentenceChunker>,
    tts: Arc<dyn TtsClient>,
    events: broadcast::Sender<PipelineEvent>,
    cancelled: AtomicBool,
    egress_seq: AtomicU64,
}

impl VoicePipeline {
    pub fn new(
        session: VoiceSession,
        tts: Arc<dyn TtsClient>,
        turn_config: TurnDetectionConfig,
        barge_in_config: BargeInConfig,
    ) -> (Self, broadcast::Receiver<PipelineEvent>) {
        let (events, rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pipeline = Self {
            session: Mutex::new(session),
            turn_detector: Mutex::new(TurnDetector::new(turn_config)),
            barge_in: Mutex::new(BargeInDetector::new(barge_in_config)),
            chunker: Mutex::new(SentenceChunker::new()),
            tts,
            events,
            cancelled: AtomicBool::new(false),
            egress_seq: AtomicU64::new(0),
        };
        (pipeline, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.session.lock().state
    }

    fn set_state(&self, state: PipelineState) {
        self.session.lock().state = state;
        let _ = self.events.send(PipelineEvent::StateChanged(state));
    }

    /// Feeds one VAD frame observed while idle or listening for the user's
    /// turn. Transitions to `processing` once the turn is finalized.
    pub fn on_listening_frame(&self, is_speech: bool, frame_duration: Duration) -> TurnEvent {
        let event = self.turn_detector.lock().on_frame(is_speech, frame_duration);
        match event {
            TurnEvent::SpeechStart if self.state() == PipelineState::Idle => {
                self.set_state(PipelineState::Listening);
            }
            TurnEvent::Finalized => {
                self.set_state(PipelineState::Processing);
            }
            _ => {}
        }
        event
    }

    pub fn emit_transcript(&self, transcript: Transcript) {
        let _ = self.events.send(PipelineEvent::Transcript(transcript));
    }

    pub fn begin_tool_calling(&self) {
        self.set_state(PipelineState::ToolCalling);
    }

    pub fn begin_generating(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.set_state(PipelineState::Generating);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Buffers one generated token, returning any chunk(s) now ready for
    /// TTS (sentence/clause boundary reached, or the forced-flush length).
    pub fn push_generated_token(&self, token: &str) -> Vec<String> {
        self.chunker.lock().push(token)
    }

    pub fn flush_generated(&self) -> Option<String> {
        self.chunker.lock().finish()
    }

    pub fn emit_response_chunk(&self, text: String, is_final: bool) {
        let _ = self.events.send(PipelineEvent::ResponseChunk { text, is_final });
    }

    /// Synthesizes one chunk of text and emits its audio as sequenced
    /// egress chunks. Stops early, without error, if cancelled mid-stream.
    pub async fn speak_chunk(&self, text: String) -> Result<()> {
        if self.state() != PipelineState::Speaking {
            self.set_state(PipelineState::Speaking);
        }
        let text_stream: Pin<Box<dyn Stream<Item = String> + Send>> =
            Box::pin(stream::once(async move { text }));
        let mut audio_stream = self.tts.synthesize_stream(text_stream);
        while let Some(item) = audio_stream.next().await {
            if self.is_cancelled() {
                break;
            }
            let mut chunk = item?;
            chunk.sequence = self.egress_seq.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(PipelineEvent::Audio(chunk));
        }
        Ok(())
    }

    /// Feeds one VAD frame observed while speaking, at the given playback
    /// offset in milliseconds. Returns the recorded offset if this frame
    /// confirmed a barge-in.
    pub fn on_speaking_frame(
        &self,
        is_speech: bool,
        energy_db: f32,
        frame_duration: Duration,
        playback_offset_ms: u64,
    ) -> Option<u64> {
        if self.state() != PipelineState::Speaking {
            return None;
        }
        let event = self.barge_in.lock().on_frame(is_speech, energy_db, frame_duration);
        if event == BargeInEvent::Triggered {
            self.cancel(playback_offset_ms);
            Some(playback_offset_ms)
        } else {
            None
        }
    }

    /// Cancels in-flight generation and TTS atomically, records the
    /// playback offset the interruption happened at, and returns to
    /// `listening` (§4.14: cancellation must hit STT, generation, and TTS
    /// together; any tool call tied to the cancelled response is marked
    /// cancelled by the caller, not here, since C9 owns that state).
    pub fn cancel(&self, playback_offset_ms: u64) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.session.lock().last_barge_in_offset_ms = Some(playback_offset_ms);
        self.set_state(PipelineState::Cancelled);
        let _ = self.events.send(PipelineEvent::BargeIn { at_offset_ms: playback_offset_ms });
        self.turn_detector.lock().reset();
        self.barge_in.lock().reset();
        self.chunker.lock().finish();
        self.set_state(PipelineState::Listening);
    }

    pub fn finish_turn(&self) {
        self.turn_detector.lock().reset();
        self.barge_in.lock().reset();
        self.set_state(PipelineState::Idle);
    }

    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.events.send(PipelineEvent::Error(message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qorch_core::{AudioChunk, AudioDirection};
    use uuid::Uuid;

    struct SilentTts;

    #[async_trait]
    impl TtsClient for SilentTts {
        fn synthesize_stream<'a>(
            &'a self,
            mut text: Pin<Box<dyn Stream<Item = String> + Send + 'a>>,
        ) -> Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send + 'a>> {
            Box::pin(async_stream::try_stream! {
                while let Some(t) = text.next().await {
                    yield AudioChunk {
                        sequence: 0,
                        pcm16: t.into_bytes(),
                        direction: AudioDirection::Egress,
                        timestamp: chrono::Utc::now(),
                    };
                }
            })
        }
    }

    fn new_pipeline() -> (VoicePipeline, broadcast::Receiver<PipelineEvent>) {
        let session = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "default", "en-US");
        VoicePipeline::new(
            session,
            Arc::new(SilentTts),
            TurnDetectionConfig::default(),
            BargeInConfig::default(),
        )
    }

    #[test]
    fn finalized_turn_moves_to_processing() {
        let (pipeline, _rx) = new_pipeline();
        pipeline.on_listening_frame(true, Duration::from_millis(20));
        let mut finalized = false;
        for _ in 0..30 {
            if pipeline.on_listening_frame(false, Duration::from_millis(20)) == TurnEvent::Finalized {
                finalized = true;
                break;
            }
        }
        assert!(finalized);
        assert_eq!(pipeline.state(), PipelineState::Processing);
    }

    #[tokio::test]
    async fn barge_in_during_speaking_cancels_and_returns_to_listening() {
        let (pipeline, mut rx) = new_pipeline();
        pipeline.begin_generating();
        pipeline.speak_chunk("hello world".to_string()).await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Speaking);

        let mut triggered_offset = None;
        for _ in 0..20 {
            if let Some(offset) = pipeline.on_speaking_frame(true, -10.0, Duration::from_millis(20), 1200) {
                triggered_offset = Some(offset);
                break;
            }
        }
        assert_eq!(triggered_offset, Some(1200));
        assert_eq!(pipeline.state(), PipelineState::Listening);
        assert!(pipeline.is_cancelled());

        let mut saw_barge_in = false;
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::BargeIn { at_offset_ms } = event {
                assert_eq!(at_offset_ms, 1200);
                saw_barge_in = true;
            }
        }
        assert!(saw_barge_in);
    }

    #[test]
    fn generated_tokens_flush_as_sentence_boundaries_are_crossed() {
        let (pipeline, _rx) = new_pipeline();
        let ready = pipeline.push_generated_token("First sentence. Second");
        assert_eq!(ready, vec!["First sentence.".to_string()]);
        assert_eq!(pipeline.flush_generated(), Some("Second".to_string()));
    }
}
