//! Voice-activity based turn detection (§4.14).

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TurnDetectionConfig {
    /// Speech is endpointed (considered one continuous utterance) within
    /// this window of trailing silence.
    pub endpointing_window: Duration,
    /// Silence duration after which an endpointed utterance is finalized
    /// and handed to STT as `user_final`.
    pub finalization_silence: Duration,
    /// Leading padding kept before a detected speech start, so the first
    /// phoneme isn't clipped.
    pub pre_roll: Duration,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            endpointing_window: Duration::from_millis(800),
            finalization_silence: Duration::from_millis(500),
            pre_roll: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    SpeechStart,
    SpeechEnd,
    Finalized,
    None,
}

/// Tracks accumulated silence/speech against the configured thresholds.
/// Fed one VAD frame decision (`is_speech`) at a time, each covering
/// `frame duration`.
pub struct TurnDetector {
    config: TurnDetectionConfig,
    in_speech: bool,
    silence_accum: Duration,
}

impl TurnDetector {
    pub fn new(config: TurnDetectionConfig) -> Self {
        Self { config, in_speech: false, silence_accum: Duration::ZERO }
    }

    pub fn reset(&mut self) {
        self.in_speech = false;
        self.silence_accum = Duration::ZERO;
    }

    pub fn is_speaking(&self) -> bool {
        self.in_speech
    }

    pub fn on_frame(&mut self, is_speech: bool, frame_duration: Duration) -> TurnEvent {
        if is_speech {
            self.silence_accum = Duration::ZERO;
            if !self.in_speech {
                self.in_speech = true;
                return TurnEvent::SpeechStart;
            }
            return TurnEvent::None;
        }

        if !self.in_speech {
            return TurnEvent::None;
        }

        self.silence_accum += frame_duration;
        if self.silence_accum >= self.config.endpointing_window {
            self.in_speech = false;
            return TurnEvent::SpeechEnd;
        }
        if self.silence_accum >= self.config.finalization_silence {
            return TurnEvent::Finalized;
        }
        TurnEvent::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn speech_start_fires_once_per_utterance() {
        let mut detector = TurnDetector::new(TurnDetectionConfig::default());
        assert_eq!(detector.on_frame(true, frame(20)), TurnEvent::SpeechStart);
        assert_eq!(detector.on_frame(true, frame(20)), TurnEvent::None);
    }

    #[test]
    fn finalizes_after_500ms_silence_then_ends_after_800ms() {
        let mut detector = TurnDetector::new(TurnDetectionConfig::default());
        detector.on_frame(true, frame(20));
        let mut event = TurnEvent::None;
        for _ in 0..25 {
            event = detector.on_frame(false, frame(20));
            if event == TurnEvent::Finalized {
                break;
            }
        }
        assert_eq!(event, TurnEvent::Finalized);

        for _ in 0..15 {
            event = detector.on_frame(false, frame(20));
            if event == TurnEvent::SpeechEnd {
                break;
            }
        }
        assert_eq!(event, TurnEvent::SpeechEnd);
        assert!(!detector.is_speaking());
    }

    #[test]
    fn speech_resets_silence_accumulator() {
        let mut detector = TurnDetector::new(TurnDetectionConfig::default());
        detector.on_frame(true, frame(20));
        for _ in 0..10 {
            detector.on_frame(false, frame(20));
        }
        assert_eq!(detector.on_frame(true, frame(20)), TurnEvent::None);
        assert!(detector.is_speaking());
    }
}
