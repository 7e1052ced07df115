//! Barge-in detection: lets the caller interrupt playback mid-response
//! (§4.14). Grounded on the teacher's VAD-energy accumulation threshold
//! pattern for detecting a genuine interruption rather than background noise.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BargeInConfig {
    pub enabled: bool,
    /// Accumulated speech duration, while in `speaking`, required before a
    /// barge-in is confirmed.
    pub min_speech: Duration,
    pub min_energy_db: f32,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self { enabled: true, min_speech: Duration::from_millis(150), min_energy_db: -40.0 }
    }
}

/// Outcome of feeding one audio frame to the detector while the pipeline is
/// speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BargeInEvent {
    None,
    Triggered,
}

/// Accumulates speech-like frames observed during playback. Reset whenever
/// the pipeline leaves the `speaking` state.
pub struct BargeInDetector {
    config: BargeInConfig,
    accumulated: Duration,
}

impl BargeInDetector {
    pub fn new(config: BargeInConfig) -> Self {
        Self { config, accumulated: Duration::ZERO }
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
    }

    /// Feeds one frame's VAD decision and energy level; `frame_duration` is
    /// the audio duration that frame covers.
    pub fn on_frame(&mut self, is_speech: bool, energy_db: f32, frame_duration: Duration) -> BargeInEvent {
        if !self.config.enabled {
            return BargeInEvent::None;
        }
        if !is_speech || energy_db < self.config.min_energy_db {
            self.accumulated = Duration::ZERO;
            return BargeInEvent::None;
        }

        self.accumulated += frame_duration;
        if self.accumulated >= self.config.min_speech {
            self.accumulated = Duration::ZERO;
            return BargeInEvent::Triggered;
        }
        BargeInEvent::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_speech_below_energy_floor_never_triggers() {
        let mut detector = BargeInDetector::new(BargeInConfig::default());
        for _ in 0..50 {
            let event = detector.on_frame(true, -60.0, Duration::from_millis(20));
            assert_eq!(event, BargeInEvent::None);
        }
    }

    #[test]
    fn sustained_loud_speech_triggers_once_min_speech_reached() {
        let mut detector = BargeInDetector::new(BargeInConfig::default());
        let mut triggered = false;
        for _ in 0..20 {
            if detector.on_frame(true, -20.0, Duration::from_millis(20)) == BargeInEvent::Triggered {
                triggered = true;
                break;
            }
        }
        assert!(triggered);
    }

    #[test]
    fn brief_noise_burst_resets_and_does_not_trigger() {
        let mut detector = BargeInDetector::new(BargeInConfig::default());
        detector.on_frame(true, -20.0, Duration::from_millis(20));
        detector.on_frame(true, -20.0, Duration::from_millis(20));
        assert_eq!(detector.on_frame(false, -20.0, Duration::from_millis(20)), BargeInEvent::None);
        // after the reset, a single further frame is not enough to trigger
        assert_eq!(detector.on_frame(true, -20.0, Duration::from_millis(20)), BargeInEvent::None);
    }
}
