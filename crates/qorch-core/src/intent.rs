//! Intent classification result (C2).

use serde::{Deserialize, Serialize};

/// Closed enumeration of query intents recognized by the Intent Classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    Diagnosis,
    Treatment,
    DrugInfo,
    Guideline,
    CaseConsultation,
    General,
}

/// Confidence-tagged intent produced by `IntentClassifier::classify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub tag: IntentTag,
    pub confidence: f32,
}

impl Intent {
    pub const AMBIGUOUS_THRESHOLD: f32 = 0.5;

    pub fn new(tag: IntentTag, confidence: f32) -> Self {
        Self {
            tag,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Whether the clarification gate (§4.3) should treat this query as
    /// ambiguous on confidence grounds alone.
    pub fn is_ambiguous(&self) -> bool {
        self.confidence < Self::AMBIGUOUS_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_confidence_049_is_ambiguous_050_is_not() {
        assert!(Intent::new(IntentTag::General, 0.49).is_ambiguous());
        assert!(!Intent::new(IntentTag::General, 0.50).is_ambiguous());
    }
}
