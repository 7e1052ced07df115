//! PHI Classifier (C1): rule-based default detector plus the pluggable
//! wrapper the orchestrator wires up (§4.1). A configured learned detector
//! is tried first; its unavailability (or any detection error) adopts the
//! conservative verdict rather than silently passing PHI-bearing text
//! through as clean.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use qorch_core::{PhiDetector, PhiEntityKind, PhiMode, PhiSpan, PhiVerdict, Result};
use regex::Regex;
use std::sync::Arc;

struct PatternRule {
    kind: PhiEntityKind,
    pattern: Regex,
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        PatternRule {
            kind: PhiEntityKind::MedicalRecordNumber,
            pattern: Regex::new(r"(?i)\bMRN[\s#:]*([0-9]{4,10})\b").unwrap(),
        },
        PatternRule {
            kind: PhiEntityKind::NationalId,
            pattern: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
        },
        PatternRule {
            kind: PhiEntityKind::PhoneNumber,
            pattern: Regex::new(r"\b(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b").unwrap(),
        },
        PatternRule {
            kind: PhiEntityKind::Date,
            pattern: Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").unwrap(),
        },
        PatternRule {
            kind: PhiEntityKind::Address,
            pattern: Regex::new(
                r"(?i)\b\d{1,5}\s+[A-Za-z0-9.'\s]{2,40}\s(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr)\b",
            )
            .unwrap(),
        },
        PatternRule {
            kind: PhiEntityKind::PersonName,
            pattern: Regex::new(r"(?i)\b(?:mr|mrs|ms|dr)\.?\s+[A-Z][a-z]+\b").unwrap(),
        },
    ]
});

/// Minimal rule-based detector: the default backend used when no learned
/// `PhiDetector` is configured, and the fallback rules use independently of
/// that backend's availability.
pub struct RuleBasedPhiDetector;

#[async_trait]
impl PhiDetector for RuleBasedPhiDetector {
    async fn detect(&self, text: &str) -> Result<PhiVerdict> {
        let mut spans = Vec::new();
        for rule in RULES.iter() {
            for m in rule.pattern.find_iter(text) {
                spans.push(PhiSpan {
                    kind: rule.kind,
                    start: m.start(),
                    end: m.end(),
                    surface: m.as_str().to_string(),
                });
            }
        }
        Ok(PhiVerdict::with_spans(spans))
    }
}

/// Entity kinds that `PhiMode::Lenient` still escalates to `has_phi`; dates
/// and phone numbers alone are common in non-clinical chatter and are
/// downgraded to recorded-but-not-flagged spans under lenient mode.
fn is_lenient_significant(kind: PhiEntityKind) -> bool {
    matches!(
        kind,
        PhiEntityKind::MedicalRecordNumber | PhiEntityKind::NationalId | PhiEntityKind::PersonName
    )
}

/// The pluggable detector the orchestrator wires in: a configured learned
/// backend tried first, the rule-based detector as a backend of last resort,
/// and the PHI mode's strict/lenient distinction applied to whichever
/// verdict comes back.
pub struct PhiClassifier {
    learned: Option<Arc<dyn PhiDetector>>,
    rules: RuleBasedPhiDetector,
    mode: PhiMode,
}

impl PhiClassifier {
    pub fn new(learned: Option<Arc<dyn PhiDetector>>, mode: PhiMode) -> Self {
        Self { learned, rules: RuleBasedPhiDetector, mode }
    }

    fn apply_mode(&self, mut verdict: PhiVerdict) -> PhiVerdict {
        if self.mode == PhiMode::Lenient {
            verdict.has_phi = verdict.spans.iter().any(|s| is_lenient_significant(s.kind));
        }
        verdict
    }
}

#[async_trait]
impl PhiDetector for PhiClassifier {
    async fn detect(&self, text: &str) -> Result<PhiVerdict> {
        if self.mode == PhiMode::Off {
            return Ok(PhiVerdict::clean());
        }
        let verdict = match &self.learned {
            Some(detector) => match detector.detect(text).await {
                Ok(verdict) => verdict,
                Err(_) => PhiVerdict::conservative(),
            },
            None => self.rules.detect(text).await?,
        };
        Ok(self.apply_mode(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detects_medical_record_number() {
        let verdict = RuleBasedPhiDetector.detect("MRN: 123456 shows elevated creatinine").await.unwrap();
        assert!(verdict.has_phi);
        assert_eq!(verdict.spans[0].kind, PhiEntityKind::MedicalRecordNumber);
    }

    #[tokio::test]
    async fn clean_text_has_no_phi() {
        let verdict = RuleBasedPhiDetector.detect("what is the first-line treatment for hypertension").await.unwrap();
        assert!(!verdict.has_phi);
    }

    #[tokio::test]
    async fn off_mode_never_flags_phi() {
        let classifier = PhiClassifier::new(None, PhiMode::Off);
        let verdict = classifier.detect("MRN: 123456").await.unwrap();
        assert!(!verdict.has_phi);
    }

    #[tokio::test]
    async fn lenient_mode_ignores_bare_phone_number() {
        let classifier = PhiClassifier::new(None, PhiMode::Lenient);
        let verdict = classifier.detect("call back at 555-123-4567").await.unwrap();
        assert!(!verdict.spans.is_empty());
        assert!(!verdict.has_phi);
    }

    #[tokio::test]
    async fn strict_mode_flags_bare_phone_number() {
        let classifier = PhiClassifier::new(None, PhiMode::Strict);
        let verdict = classifier.detect("call back at 555-123-4567").await.unwrap();
        assert!(verdict.has_phi);
    }

    struct FailingDetector;

    #[async_trait]
    impl PhiDetector for FailingDetector {
        async fn detect(&self, _text: &str) -> Result<PhiVerdict> {
            Err(qorch_core::Error::ClassifierUnavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn unavailable_learned_backend_falls_back_to_conservative() {
        let classifier = PhiClassifier::new(Some(Arc::new(FailingDetector)), PhiMode::Strict);
        let verdict = classifier.detect("anything at all").await.unwrap();
        assert!(verdict.has_phi);
    }
}
