//! Intent Classifier (C2): rule-based default implementation plus the
//! pluggable wrapper (§4.2). A learned backend is tried first; the rules
//! are the fallback used when it is unavailable or errors, not a
//! conservative verdict — an intent is always produced.

use async_trait::async_trait;
use qorch_core::{ConversationContext, Intent, IntentClassifier, IntentTag, Result};
use std::sync::Arc;

struct KeywordSet {
    tag: IntentTag,
    phrases: &'static [&'static str],
}

const KEYWORD_SETS: &[KeywordSet] = &[
    KeywordSet {
        tag: IntentTag::Diagnosis,
        phrases: &[
            "differential diagnosis",
            "rule out",
            "workup for",
            "what could cause",
            "diagnose",
            "diagnosis of",
        ],
    },
    KeywordSet {
        tag: IntentTag::DrugInfo,
        phrases: &[
            "dosage",
            "dose of",
            "drug interaction",
            "contraindication",
            "side effect",
            "mg/kg",
        ],
    },
    KeywordSet {
        tag: IntentTag::Guideline,
        phrases: &["guideline", "recommendation for", "protocol for", "per nice", "per acc/aha"],
    },
    KeywordSet {
        tag: IntentTag::Treatment,
        phrases: &["treatment for", "first-line", "how to manage", "therapy for", "treatment regimen"],
    },
    KeywordSet {
        tag: IntentTag::CaseConsultation,
        phrases: &["my patient", "this patient", "a patient of mine", "case consult"],
    },
];

/// Rule-based keyword matcher: the default intent classifier and the
/// fallback behind any configured learned backend.
pub struct RuleBasedIntentClassifier;

#[async_trait]
impl IntentClassifier for RuleBasedIntentClassifier {
    async fn classify(&self, text: &str, _context: &ConversationContext) -> Result<Intent> {
        let lowered = text.to_lowercase();
        let mut best: Option<(IntentTag, usize)> = None;
        for set in KEYWORD_SETS {
            let matches = set.phrases.iter().filter(|p| lowered.contains(*p)).count();
            if matches == 0 {
                continue;
            }
            match best {
                Some((_, count)) if count >= matches => {}
                _ => best = Some((set.tag, matches)),
            }
        }
        let intent = match best {
            Some((tag, 1)) => Intent::new(tag, 0.7),
            Some((tag, _)) => Intent::new(tag, 0.85),
            None => Intent::new(IntentTag::General, 0.6),
        };
        Ok(intent)
    }
}

/// Tries a configured learned classifier first, falling back to the
/// rule-based matcher when it is unavailable (§4.2).
pub struct IntentClassifierPipeline {
    learned: Option<Arc<dyn IntentClassifier>>,
    rules: RuleBasedIntentClassifier,
}

impl IntentClassifierPipeline {
    pub fn new(learned: Option<Arc<dyn IntentClassifier>>) -> Self {
        Self { learned, rules: RuleBasedIntentClassifier }
    }
}

#[async_trait]
impl IntentClassifier for IntentClassifierPipeline {
    async fn classify(&self, text: &str, context: &ConversationContext) -> Result<Intent> {
        if let Some(learned) = &self.learned {
            if let Ok(intent) = learned.classify(text, context).await {
                return Ok(intent);
            }
            tracing::warn!("learned intent classifier unavailable, falling back to rules");
        }
        self.rules.classify(text, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn context() -> ConversationContext {
        ConversationContext::new(Uuid::new_v4(), 10)
    }

    #[tokio::test]
    async fn recognizes_drug_info_intent() {
        let intent = RuleBasedIntentClassifier
            .classify("what is the correct dosage of metformin", &context())
            .await
            .unwrap();
        assert_eq!(intent.tag, IntentTag::DrugInfo);
    }

    #[tokio::test]
    async fn unmatched_query_falls_back_to_general() {
        let intent = RuleBasedIntentClassifier
            .classify("tell me something interesting", &context())
            .await
            .unwrap();
        assert_eq!(intent.tag, IntentTag::General);
        assert!(!intent.is_ambiguous());
    }

    struct FailingClassifier;

    #[async_trait]
    impl IntentClassifier for FailingClassifier {
        async fn classify(&self, _text: &str, _context: &ConversationContext) -> Result<Intent> {
            Err(qorch_core::Error::ClassifierUnavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn unavailable_learned_backend_falls_back_to_rules() {
        let pipeline = IntentClassifierPipeline::new(Some(Arc::new(FailingClassifier)));
        let intent = pipeline.classify("what is the dosage of lisinopril", &context()).await.unwrap();
        assert_eq!(intent.tag, IntentTag::DrugInfo);
    }
}
