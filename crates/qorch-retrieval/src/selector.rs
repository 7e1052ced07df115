//! Source Selector (C3).

use qorch_core::{Intent, IntentTag, SourceDescriptor, SourceKind, UserPreferences};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A clarification response returned instead of fanning out, when the
/// clarification gate trips (§4.3).
#[derive(Debug, Clone)]
pub struct ClarificationResponse {
    pub question: String,
}

static AMBIGUOUS_TERMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "kidney disease",
        &["acute", "chronic", "stage"][..],
    );
    m.insert("diabetes", &["type 1", "type 2", "gestational"][..]);
    m.insert("hepatitis", &["a", "b", "c", "acute", "chronic"][..]);
    m
});

fn policy(tag: IntentTag) -> &'static [SourceKind] {
    match tag {
        IntentTag::Diagnosis => &[SourceKind::InternalKb, SourceKind::Literature, SourceKind::Guidelines],
        IntentTag::Treatment => &[SourceKind::Guidelines, SourceKind::Literature, SourceKind::InternalKb],
        IntentTag::DrugInfo => &[SourceKind::InternalKb, SourceKind::Literature],
        IntentTag::Guideline => &[SourceKind::Guidelines, SourceKind::InternalKb],
        IntentTag::CaseConsultation => &[SourceKind::InternalKb, SourceKind::Literature, SourceKind::Notes],
        IntentTag::General => &[SourceKind::InternalKb, SourceKind::Literature],
    }
}

/// Checks the clarification gate (§4.3): confidence, token count, and
/// curated ambiguous-term-without-disambiguator rules. Returns `Some` with a
/// templated question when the query should not be fanned out.
pub fn clarification_gate(query: &str, intent: &Intent) -> Option<ClarificationResponse> {
    if intent.is_ambiguous() {
        return Some(ClarificationResponse {
            question: "Could you clarify what you're asking about?".to_string(),
        });
    }
    let token_count = query.split_whitespace().count();
    if token_count < 3 {
        return Some(ClarificationResponse {
            question: "Could you provide a bit more detail about your question?".to_string(),
        });
    }
    let lowered = query.to_lowercase();
    for (&term, disambiguators) in AMBIGUOUS_TERMS.iter() {
        if lowered.contains(term) && !disambiguators.iter().any(|d| lowered.contains(d)) {
            return Some(ClarificationResponse {
                question: format!(
                    "Could you specify which type or stage of {term} you mean?"
                ),
            });
        }
    }
    None
}

/// Selects a prioritized, capped list of sources for `intent`, honoring user
/// preferences to move a source to the front or exclude it entirely.
pub fn select(
    intent: &Intent,
    prefs: &UserPreferences,
    available: &[SourceDescriptor],
    max_parallel_sources: usize,
) -> Vec<SourceDescriptor> {
    let order = policy(intent.tag);
    let mut by_kind: HashMap<SourceKind, Vec<SourceDescriptor>> = HashMap::new();
    for source in available {
        if prefs.excluded_sources.contains(&source.name) {
            continue;
        }
        by_kind.entry(source.kind).or_default().push(source.clone());
    }

    let mut selected = Vec::new();
    for kind in order {
        if let Some(sources) = by_kind.remove(kind) {
            selected.extend(sources);
        }
    }

    // Preferences move a named source to the front of the already
    // kind-ordered list.
    selected.sort_by_key(|s| {
        prefs
            .preferred_sources
            .iter()
            .position(|p| p == &s.name)
            .unwrap_or(usize::MAX)
    });

    selected.truncate(max_parallel_sources);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_core::SourceCapability;

    fn source(name: &str, kind: SourceKind) -> SourceDescriptor {
        SourceDescriptor {
            name: name.to_string(),
            kind,
            capabilities: vec![SourceCapability::Hybrid],
            sla_ms: 5000,
        }
    }

    #[test]
    fn treatment_intent_orders_guidelines_before_literature() {
        let available = vec![
            source("lit1", SourceKind::Literature),
            source("guide1", SourceKind::Guidelines),
            source("kb1", SourceKind::InternalKb),
        ];
        let selected = select(
            &Intent::new(IntentTag::Treatment, 0.9),
            &UserPreferences::default(),
            &available,
            3,
        );
        assert_eq!(selected[0].name, "guide1");
        assert_eq!(selected[1].name, "lit1");
    }

    #[test]
    fn excluded_source_is_dropped() {
        let available = vec![source("kb1", SourceKind::InternalKb)];
        let prefs = UserPreferences {
            excluded_sources: vec!["kb1".to_string()],
            ..Default::default()
        };
        let selected = select(&Intent::new(IntentTag::General, 0.9), &prefs, &available, 3);
        assert!(selected.is_empty());
    }

    #[test]
    fn two_token_query_triggers_clarification() {
        let intent = Intent::new(IntentTag::General, 0.9);
        assert!(clarification_gate("gold price", &intent).is_some());
    }

    #[test]
    fn boundary_confidence_049_clarifies_050_proceeds() {
        assert!(clarification_gate(
            "what about this disease today",
            &Intent::new(IntentTag::General, 0.49)
        )
        .is_some());
        assert!(clarification_gate(
            "what about this disease today",
            &Intent::new(IntentTag::General, 0.50)
        )
        .is_none());
    }

    #[test]
    fn ambiguous_term_without_disambiguator_clarifies() {
        let intent = Intent::new(IntentTag::General, 0.9);
        assert!(clarification_gate("tell me about kidney disease please", &intent).is_some());
        assert!(clarification_gate("tell me about chronic kidney disease", &intent).is_none());
    }
}
