//! Response Assembler (C8): folds a generated answer and the ranked
//! results it cited into the final `QueryResponse` (§4.8). Citation markers
//! in the answer text (`[1]`, `[2]`, ...) are aligned 1:1 to the numbered
//! context the prompt builder handed the model, so every marker that
//! survives into `citations` refers to exactly one entry and vice versa.

use once_cell::sync::Lazy;
use qorch_core::{Citation, GeneratedAnswer, QueryResponse, RankedResult, ResponseMetadata, SourceDescriptor, SourceKind};
use regex::Regex;
use uuid::Uuid;

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Assembles the final response. Markers outside `1..=ranked_results.len()`
/// are stripped from the answer text rather than left dangling, since a
/// dangling marker with no matching citation would violate the bijection
/// between inline markers and `citations` (§8).
pub fn assemble(
    answer: &GeneratedAnswer,
    ranked_results: &[RankedResult],
    sources: &[SourceDescriptor],
    metadata: ResponseMetadata,
) -> QueryResponse {
    let mut citations = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let cleaned = MARKER.replace_all(&answer.text, |caps: &regex::Captures| {
        let marker: usize = caps[1].parse().unwrap_or(0);
        if marker == 0 || marker > ranked_results.len() {
            return String::new();
        }
        if seen.insert(marker) {
            let ranked = &ranked_results[marker - 1];
            citations.push(Citation {
                id: marker as u32,
                source_kind: source_kind_of(ranked, sources),
                title: ranked.result.title.clone(),
                url: ranked.result.url.clone(),
                evidence_grade: ranked.result.evidence_grade.clone(),
            });
        }
        format!("[{marker}]")
    });

    citations.sort_by_key(|c| c.id);

    QueryResponse {
        message_id: Uuid::new_v4(),
        answer: cleaned.into_owned(),
        citations,
        metadata,
    }
}

fn source_kind_of(ranked: &RankedResult, sources: &[SourceDescriptor]) -> SourceKind {
    sources
        .iter()
        .find(|d| d.name == ranked.result.source)
        .map(|d| d.kind)
        .unwrap_or(SourceKind::InternalKb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_core::{FinishReason, IntentTag, SearchResult};

    fn ranked(content: &str, title: &str) -> RankedResult {
        RankedResult {
            result: SearchResult {
                source: "kb".to_string(),
                content: content.to_string(),
                relevance: 0.9,
                title: Some(title.to_string()),
                url: None,
                evidence_grade: None,
                external_id: None,
            },
            score: 0.9,
            fetch_order: 0,
        }
    }

    fn sources() -> Vec<SourceDescriptor> {
        vec![SourceDescriptor {
            name: "kb".to_string(),
            kind: SourceKind::InternalKb,
            capabilities: vec![],
            sla_ms: 1000,
        }]
    }

    fn metadata() -> ResponseMetadata {
        ResponseMetadata {
            model_id: "local".to_string(),
            phi_detected: false,
            intent: IntentTag::General,
            sources_queried: vec![],
            prompt_tokens: 10,
            completion_tokens: 5,
            cost_usd: 0.0,
            trace_id: Uuid::new_v4(),
            tool_call_ids: vec![],
            degraded: false,
        }
    }

    #[test]
    fn every_marker_has_exactly_one_citation_and_vice_versa() {
        let answer = GeneratedAnswer {
            text: "Start with metformin [1]. Monitor renal function [2].".to_string(),
            model_id: "local".to_string(),
            prompt_tokens: 10,
            completion_tokens: 5,
            cost_usd: 0.0,
            finish_reason: FinishReason::Stop,
        };
        let ranked = vec![ranked("metformin first line", "Guideline A"), ranked("renal monitoring", "Guideline B")];
        let response = assemble(&answer, &ranked, &sources(), metadata());
        assert_eq!(response.citations.len(), 2);
        assert_eq!(response.citations[0].id, 1);
        assert_eq!(response.citations[1].id, 2);
        assert!(response.answer.contains("[1]"));
        assert!(response.answer.contains("[2]"));
    }

    #[test]
    fn out_of_range_marker_is_stripped_not_left_dangling() {
        let answer = GeneratedAnswer {
            text: "See reference [5] for details.".to_string(),
            model_id: "local".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
            cost_usd: 0.0,
            finish_reason: FinishReason::Stop,
        };
        let ranked = vec![ranked("only one result", "Guideline A")];
        let response = assemble(&answer, &ranked, &sources(), metadata());
        assert!(response.citations.is_empty());
        assert!(!response.answer.contains('['));
    }

    #[test]
    fn repeated_marker_yields_one_citation() {
        let answer = GeneratedAnswer {
            text: "Per [1], do X. Also per [1], do Y.".to_string(),
            model_id: "local".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
            cost_usd: 0.0,
            finish_reason: FinishReason::Stop,
        };
        let ranked = vec![ranked("guideline text", "Guideline A")];
        let response = assemble(&answer, &ranked, &sources(), metadata());
        assert_eq!(response.citations.len(), 1);
    }
}
