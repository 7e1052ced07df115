//! Reranker/Filter (C5).

use qorch_core::{RankedResult, RerankerService, SearchResult};
use std::collections::HashSet;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone)]
pub struct RerankConfig {
    pub min_score: f32,
    pub dedup_similarity: f32,
    pub top_k: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            dedup_similarity: 0.9,
            top_k: 10,
        }
    }
}

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .unicode_words()
        .map(|w| w.to_string())
        .collect()
}

/// Jaccard similarity over lowercased word tokens — the fallback dedup
/// metric used when no embedding service is configured (DESIGN.md Open
/// Question 4).
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn keyword_overlap_score(query: &str, content: &str) -> f32 {
    let q = token_set(query);
    let c = token_set(content);
    if q.is_empty() {
        return 0.0;
    }
    q.intersection(&c).count() as f32 / q.len() as f32
}

/// Scores, deduplicates, filters, sorts, and truncates fan-out results
/// (§4.5). `reranker` is consulted when present; otherwise a keyword-overlap
/// fallback score is used.
pub async fn rerank(
    query: &str,
    results: Vec<SearchResult>,
    reranker: Option<&Arc<dyn RerankerService>>,
    config: &RerankConfig,
) -> Vec<RankedResult> {
    let docs: Vec<String> = results.iter().map(|r| r.content.clone()).collect();

    let scores: Vec<f32> = match reranker {
        Some(svc) => match svc.score(query, &docs).await {
            Ok(scores) if scores.len() == docs.len() => scores,
            _ => docs.iter().map(|d| keyword_overlap_score(query, d)).collect(),
        },
        None => docs.iter().map(|d| keyword_overlap_score(query, d)).collect(),
    };

    let mut ranked: Vec<RankedResult> = results
        .into_iter()
        .zip(scores)
        .enumerate()
        .map(|(fetch_order, (result, score))| RankedResult {
            result,
            score,
            fetch_order,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<RankedResult> = Vec::new();
    let mut kept_tokens: Vec<HashSet<String>> = Vec::new();
    for candidate in ranked {
        let tokens = token_set(&candidate.result.content);
        let is_dup = kept_tokens
            .iter()
            .any(|existing| jaccard(existing, &tokens) >= config.dedup_similarity);
        if is_dup {
            continue;
        }
        kept_tokens.push(tokens);
        kept.push(candidate);
    }

    kept.retain(|r| r.score >= config.min_score);

    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.fetch_order.cmp(&b.fetch_order))
    });

    kept.truncate(config.top_k);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(content: &str, relevance: f32) -> SearchResult {
        SearchResult {
            source: "kb".to_string(),
            content: content.to_string(),
            relevance,
            title: None,
            url: None,
            evidence_grade: None,
            external_id: None,
        }
    }

    #[tokio::test]
    async fn filters_below_min_score() {
        let out = rerank(
            "diabetes treatment",
            vec![result("unrelated content about cars", 0.1)],
            None,
            &RerankConfig::default(),
        )
        .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn near_duplicate_results_are_deduplicated() {
        let results = vec![
            result("first line treatment for hypertension is lifestyle change", 0.9),
            result("first line treatment for hypertension is lifestyle change", 0.9),
        ];
        let out = rerank("hypertension treatment", results, None, &RerankConfig::default()).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let results: Vec<SearchResult> = (0..20)
            .map(|i| result(&format!("distinct treatment protocol number {i}"), 0.8))
            .collect();
        let config = RerankConfig { top_k: 5, min_score: 0.0, ..Default::default() };
        let out = rerank("treatment protocol", results, None, &config).await;
        assert_eq!(out.len(), 5);
    }
}
