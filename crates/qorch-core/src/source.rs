//! Source selection (C3) and retrieval (C4/C5) data types.

use serde::{Deserialize, Serialize};

/// Capability a source can be queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCapability {
    Semantic,
    Keyword,
    Hybrid,
}

/// Kind of knowledge source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    InternalKb,
    Literature,
    Guidelines,
    Notes,
}

/// Static description of a source, as returned by the Source Selector (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub kind: SourceKind,
    pub capabilities: Vec<SourceCapability>,
    /// Per-source SLA in milliseconds; defaults to the global per-source
    /// search deadline when unset.
    pub sla_ms: u64,
}

/// One hit returned by a single source during fan-out (C4). Ephemeral per
/// request; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub source: String,
    pub content: String,
    pub relevance: f32,
    pub title: Option<String>,
    pub url: Option<String>,
    pub evidence_grade: Option<String>,
    pub external_id: Option<String>,
}

/// Outcome of querying a single source, used to populate response metadata
/// even when a source fails or is skipped (§8 boundary behaviors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Ok,
    Timeout,
    Error,
    CircuitOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceQueryOutcome {
    pub name: String,
    pub outcome: SourceOutcome,
    pub result_count: usize,
}

/// A `SearchResult` after reranking (C5): carries the post-rerank score and
/// has already been deduplicated against higher-scoring peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub result: SearchResult,
    pub score: f32,
    /// Position in the original fan-out concatenation; used as the final
    /// tie-break after source priority.
    pub fetch_order: usize,
}

/// A citation attached to an assembled response (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: u32,
    pub source_kind: SourceKind,
    pub title: Option<String>,
    pub url: Option<String>,
    pub evidence_grade: Option<String>,
}
