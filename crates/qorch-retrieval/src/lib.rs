//! Source selection, fan-out search, and reranking.
//!
//! C3 (Source Selector) → C4 (Search Fan-out) → C5 (Reranker/Filter).

pub mod error;
pub mod fanout;
pub mod reranker;
pub mod selector;

pub use error::RetrievalError;
pub use fanout::{search_all, FanoutResults};
pub use reranker::{rerank, RerankConfig};
pub use selector::{clarification_gate, select, ClarificationResponse};
