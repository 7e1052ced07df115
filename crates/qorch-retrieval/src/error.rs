use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("clarification required: {0}")]
    ClarificationRequired(String),

    #[error("all selected sources unavailable")]
    AllSourcesUnavailable,
}
