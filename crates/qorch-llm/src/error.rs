use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("no suitable model available under the current routing policy")]
    NoModelAvailable,

    #[error("cloud routing for a PHI-bearing query was denied by policy")]
    PhiRoutingDenied,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for qorch_core::Error {
    fn from(err: LlmError) -> Self {
        qorch_core::Error::Internal(err.to_string())
    }
}
