use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("circuit open for dependency: {0}")]
    CircuitOpen(String),

    #[error("rate limit exceeded for {0}, retry after {1}s")]
    RateLimited(String, u64),
}
