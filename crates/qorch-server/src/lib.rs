//! Query Orchestrator transport.
//!
//! Exposes the orchestrator (C1-C13) and voice pipeline (C14) over HTTP and
//! WebSocket, per SPEC_FULL.md §6 and §10.

pub mod collaborators;
pub mod confirmation;
pub mod http;
pub mod metrics;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use rate_limit::InboundRateLimiter;
pub use session::{Session, SessionManager};
pub use state::AppState;
pub use websocket::ws_handler;

use thiserror::Error;

/// Transport-level errors, distinct from `qorch_orchestrator::OrchestratorError`
/// (those carry a user-visible `code`; these are local to request handling).
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session not found: {0}")]
    Session(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::RateLimit => axum::http::StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<qorch_orchestrator::OrchestratorError> for ServerError {
    fn from(err: qorch_orchestrator::OrchestratorError) -> Self {
        ServerError::Internal(err.to_string())
    }
}
