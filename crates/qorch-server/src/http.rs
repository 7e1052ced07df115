//! HTTP Endpoints
//!
//! REST API surrounding the WebSocket transport: health/readiness probes,
//! Prometheus scraping, session introspection, tool listing, and a
//! non-streaming chat endpoint for clients that don't need the WebSocket.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::session::Session;
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Creates the application router. Session affinity for the WebSocket route
/// lives entirely in `AppState`, so `Router::with_state` is the only place
/// collaborators are threaded through.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id", axum::routing::delete(delete_session))
        .route("/api/chat/:session_id", post(chat))
        .route("/api/tools", get(list_tools))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
}

async fn create_session(State(state): State<Arc<AppState>>) -> Result<Json<CreateSessionResponse>, StatusCode> {
    let session_id = Uuid::new_v4();
    let session = Arc::new(Session::new(session_id, format!("anon-{session_id}"), None));
    state.sessions.insert(session).map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(CreateSessionResponse { session_id }))
}

async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>, StatusCode> {
    let session = state.sessions.get(id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "user_id": session.user_id,
        "voice_enabled": session.voice.is_some(),
    })))
}

async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> StatusCode {
    state.sessions.remove(id);
    StatusCode::NO_CONTENT
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "count": state.sessions.count() }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    user_id: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    message_id: Uuid,
    text: String,
    degraded: bool,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, StatusCode> {
    let session = state.sessions.get(session_id).ok_or(StatusCode::NOT_FOUND)?;
    session.touch();

    let trace_id = Uuid::new_v4();
    let response = state
        .orchestrator
        .process_query(session_id, &request.user_id, trace_id, &request.message)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "chat request failed");
            crate::metrics::record_error("chat", err.code());
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ChatResponse {
        message_id: response.message_id,
        text: response.answer.text,
        degraded: response.metadata.degraded,
    }))
}

async fn list_tools(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tools: Vec<_> = state
        .tools
        .list()
        .into_iter()
        .map(|t| serde_json::json!({ "name": t.name, "description": t.description, "risk_level": t.risk_level }))
        .collect();
    Json(serde_json::json!({ "tools": tools }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let session_count = state.sessions.count();
    (StatusCode::OK, Json(serde_json::json!({ "status": "ready", "sessions": session_count })))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics_handle.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools_listing_shape() -> serde_json::Value {
        serde_json::json!({ "tools": [] })
    }

    #[test]
    fn tools_listing_serializes_as_an_object_with_a_tools_array() {
        let value = tools_listing_shape();
        assert!(value["tools"].is_array());
    }
}
