//! Routes `ConfirmationChannel::request` calls made deep inside
//! `Orchestrator::process_query` back to the WebSocket connection that
//! issued the originating query.
//!
//! `ConfirmationChannel::request` only carries a `call_id` and payload, no
//! connection identity, so the session a given call belongs to is carried
//! via a task-local set once per `process_query` future and read back out
//! when the tool executor awaits confirmation on that same task.

use async_trait::async_trait;
use dashmap::DashMap;
use qorch_core::{ConfirmationChannel, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::websocket::ServerEvent;

tokio::task_local! {
    pub static CURRENT_SESSION: Uuid;
}

type OutboundSender = tokio::sync::mpsc::UnboundedSender<ServerEvent>;

/// Shared per-connection state the confirmation channel needs: where to
/// send the `tool.call_request` event, and where to deliver the answer
/// once a matching `tool.confirmation` arrives.
#[derive(Default)]
pub struct ConfirmationRouter {
    senders: DashMap<Uuid, OutboundSender>,
    pending: DashMap<Uuid, oneshot::Sender<bool>>,
}

impl ConfirmationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_connection(&self, session_id: Uuid, sender: OutboundSender) {
        self.senders.insert(session_id, sender);
    }

    pub fn unregister_connection(&self, session_id: Uuid) {
        self.senders.remove(&session_id);
    }

    /// Called from the connection's read loop when a `tool.confirmation`
    /// message arrives; resolves the matching pending request, if any.
    pub fn resolve(&self, call_id: Uuid, approved: bool) {
        if let Some((_, tx)) = self.pending.remove(&call_id) {
            let _ = tx.send(approved);
        }
    }
}

pub struct WsConfirmationChannel {
    router: Arc<ConfirmationRouter>,
}

impl WsConfirmationChannel {
    pub fn new(router: Arc<ConfirmationRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl ConfirmationChannel for WsConfirmationChannel {
    async fn request(&self, call_id: Uuid, payload: Value) -> Result<bool> {
        let session_id = CURRENT_SESSION.with(|id| *id);
        let sender = self
            .router
            .senders
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| qorch_core::Error::Internal("no connection for session".to_string()))?;

        let name = payload.get("tool").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let arguments = payload.get("arguments").cloned().unwrap_or(Value::Null);

        let (tx, rx) = oneshot::channel();
        self.router.pending.insert(call_id, tx);

        let event = ServerEvent::ToolCallRequest { call_id, name, arguments };
        if sender.send(event).is_err() {
            self.router.pending.remove(&call_id);
            return Err(qorch_core::Error::Internal("connection closed".to_string()));
        }

        // The executor's own 60s timeout bounds how long this may take; if
        // the connection drops, `rx` resolves to `Err` and we deny rather
        // than hang.
        match rx.await {
            Ok(approved) => Ok(approved),
            Err(_) => Ok(false),
        }
    }
}
