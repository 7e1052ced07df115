//! Application State
//!
//! Shared state across all HTTP and WebSocket handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use qorch_config::Settings;
use qorch_core::{SttClient, TtsClient};
use qorch_orchestrator::Orchestrator;
use qorch_tools::ToolRegistry;
use qorch_voice::{BargeInConfig, TurnDetectionConfig};
use std::sync::Arc;

use crate::confirmation::ConfirmationRouter;
use crate::rate_limit::InboundRateLimiter;
use crate::session::SessionManager;

/// Shared state across all handlers. Collaborators are assembled once in
/// `main.rs` and handed to the router; nothing here is reconstructed per
/// request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub orchestrator: Arc<Orchestrator>,
    pub tools: Arc<ToolRegistry>,
    pub sessions: Arc<SessionManager>,
    pub confirmation_router: Arc<ConfirmationRouter>,
    pub rate_limiter: Arc<InboundRateLimiter>,
    pub stt: Arc<dyn SttClient>,
    pub tts: Arc<dyn TtsClient>,
    pub turn_config: TurnDetectionConfig,
    pub barge_in_config: BargeInConfig,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Settings,
        orchestrator: Arc<Orchestrator>,
        tools: Arc<ToolRegistry>,
        confirmation_router: Arc<ConfirmationRouter>,
        rate_limiter: Arc<InboundRateLimiter>,
        stt: Arc<dyn SttClient>,
        tts: Arc<dyn TtsClient>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let turn_config = TurnDetectionConfig::default();
        let barge_in_config = BargeInConfig { enabled: config.voice.barge_in_enabled, ..BargeInConfig::default() };
        let max_sessions = 10_000;
        let idle_timeout = std::time::Duration::from_secs(30 * 60);
        Self {
            config: Arc::new(RwLock::new(config)),
            orchestrator,
            tools,
            sessions: Arc::new(SessionManager::new(max_sessions, idle_timeout)),
            confirmation_router,
            rate_limiter,
            stt,
            tts,
            turn_config,
            barge_in_config,
            metrics_handle,
        }
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
