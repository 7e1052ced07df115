//! Query Orchestrator Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use qorch_config::{load_settings, Settings};
use qorch_context::{AuditLogger, ContextStore, InMemoryCache, InMemoryConversationStore};
use qorch_core::{SourceCapability, SourceDescriptor, SourceKind};
use qorch_llm::{HttpLlmClient, HttpLlmConfig};
use qorch_orchestrator::{IntentClassifierPipeline, Orchestrator, PhiClassifier};
use qorch_resilience::{BreakerParams, CircuitBreakerRegistry, DegradedModeController, SlidingWindowLimiter};
use qorch_server::collaborators::{ConsoleAuditSink, HttpSourceClient, HttpSttClient, HttpTtsClient};
use qorch_server::confirmation::{ConfirmationRouter, WsConfirmationChannel};
use qorch_server::{create_router, init_metrics, AppState, InboundRateLimiter};
use qorch_tools::{ToolExecutor, ToolRegistry};

const LOCAL_MODEL_KEY: &str = "local";
const CLOUD_MODEL_KEY: &str = "cloud";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("QORCH_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("Loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing();
    tracing::info!(environment = ?config.environment, "query orchestrator starting");

    let metrics_handle = init_metrics();
    tracing::info!("prometheus metrics mounted at /metrics");

    let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerParams {
        failure_threshold: config.breaker.failure_threshold,
        timeout_sec: config.breaker.timeout_sec,
        half_open_requests: config.breaker.half_open_requests,
        success_threshold: config.breaker.success_threshold,
    }));
    let degraded = Arc::new(DegradedModeController::new(breakers.clone(), vec![LOCAL_MODEL_KEY.to_string(), CLOUD_MODEL_KEY.to_string()]));

    let phi = Arc::new(PhiClassifier::new(None, config.phi.mode));
    let intent = Arc::new(IntentClassifierPipeline::new(None));

    let sources = build_sources(config.search_timeout_ms);

    let local_llm = Arc::new(HttpLlmClient::new(HttpLlmConfig {
        model: std::env::var("QORCH_LOCAL_MODEL").unwrap_or_else(|_| "llama3".to_string()),
        endpoint: std::env::var("QORCH_LOCAL_LLM_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
        local_capable: true,
        timeout: Duration::from_millis(config.search_timeout_ms * 4),
        max_retries: 2,
        initial_backoff: Duration::from_millis(200),
    })?);
    let cloud_llm = Arc::new(HttpLlmClient::new(HttpLlmConfig {
        model: std::env::var("QORCH_CLOUD_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        endpoint: std::env::var("QORCH_CLOUD_LLM_URL").unwrap_or_else(|_| "http://localhost:11435".to_string()),
        local_capable: false,
        timeout: Duration::from_millis(config.search_timeout_ms * 4),
        max_retries: 2,
        initial_backoff: Duration::from_millis(200),
    })?);

    let confirmation_router = Arc::new(ConfirmationRouter::new());
    let confirmation_channel = Arc::new(WsConfirmationChannel::new(confirmation_router.clone()));

    let tool_executor = Arc::new(ToolExecutor::new(
        ToolRegistry::new(),
        SlidingWindowLimiter::new(60, Duration::from_secs(60)),
        None,
        confirmation_channel,
    ));

    let audit = Arc::new(AuditLogger::new(Arc::new(ConsoleAuditSink)));
    let context = Arc::new(ContextStore::new(Arc::new(InMemoryConversationStore::default()), Arc::new(InMemoryCache::default())));

    let orchestrator = Arc::new(Orchestrator::new(
        context,
        phi,
        intent,
        sources,
        breakers,
        degraded,
        None,
        local_llm,
        cloud_llm,
        tool_executor,
        audit,
        config.clone(),
    ));

    let stt: Arc<dyn qorch_core::SttClient> = Arc::new(HttpSttClient::new(
        std::env::var("QORCH_STT_URL").unwrap_or_else(|_| "http://localhost:9001".to_string()),
        Duration::from_secs(10),
    )?);
    let tts: Arc<dyn qorch_core::TtsClient> = Arc::new(HttpTtsClient::new(
        std::env::var("QORCH_TTS_URL").unwrap_or_else(|_| "http://localhost:9002".to_string()),
        Duration::from_secs(10),
    )?);

    let inbound_limit: u32 = std::env::var("QORCH_WS_RATE_LIMIT_PER_MINUTE").ok().and_then(|v| v.parse().ok()).unwrap_or(120);
    let rate_limiter = Arc::new(InboundRateLimiter::new(inbound_limit));

    let state = Arc::new(AppState::new(
        config.clone(),
        orchestrator,
        Arc::new(ToolRegistry::new()),
        confirmation_router,
        rate_limiter,
        stt,
        tts,
        metrics_handle,
    ));

    state.sessions.start_cleanup_task(Duration::from_secs(300));

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Builds the configured source fan-out list. A source is included only if
/// its endpoint env var is set, so an unconfigured deployment starts with
/// zero sources and surfaces `KB_UNAVAILABLE` rather than silently
/// fabricating answers with no retrieved context.
fn build_sources(search_timeout_ms: u64) -> Vec<(SourceDescriptor, Arc<dyn qorch_core::SourceClient>)> {
    let candidates = [
        ("internal_kb", SourceKind::InternalKb, "QORCH_SOURCE_INTERNAL_KB_URL"),
        ("literature", SourceKind::Literature, "QORCH_SOURCE_LITERATURE_URL"),
        ("guidelines", SourceKind::Guidelines, "QORCH_SOURCE_GUIDELINES_URL"),
        ("notes", SourceKind::Notes, "QORCH_SOURCE_NOTES_URL"),
    ];

    candidates
        .into_iter()
        .filter_map(|(name, kind, env_var)| {
            let endpoint = std::env::var(env_var).ok()?;
            let client = HttpSourceClient::new(name, endpoint, Duration::from_millis(search_timeout_ms)).ok()?;
            let descriptor = SourceDescriptor {
                name: name.to_string(),
                kind,
                capabilities: vec![SourceCapability::Hybrid],
                sla_ms: search_timeout_ms,
            };
            Some((descriptor, Arc::new(client) as Arc<dyn qorch_core::SourceClient>))
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}

#[cfg(feature = "telemetry")]
fn init_tracing() {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "qorch_server=info,qorch_orchestrator=info,tower_http=debug".into());
    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if std::env::var("QORCH_LOG_JSON").map(|v| v == "1").unwrap_or(false) {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Ok(otlp_endpoint) = std::env::var("QORCH_OTLP_ENDPOINT") {
        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&otlp_endpoint))
            .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(opentelemetry_sdk::Resource::new(vec![
                opentelemetry::KeyValue::new("service.name", "qorch-server"),
                opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => {
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                subscriber.with(fmt_layer).with(otel_layer).init();
                tracing::info!(endpoint = %otlp_endpoint, "opentelemetry tracing enabled");
                return;
            }
            Err(e) => eprintln!("failed to initialize opentelemetry: {e}. falling back to console."),
        }
    }
    subscriber.with(fmt_layer).init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "qorch_server=info,qorch_orchestrator=info,tower_http=debug".into());
    tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer()).init();
}
