//! Top-level query dispatch: wires C1-C10, C12, C13 into one request path
//! (§6 processing pipeline).
//!
//! ```text
//! C10 load -> C1 detect -> C2 classify -> clarification gate
//!   -> C3 select -> C4 fan-out -> C5 rerank -> C12 degraded check
//!   -> C6 route -> C7 generate <-> C9 tool calls -> C8 assemble
//!   -> C10 append -> C13 audit throughout
//! ```

use crate::assembler;
use crate::error::OrchestratorError;
use crate::intent_classifier::IntentClassifierPipeline;
use crate::phi_classifier::PhiClassifier;
use qorch_config::Settings;
use qorch_context::{AuditLogger, ContextStore};
use qorch_core::{
    IntentClassifier, IntentTag, LlmClient, LlmParams, Message, PhiDetector, QueryResponse,
    RerankerService, ResponseMetadata, SourceClient, SourceDescriptor, SourceOutcome, ToolCall, TurnRole,
};
use qorch_llm::{choose_model, generate, GenerateOutcome, PromptBuilder};
use qorch_resilience::{CircuitBreakerRegistry, DegradedModeController};
use qorch_retrieval::{clarification_gate, rerank, search_all, select, RerankConfig};
use qorch_tools::ToolExecutor;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A cap on the number of tool-call round-trips a single query may trigger,
/// guarding against a model that keeps requesting tools indefinitely.
const MAX_TOOL_ITERATIONS: u32 = 4;

/// Composition root for one deployment: every collaborator the pipeline
/// needs, wired once at startup and shared behind `Arc` across requests.
pub struct Orchestrator {
    context: Arc<ContextStore>,
    phi: Arc<PhiClassifier>,
    intent: Arc<IntentClassifierPipeline>,
    sources: Vec<(SourceDescriptor, Arc<dyn SourceClient>)>,
    breakers: Arc<CircuitBreakerRegistry>,
    degraded: Arc<DegradedModeController>,
    reranker: Option<Arc<dyn RerankerService>>,
    rerank_config: RerankConfig,
    local_llm: Arc<dyn LlmClient>,
    cloud_llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    audit: Arc<AuditLogger>,
    settings: Settings,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: Arc<ContextStore>,
        phi: Arc<PhiClassifier>,
        intent: Arc<IntentClassifierPipeline>,
        sources: Vec<(SourceDescriptor, Arc<dyn SourceClient>)>,
        breakers: Arc<CircuitBreakerRegistry>,
        degraded: Arc<DegradedModeController>,
        reranker: Option<Arc<dyn RerankerService>>,
        local_llm: Arc<dyn LlmClient>,
        cloud_llm: Arc<dyn LlmClient>,
        tools: Arc<ToolExecutor>,
        audit: Arc<AuditLogger>,
        settings: Settings,
    ) -> Self {
        let rerank_config = RerankConfig { min_score: settings.confidence_threshold, ..RerankConfig::default() };
        Self {
            context,
            phi,
            intent,
            sources,
            breakers,
            degraded,
            reranker,
            rerank_config,
            local_llm,
            cloud_llm,
            tools,
            audit,
            settings,
        }
    }

    /// Handles one user turn end to end. `user_id` is assumed already hashed
    /// by the transport layer before it reaches the orchestrator, so the
    /// same value is usable directly as the audit log's `user_id_hash`.
    pub async fn process_query(
        &self,
        session_id: Uuid,
        user_id: &str,
        trace_id: Uuid,
        query: &str,
    ) -> Result<QueryResponse, OrchestratorError> {
        let start = std::time::Instant::now();
        let history_limit = self.settings.context.history_limit;
        let mut context = self.context.load(session_id, history_limit).await?;

        let phi_verdict = self.phi.detect(query).await?;
        self.audit.record(
            trace_id,
            session_id,
            user_id,
            "query_received",
            query,
            &phi_verdict,
            "ok",
            start.elapsed().as_millis() as u64,
        );

        let intent = self.intent.classify(query, &context).await?;
        context.current_intent = Some(intent.clone());

        if let Some(clarification) = clarification_gate(query, &intent) {
            context.awaiting_clarification = true;
            let response = self.respond_directly(
                &clarification.question,
                intent.tag,
                phi_verdict.has_phi,
                trace_id,
                false,
            );
            self.persist_turn(session_id, query, &response).await?;
            return Ok(response);
        }
        context.awaiting_clarification = false;

        let selected = select(&intent, &context.preferences, &self.selector_sources(), self.settings.max_parallel_sources);
        let clients: Vec<(SourceDescriptor, Arc<dyn SourceClient>)> = selected
            .into_iter()
            .filter_map(|d| self.sources.iter().find(|(s, _)| s.name == d.name).cloned())
            .collect();

        let deadline = Duration::from_millis(self.settings.search_timeout_ms);
        let fanout = search_all(
            query,
            &clients,
            self.settings.result_limit_per_source,
            deadline,
            deadline,
            self.breakers.clone(),
        )
        .await;

        let ranked = rerank(query, fanout.results, self.reranker.as_ref(), &self.rerank_config).await;

        // Every selected source came back Timeout/Error/CircuitOpen, too few
        // to trip `degraded.reevaluate()` but still leaving nothing to
        // answer from. Fail explicitly rather than falling through to
        // generation with an empty `ranked` set (§8).
        let all_sources_failed =
            !fanout.outcomes.is_empty() && fanout.outcomes.iter().all(|o| o.outcome != SourceOutcome::Ok);
        if all_sources_failed && ranked.is_empty() {
            return Err(OrchestratorError::KbUnavailable);
        }

        if self.degraded.reevaluate() {
            let notice = if ranked.is_empty() {
                "The system is currently running in degraded mode and cannot reach enough \
                 knowledge sources to answer this question right now. Please try again shortly."
                    .to_string()
            } else {
                format!(
                    "The system is running in degraded mode; live generation is unavailable. \
                     Here is the most relevant material on file: {}",
                    ranked[0].result.content
                )
            };
            let response = self.respond_directly(&notice, intent.tag, phi_verdict.has_phi, trace_id, true);
            self.persist_turn(session_id, query, &response).await?;
            return Ok(response);
        }

        let model = choose_model(
            phi_verdict.has_phi,
            self.settings.router_mode,
            self.local_llm.clone(),
            self.cloud_llm.clone(),
            &self.breakers,
        )?;

        let llm_params = LlmParams { temperature: self.settings.llm.temperature, max_tokens: self.settings.llm.max_tokens };
        let clinical_context = context.pinned_clinical_context.clone();
        let recent_history: Vec<Message> = context.recent(self.settings.context.history_limit).into_iter().cloned().collect();
        let mut prompt = PromptBuilder::build(query, &ranked, clinical_context.as_ref(), &recent_history);

        let mut tool_call_ids = Vec::new();
        let mut iterations = 0u32;
        let answer = loop {
            let outcome = generate(&prompt, &model.client, &llm_params, |_chunk| {}).await?;
            match outcome {
                GenerateOutcome::Complete(answer) => break answer,
                GenerateOutcome::ToolCallRequested { name, arguments, .. } => {
                    iterations += 1;
                    if iterations > MAX_TOOL_ITERATIONS {
                        return Err(OrchestratorError::ToolInternalError(
                            "tool call loop exceeded iteration cap".to_string(),
                        ));
                    }
                    let call = ToolCall::new(name.clone(), arguments, session_id, user_id, trace_id);
                    let call_start = std::time::Instant::now();
                    let (call, result) = self.tools.execute(call).await;
                    self.audit.record(
                        trace_id,
                        session_id,
                        user_id,
                        format!("tool_call:{name}"),
                        &call.arguments.to_string(),
                        &phi_verdict,
                        if result.success { "ok" } else { "failed" },
                        call_start.elapsed().as_millis() as u64,
                    );
                    tool_call_ids.push(call.id);
                    prompt.push_str(&format!(
                        "\n\nTool `{name}` result: {}\n",
                        result.payload.unwrap_or(serde_json::Value::Null)
                    ));
                }
            }
        };

        let metadata = ResponseMetadata {
            model_id: answer.model_id.clone(),
            phi_detected: phi_verdict.has_phi,
            intent: intent.tag,
            sources_queried: fanout.outcomes,
            prompt_tokens: answer.prompt_tokens,
            completion_tokens: answer.completion_tokens,
            cost_usd: answer.cost_usd,
            trace_id,
            tool_call_ids,
            degraded: false,
        };
        let response = assembler::assemble(&answer, &ranked, &self.selector_sources(), metadata);
        self.persist_turn(session_id, query, &response).await?;

        self.audit.record(
            trace_id,
            session_id,
            user_id,
            "response_assembled",
            &response.answer,
            &phi_verdict,
            "ok",
            start.elapsed().as_millis() as u64,
        );

        Ok(response)
    }

    fn selector_sources(&self) -> Vec<SourceDescriptor> {
        self.sources.iter().map(|(d, _)| d.clone()).collect()
    }

    /// Builds a response that bypasses retrieval and generation entirely
    /// (clarification questions, degraded-mode notices).
    fn respond_directly(
        &self,
        text: &str,
        intent_tag: IntentTag,
        phi_detected: bool,
        trace_id: Uuid,
        degraded: bool,
    ) -> QueryResponse {
        QueryResponse {
            message_id: Uuid::new_v4(),
            answer: text.to_string(),
            citations: Vec::new(),
            metadata: ResponseMetadata {
                model_id: "none".to_string(),
                phi_detected,
                intent: intent_tag,
                sources_queried: Vec::new(),
                prompt_tokens: 0,
                completion_tokens: 0,
                cost_usd: 0.0,
                trace_id,
                tool_call_ids: Vec::new(),
                degraded,
            },
        }
    }

    async fn persist_turn(&self, session_id: Uuid, query: &str, response: &QueryResponse) -> Result<(), OrchestratorError> {
        let context = self.context.load(session_id, self.settings.context.history_limit).await?;
        let context = self
            .context
            .append_message(session_id, Message::new(TurnRole::User, query), context)
            .await?;
        let mut assistant_message = Message::new(TurnRole::Assistant, response.answer.clone());
        assistant_message.citations = response.citations.clone();
        self.context.append_message(session_id, assistant_message, context).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::Stream;
    use qorch_context::{InMemoryCache, InMemoryConversationStore};
    use qorch_core::{
        AuditEvent, AuditSink, ConfirmationChannel, FinishReason, LlmStreamItem, PhiVerdict, Result as CoreResult,
        SearchResult, Session,
    };
    use qorch_resilience::BreakerParams;
    use qorch_tools::ToolRegistry;
    use std::pin::Pin;

    struct StubLlm {
        id: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        fn model_id(&self) -> &str {
            self.id
        }
        fn local_capable(&self) -> bool {
            true
        }
        fn stream(
            &self,
            _prompt: &str,
            _params: &LlmParams,
        ) -> Pin<Box<dyn Stream<Item = CoreResult<LlmStreamItem>> + Send + '_>> {
            let reply = self.reply.to_string();
            Box::pin(futures::stream::iter(vec![
                Ok(LlmStreamItem::Token { chunk_index: 0, content: reply }),
                Ok(LlmStreamItem::Done { finish_reason: FinishReason::Stop, prompt_tokens: 5, completion_tokens: 2, cost_usd: 0.0 }),
            ]))
        }
    }

    struct StubSource;

    #[async_trait]
    impl SourceClient for StubSource {
        async fn search(&self, _query: &str, _limit: usize) -> CoreResult<Vec<SearchResult>> {
            Ok(vec![SearchResult {
                source: "kb".to_string(),
                content: "metformin is first-line for type 2 diabetes".to_string(),
                relevance: 0.9,
                title: Some("Diabetes guideline".to_string()),
                url: None,
                evidence_grade: Some("A".to_string()),
                external_id: None,
            }])
        }
        fn dependency_key(&self) -> &str {
            "kb"
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SourceClient for FailingSource {
        async fn search(&self, _query: &str, _limit: usize) -> CoreResult<Vec<SearchResult>> {
            Err(qorch_core::Error::Internal("source down".to_string()))
        }
        fn dependency_key(&self) -> &str {
            "kb"
        }
    }

    struct NoopAuditSink;

    #[async_trait]
    impl AuditSink for NoopAuditSink {
        async fn append(&self, _event: AuditEvent) -> CoreResult<()> {
            Ok(())
        }
    }

    struct AlwaysApprove;

    #[async_trait]
    impl ConfirmationChannel for AlwaysApprove {
        async fn request(&self, _call_id: Uuid, _payload: serde_json::Value) -> CoreResult<bool> {
            Ok(true)
        }
    }

    fn test_orchestrator(reply: &'static str) -> Orchestrator {
        let settings = Settings::default();
        let store = Arc::new(ContextStore::new(
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(InMemoryCache::new()),
        ));
        let phi = Arc::new(PhiClassifier::new(None, qorch_core::PhiMode::Strict));
        let intent = Arc::new(IntentClassifierPipeline::new(None));
        let source = (
            SourceDescriptor {
                name: "kb".to_string(),
                kind: qorch_core::SourceKind::InternalKb,
                capabilities: vec![qorch_core::SourceCapability::Keyword],
                sla_ms: 5000,
            },
            Arc::new(StubSource) as Arc<dyn SourceClient>,
        );
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerParams::default()));
        let degraded = Arc::new(DegradedModeController::new(breakers.clone(), vec!["local".to_string(), "cloud".to_string()]));
        let tools = Arc::new(ToolExecutor::new(
            ToolRegistry::new(),
            qorch_resilience::SlidingWindowLimiter::new(60, Duration::from_secs(60)),
            None,
            Arc::new(AlwaysApprove),
        ));
        let audit = Arc::new(AuditLogger::new(Arc::new(NoopAuditSink)));
        Orchestrator::new(
            store,
            phi,
            intent,
            vec![source],
            breakers,
            degraded,
            None,
            Arc::new(StubLlm { id: "local", reply }),
            Arc::new(StubLlm { id: "cloud", reply }),
            tools,
            audit,
            settings,
        )
    }

    #[tokio::test]
    async fn simple_query_returns_assembled_response_with_citation() {
        let orchestrator = test_orchestrator("Start with metformin [1].");
        let session = Session::new("user-1");
        orchestrator.context.save_session(&session).await.unwrap();
        let response = orchestrator
            .process_query(session.id, "user-1", Uuid::new_v4(), "what is the first-line treatment for type 2 diabetes")
            .await
            .unwrap();
        assert_eq!(response.citations.len(), 1);
        assert!(!response.metadata.degraded);
    }

    #[tokio::test]
    async fn all_sources_failing_yields_kb_unavailable_without_enough_trips_to_degrade() {
        let settings = Settings::default();
        let store = Arc::new(ContextStore::new(
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(InMemoryCache::new()),
        ));
        let phi = Arc::new(PhiClassifier::new(None, qorch_core::PhiMode::Strict));
        let intent = Arc::new(IntentClassifierPipeline::new(None));
        let source = (
            SourceDescriptor {
                name: "kb".to_string(),
                kind: qorch_core::SourceKind::InternalKb,
                capabilities: vec![qorch_core::SourceCapability::Keyword],
                sla_ms: 5000,
            },
            Arc::new(FailingSource) as Arc<dyn SourceClient>,
        );
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerParams::default()));
        // Critical keys unrelated to the failing source: the failure never
        // trips `degraded.reevaluate()` on its own.
        let degraded = Arc::new(DegradedModeController::new(breakers.clone(), vec!["local".to_string(), "cloud".to_string()]));
        let tools = Arc::new(ToolExecutor::new(
            ToolRegistry::new(),
            qorch_resilience::SlidingWindowLimiter::new(60, Duration::from_secs(60)),
            None,
            Arc::new(AlwaysApprove),
        ));
        let audit = Arc::new(AuditLogger::new(Arc::new(NoopAuditSink)));
        let orchestrator = Orchestrator::new(
            store,
            phi,
            intent,
            vec![source],
            breakers,
            degraded,
            None,
            Arc::new(StubLlm { id: "local", reply: "unused" }),
            Arc::new(StubLlm { id: "cloud", reply: "unused" }),
            tools,
            audit,
            settings,
        );
        let session = Session::new("user-1");
        orchestrator.context.save_session(&session).await.unwrap();
        let result = orchestrator
            .process_query(session.id, "user-1", Uuid::new_v4(), "what is the first-line treatment for type 2 diabetes")
            .await;
        assert!(matches!(result, Err(OrchestratorError::KbUnavailable)));
    }

    #[tokio::test]
    async fn ambiguous_query_short_circuits_to_clarification() {
        let orchestrator = test_orchestrator("unused");
        let session = Session::new("user-1");
        orchestrator.context.save_session(&session).await.unwrap();
        let response = orchestrator
            .process_query(session.id, "user-1", Uuid::new_v4(), "kidney disease")
            .await
            .unwrap();
        assert!(response.citations.is_empty());
        assert_eq!(response.metadata.model_id, "none");
    }
}
