//! Tool Executor (C9): the validated, rate-limited, confirmable call pipeline.

use crate::error::ToolExecError;
use crate::registry::ToolRegistry;
use qorch_core::{ConfirmationChannel, PhiDetector, ToolCall, ToolCallState, ToolResult};
use qorch_resilience::SlidingWindowLimiter;
use std::sync::Arc;
use std::time::Duration;

pub struct ToolExecutor {
    registry: ToolRegistry,
    rate_limiter: SlidingWindowLimiter,
    phi_detector: Option<Arc<dyn PhiDetector>>,
    confirmation: Arc<dyn ConfirmationChannel>,
}

impl ToolExecutor {
    pub fn new(
        registry: ToolRegistry,
        rate_limiter: SlidingWindowLimiter,
        phi_detector: Option<Arc<dyn PhiDetector>>,
        confirmation: Arc<dyn ConfirmationChannel>,
    ) -> Self {
        Self { registry, rate_limiter, phi_detector, confirmation }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Drives one call through received -> validated -> authorized ->
    /// rate_checked -> [awaiting_confirmation] -> executing -> terminal,
    /// matching the call states in `qorch_core::ToolCallState` (§4.9).
    pub async fn execute(&self, mut call: ToolCall) -> (ToolCall, ToolResult) {
        match self.run(&mut call).await {
            Ok(payload) => {
                call.transition(ToolCallState::Completed);
                (call.clone(), ToolResult::success(call.id, payload, 0))
            }
            Err(err) => {
                let state = match err {
                    ToolExecError::Cancelled
                    | ToolExecError::ConfirmationDenied
                    | ToolExecError::ConfirmationTimeout => ToolCallState::Cancelled,
                    ToolExecError::Timeout(_) => ToolCallState::Timeout,
                    _ => ToolCallState::Failed,
                };
                call.transition(state);
                let message = err.to_string();
                let kind = qorch_core::ToolErrorKind::from(err);
                (call.clone(), ToolResult::failure(call.id, kind, message, 0))
            }
        }
    }

    async fn run(&self, call: &mut ToolCall) -> Result<serde_json::Value, ToolExecError> {
        let definition = self
            .registry
            .get(&call.name)
            .cloned()
            .ok_or_else(|| ToolExecError::NotFound(call.name.clone()))?;

        self.registry.validate_arguments(&call.name, &call.arguments)?;
        call.transition(ToolCallState::Validated);

        if !definition.requires_phi {
            if let Some(detector) = &self.phi_detector {
                let serialized = call.arguments.to_string();
                let verdict = detector
                    .detect(&serialized)
                    .await
                    .map_err(|e| ToolExecError::Internal(e.to_string()))?;
                if verdict.has_phi {
                    return Err(ToolExecError::PhiViolation);
                }
            }
        }
        call.transition(ToolCallState::Authorized);

        let rate_key = format!("{}:{}", call.name, call.user_id);
        self.rate_limiter
            .check_with_limit(&rate_key, definition.rate_limit_per_minute)
            .map_err(ToolExecError::RateLimited)?;
        call.transition(ToolCallState::RateChecked);

        if definition.requires_confirmation {
            call.transition(ToolCallState::AwaitingConfirmation);
            let payload = serde_json::json!({"tool": call.name, "arguments": call.arguments});
            let approved = tokio::time::timeout(Duration::from_secs(60), self.confirmation.request(call.id, payload))
                .await
                .map_err(|_| ToolExecError::ConfirmationTimeout)?
                .map_err(|e| ToolExecError::Internal(e.to_string()))?;
            if !approved {
                return Err(ToolExecError::ConfirmationDenied);
            }
        }

        call.transition(ToolCallState::Executing);
        let handler = self.registry.handler(&call.name)?;
        let timeout = Duration::from_secs(definition.timeout_seconds);
        tokio::time::timeout(timeout, handler.call(call.arguments.clone(), &call.user_id))
            .await
            .map_err(|_| ToolExecError::Timeout(timeout))?
            .map_err(|e| ToolExecError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qorch_core::{PhiVerdict, RiskLevel};
    use std::time::Duration as StdDuration;
    use uuid::Uuid;

    struct EchoHandler;

    #[async_trait]
    impl qorch_core::ToolHandler for EchoHandler {
        async fn call(&self, arguments: serde_json::Value, _user_id: &str) -> qorch_core::Result<serde_json::Value> {
            Ok(arguments)
        }
    }

    struct AlwaysApprove;

    #[async_trait]
    impl ConfirmationChannel for AlwaysApprove {
        async fn request(&self, _call_id: Uuid, _payload: serde_json::Value) -> qorch_core::Result<bool> {
            Ok(true)
        }
    }

    struct AlwaysDeny;

    #[async_trait]
    impl ConfirmationChannel for AlwaysDeny {
        async fn request(&self, _call_id: Uuid, _payload: serde_json::Value) -> qorch_core::Result<bool> {
            Ok(false)
        }
    }

    struct NoPhi;

    #[async_trait]
    impl PhiDetector for NoPhi {
        async fn detect(&self, _text: &str) -> qorch_core::Result<PhiVerdict> {
            Ok(PhiVerdict::clean())
        }
    }

    struct AlwaysPhi;

    #[async_trait]
    impl PhiDetector for AlwaysPhi {
        async fn detect(&self, _text: &str) -> qorch_core::Result<PhiVerdict> {
            Ok(PhiVerdict::conservative())
        }
    }

    fn definition(requires_confirmation: bool, requires_phi: bool) -> qorch_core::ToolDefinition {
        qorch_core::ToolDefinition {
            name: "echo".to_string(),
            description: "echoes input".to_string(),
            argument_schema: serde_json::json!({"type": "object"}),
            category: "test".to_string(),
            requires_phi,
            requires_confirmation,
            risk_level: RiskLevel::Low,
            rate_limit_per_minute: 60,
            timeout_seconds: 5,
        }
    }

    fn call() -> ToolCall {
        ToolCall::new("echo", serde_json::json!({"x": 1}), Uuid::new_v4(), "user-1", Uuid::new_v4())
    }

    #[tokio::test]
    async fn successful_call_completes() {
        let mut registry = ToolRegistry::new();
        registry.register(definition(false, false), Arc::new(EchoHandler));
        let executor = ToolExecutor::new(
            registry,
            SlidingWindowLimiter::new(60, StdDuration::from_secs(60)),
            Some(Arc::new(NoPhi)),
            Arc::new(AlwaysApprove),
        );
        let (call, result) = executor.execute(call()).await;
        assert_eq!(call.state, ToolCallState::Completed);
        assert!(result.success);
    }

    #[tokio::test]
    async fn phi_in_arguments_denies_non_phi_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(definition(false, false), Arc::new(EchoHandler));
        let executor = ToolExecutor::new(
            registry,
            SlidingWindowLimiter::new(60, StdDuration::from_secs(60)),
            Some(Arc::new(AlwaysPhi)),
            Arc::new(AlwaysApprove),
        );
        let (call, result) = executor.execute(call()).await;
        assert_eq!(call.state, ToolCallState::Failed);
        assert_eq!(result.error_kind, Some(qorch_core::ToolErrorKind::PhiViolation));
    }

    #[tokio::test]
    async fn declined_confirmation_fails_the_call() {
        let mut registry = ToolRegistry::new();
        registry.register(definition(true, false), Arc::new(EchoHandler));
        let executor = ToolExecutor::new(
            registry,
            SlidingWindowLimiter::new(60, StdDuration::from_secs(60)),
            None,
            Arc::new(AlwaysDeny),
        );
        let (call, result) = executor.execute(call()).await;
        assert_eq!(call.state, ToolCallState::Cancelled);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn each_tool_honors_its_own_rate_limit() {
        let mut registry = ToolRegistry::new();
        let mut tight = definition(false, false);
        tight.rate_limit_per_minute = 1;
        registry.register(tight, Arc::new(EchoHandler));
        let executor = ToolExecutor::new(
            registry,
            SlidingWindowLimiter::new(60, StdDuration::from_secs(60)),
            Some(Arc::new(NoPhi)),
            Arc::new(AlwaysApprove),
        );
        let (_, first) = executor.execute(call()).await;
        assert!(first.success);
        let (call, second) = executor.execute(call()).await;
        assert_eq!(call.state, ToolCallState::Failed);
        assert_eq!(second.error_kind, Some(qorch_core::ToolErrorKind::RateLimitExceeded));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let executor = ToolExecutor::new(
            registry,
            SlidingWindowLimiter::new(60, StdDuration::from_secs(60)),
            None,
            Arc::new(AlwaysApprove),
        );
        let (call, result) = executor.execute(call()).await;
        assert_eq!(call.state, ToolCallState::Failed);
        assert_eq!(result.error_kind, Some(qorch_core::ToolErrorKind::ValidationError));
    }
}
