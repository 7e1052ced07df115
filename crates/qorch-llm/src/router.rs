//! Model Router (C6).

use crate::error::LlmError;
use qorch_config::RouterMode;
use qorch_core::LlmClient;
use qorch_resilience::CircuitBreakerRegistry;
use std::sync::Arc;

/// A resolved model choice, ready to pass to the Answer Generator.
pub struct ModelHandle {
    pub client: Arc<dyn LlmClient>,
    pub is_local: bool,
}

/// Chooses a local or cloud model per the configured routing policy and the
/// PHI verdict, falling back across a one-way-only PHI boundary (local may
/// stand in for cloud; cloud may never stand in for local when PHI is
/// present) (§4.6).
pub fn choose_model(
    has_phi: bool,
    mode: RouterMode,
    local: Arc<dyn LlmClient>,
    cloud: Arc<dyn LlmClient>,
    breakers: &CircuitBreakerRegistry,
) -> Result<ModelHandle, LlmError> {
    let preferred_local = match mode {
        RouterMode::Hybrid => has_phi,
        RouterMode::LocalOnly => true,
        RouterMode::CloudOnly => false,
    };

    let local_key = local.model_id().to_string();
    let cloud_key = cloud.model_id().to_string();
    let local_open = breakers.is_open(&local_key);
    let cloud_open = breakers.is_open(&cloud_key);

    if preferred_local {
        if !local_open {
            return Ok(ModelHandle { client: local, is_local: true });
        }
        // Local circuit open: cloud may only stand in when doing so does
        // not violate the PHI boundary.
        if !has_phi && !cloud_open {
            return Ok(ModelHandle { client: cloud, is_local: false });
        }
        return Err(LlmError::NoModelAvailable);
    }

    if !cloud_open {
        return Ok(ModelHandle { client: cloud, is_local: false });
    }
    if !local_open {
        return Ok(ModelHandle { client: local, is_local: true });
    }
    Err(LlmError::NoModelAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::Stream;
    use qorch_core::{LlmParams, LlmStreamItem};
    use qorch_resilience::BreakerParams;
    use std::pin::Pin;

    struct StubClient {
        id: &'static str,
        local: bool,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        fn model_id(&self) -> &str {
            self.id
        }
        fn local_capable(&self) -> bool {
            self.local
        }
        fn stream(
            &self,
            _prompt: &str,
            _params: &LlmParams,
        ) -> Pin<Box<dyn Stream<Item = qorch_core::Result<LlmStreamItem>> + Send + '_>> {
            Box::pin(futures::stream::empty())
        }
    }

    #[test]
    fn hybrid_mode_routes_phi_to_local() {
        let breakers = CircuitBreakerRegistry::new(BreakerParams::default());
        let local = Arc::new(StubClient { id: "local", local: true });
        let cloud = Arc::new(StubClient { id: "cloud", local: false });
        let handle = choose_model(true, RouterMode::Hybrid, local, cloud, &breakers).unwrap();
        assert!(handle.is_local);
    }

    #[test]
    fn hybrid_mode_routes_non_phi_to_cloud() {
        let breakers = CircuitBreakerRegistry::new(BreakerParams::default());
        let local = Arc::new(StubClient { id: "local", local: true });
        let cloud = Arc::new(StubClient { id: "cloud", local: false });
        let handle = choose_model(false, RouterMode::Hybrid, local, cloud, &breakers).unwrap();
        assert!(!handle.is_local);
    }

    #[test]
    fn phi_query_never_falls_back_to_cloud_when_local_circuit_open() {
        let breakers = CircuitBreakerRegistry::new(BreakerParams { failure_threshold: 1, ..Default::default() });
        breakers.record("local", qorch_core::CallOutcome::TransientFailure);
        let local = Arc::new(StubClient { id: "local", local: true });
        let cloud = Arc::new(StubClient { id: "cloud", local: false });
        let result = choose_model(true, RouterMode::Hybrid, local, cloud, &breakers);
        assert!(result.is_err());
    }
}
