//! Degraded-Mode Controller (C12).
//!
//! Observes the circuit breaker registry; when two or more dependencies
//! named as "critical" are open simultaneously, the system enters degraded
//! mode (skip generation, serve cached excerpts with a notice, suppress
//! background work) until a 60s sample finds all critical circuits closed
//! again.

use crate::breaker::CircuitBreakerRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct DegradedModeController {
    registry: Arc<CircuitBreakerRegistry>,
    critical_keys: Vec<String>,
    active: AtomicBool,
}

impl DegradedModeController {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, critical_keys: Vec<String>) -> Self {
        Self {
            registry,
            critical_keys,
            active: AtomicBool::new(false),
        }
    }

    /// Re-evaluates degraded-mode status against the current breaker
    /// snapshots. Call this on a 60s interval and whenever a breaker
    /// transitions, per spec.md §4.12.
    pub fn reevaluate(&self) -> bool {
        let open_count = self
            .critical_keys
            .iter()
            .filter(|key| self.registry.is_open(key))
            .count();
        let now_degraded = open_count >= 2;
        let was_degraded = self.active.swap(now_degraded, Ordering::SeqCst);
        if now_degraded && !was_degraded {
            tracing::warn!(open_count, "entering degraded mode");
        } else if !now_degraded && was_degraded {
            tracing::info!("exiting degraded mode, all critical circuits recovered");
        }
        now_degraded
    }

    pub fn is_degraded(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerParams;
    use qorch_core::CallOutcome;

    #[test]
    fn enters_degraded_mode_when_two_critical_circuits_open() {
        let registry = Arc::new(CircuitBreakerRegistry::new(BreakerParams {
            failure_threshold: 1,
            ..Default::default()
        }));
        let controller = DegradedModeController::new(
            registry.clone(),
            vec!["llm-local".to_string(), "vector-store".to_string()],
        );
        assert!(!controller.reevaluate());

        registry.record("llm-local", CallOutcome::TransientFailure);
        assert!(!controller.reevaluate());

        registry.record("vector-store", CallOutcome::TransientFailure);
        assert!(controller.reevaluate());
    }

    #[test]
    fn single_critical_circuit_open_does_not_trigger() {
        let registry = Arc::new(CircuitBreakerRegistry::new(BreakerParams {
            failure_threshold: 1,
            ..Default::default()
        }));
        let controller =
            DegradedModeController::new(registry.clone(), vec!["llm-local".to_string()]);
        registry.record("llm-local", CallOutcome::TransientFailure);
        assert!(!controller.reevaluate());
    }
}
