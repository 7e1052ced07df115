//! Circuit Breaker Registry (C11).
//!
//! One entry per dependency key (each source, each LLM backend, the PHI
//! detector, reranker, embedding backend, store, cache). Each entry is
//! guarded by its own short critical section — there is no registry-wide
//! lock, so a state transition on one key never blocks a read on another
//! (§5 "per-key atomic counters... no global lock").

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use qorch_core::{BreakerMode, CallOutcome, CircuitBreakerState};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ResilienceError;

#[derive(Debug, Clone)]
pub struct BreakerParams {
    pub failure_threshold: u32,
    pub timeout_sec: u64,
    pub half_open_requests: u32,
    pub success_threshold: u32,
}

impl Default for BreakerParams {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_sec: 60,
            half_open_requests: 1,
            success_threshold: 2,
        }
    }
}

struct Entry {
    state: CircuitBreakerState,
}

/// Registry of per-dependency circuit breaker state, shared behind an `Arc`
/// by every collaborator call site.
pub struct CircuitBreakerRegistry {
    params: BreakerParams,
    entries: DashMap<String, Arc<Mutex<Entry>>>,
}

pub enum Permit {
    /// Call may proceed normally (breaker closed).
    Closed,
    /// Call may proceed as a probe; caller must report the outcome so the
    /// breaker can decide whether to close or re-open.
    HalfOpenProbe,
}

impl CircuitBreakerRegistry {
    pub fn new(params: BreakerParams) -> Self {
        Self {
            params,
            entries: DashMap::new(),
        }
    }

    fn entry(&self, key: &str) -> Arc<Mutex<Entry>> {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Entry {
                    state: CircuitBreakerState::closed(key),
                }))
            })
            .clone()
    }

    /// Checks whether a call against `key` may proceed right now. Does not
    /// perform the call itself — `qorch-retrieval`/`qorch-llm` wrap this
    /// with their own timeout/retry logic and call [`record`] afterward.
    pub fn check(&self, key: &str) -> Result<Permit, ResilienceError> {
        let entry = self.entry(key);
        let mut guard = entry.lock();
        match guard.state.mode {
            BreakerMode::Closed => Ok(Permit::Closed),
            BreakerMode::Open => {
                let now = Utc::now();
                if guard
                    .state
                    .open_until
                    .map(|until| now >= until)
                    .unwrap_or(true)
                {
                    guard.state.mode = BreakerMode::HalfOpen;
                    guard.state.half_open_inflight = 1;
                    guard.state.consecutive_successes = 0;
                    Ok(Permit::HalfOpenProbe)
                } else {
                    Err(ResilienceError::CircuitOpen(key.to_string()))
                }
            }
            BreakerMode::HalfOpen => {
                if guard.state.half_open_inflight < self.params.half_open_requests {
                    guard.state.half_open_inflight += 1;
                    Ok(Permit::HalfOpenProbe)
                } else {
                    Err(ResilienceError::CircuitOpen(key.to_string()))
                }
            }
        }
    }

    /// Records the outcome of a call made under a permit from [`check`].
    pub fn record(&self, key: &str, outcome: CallOutcome) {
        let entry = self.entry(key);
        let mut guard = entry.lock();
        match outcome {
            CallOutcome::Success => {
                guard.state.consecutive_failures = 0;
                match guard.state.mode {
                    BreakerMode::Closed => {}
                    BreakerMode::HalfOpen => {
                        guard.state.consecutive_successes += 1;
                        guard.state.half_open_inflight =
                            guard.state.half_open_inflight.saturating_sub(1);
                        if guard.state.consecutive_successes >= self.params.success_threshold {
                            guard.state.mode = BreakerMode::Closed;
                            guard.state.open_until = None;
                            tracing::info!(dependency = key, "circuit closed after recovery");
                        }
                    }
                    BreakerMode::Open => {}
                }
            }
            CallOutcome::TransientFailure => {
                guard.state.consecutive_successes = 0;
                guard.state.consecutive_failures += 1;
                if guard.state.mode == BreakerMode::HalfOpen {
                    guard.state.half_open_inflight = 0;
                    self.open(&mut guard.state, key);
                } else if guard.state.consecutive_failures >= self.params.failure_threshold {
                    self.open(&mut guard.state, key);
                }
            }
            CallOutcome::PermanentFailure => {
                // Permanent failures (validation, permission) are not the
                // dependency's fault and do not move the breaker.
            }
        }
    }

    fn open(&self, state: &mut CircuitBreakerState, key: &str) {
        state.mode = BreakerMode::Open;
        state.open_until = Some(Utc::now() + chrono::Duration::seconds(self.params.timeout_sec as i64));
        state.consecutive_failures = 0;
        tracing::warn!(dependency = key, "circuit opened");
        metrics::counter!("breaker_opened_total", "dependency" => key.to_string()).increment(1);
    }

    pub fn half_open_timeout(&self) -> Duration {
        Duration::from_secs(self.params.timeout_sec)
    }

    pub fn snapshot(&self, key: &str) -> CircuitBreakerState {
        self.entry(key).lock().state.clone()
    }

    pub fn all_snapshots(&self) -> Vec<CircuitBreakerState> {
        self.entries.iter().map(|e| e.lock().state.clone()).collect()
    }

    pub fn is_open(&self, key: &str) -> bool {
        matches!(self.snapshot(key).mode, BreakerMode::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_consecutive_failure_threshold() {
        let registry = CircuitBreakerRegistry::new(BreakerParams {
            failure_threshold: 3,
            ..Default::default()
        });
        for _ in 0..3 {
            assert!(matches!(registry.check("src-a").unwrap(), Permit::Closed));
            registry.record("src-a", CallOutcome::TransientFailure);
        }
        assert!(registry.check("src-a").is_err());
        assert!(registry.is_open("src-a"));
    }

    #[test]
    fn half_open_probe_closes_after_success_threshold() {
        let registry = CircuitBreakerRegistry::new(BreakerParams {
            failure_threshold: 1,
            timeout_sec: 0,
            half_open_requests: 1,
            success_threshold: 2,
        });
        registry.record("src-b", CallOutcome::TransientFailure);
        assert!(registry.is_open("src-b"));

        assert!(matches!(registry.check("src-b").unwrap(), Permit::HalfOpenProbe));
        registry.record("src-b", CallOutcome::Success);
        assert!(!registry.is_open("src-b"));

        assert!(matches!(registry.check("src-b").unwrap(), Permit::HalfOpenProbe));
        registry.record("src-b", CallOutcome::Success);
        assert!(!registry.is_open("src-b"));
    }

    #[test]
    fn permanent_failure_does_not_open_circuit() {
        let registry = CircuitBreakerRegistry::new(BreakerParams {
            failure_threshold: 1,
            ..Default::default()
        });
        registry.record("src-c", CallOutcome::PermanentFailure);
        assert!(!registry.is_open("src-c"));
    }
}
