//! Circuit breaker state shared between `qorch-resilience` and consumers
//! that need to read (but not mutate) breaker status, e.g. the `/healthz`
//! endpoint and the degraded-mode controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerMode {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub key: String,
    pub mode: BreakerMode,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub open_until: Option<DateTime<Utc>>,
    pub half_open_inflight: u32,
}

impl CircuitBreakerState {
    pub fn closed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mode: BreakerMode::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            open_until: None,
            half_open_inflight: 0,
        }
    }
}
