//! Inbound WebSocket message rate limiting.
//!
//! Reuses `qorch_resilience::SlidingWindowLimiter` as-is, keyed per
//! connection, to cap how fast a single client can push `ClientEvent`s
//! before the orchestrator or voice pipeline ever sees them.

use qorch_resilience::SlidingWindowLimiter;
use std::time::Duration;

/// Per-connection inbound message budget (SPEC_FULL.md §10).
pub struct InboundRateLimiter {
    limiter: SlidingWindowLimiter,
    limit_per_minute: u32,
}

impl InboundRateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limiter: SlidingWindowLimiter::new(limit_per_minute, Duration::from_secs(60)),
            limit_per_minute,
        }
    }

    /// `Ok(())` if `connection_id` still has budget this minute, recording
    /// the hit; otherwise `Err(retry_after)`.
    pub fn check(&self, connection_id: &str) -> Result<(), Duration> {
        self.limiter.check_with_limit(connection_id, self.limit_per_minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_once_the_per_connection_budget_is_spent() {
        let limiter = InboundRateLimiter::new(2);
        assert!(limiter.check("conn-1").is_ok());
        assert!(limiter.check("conn-1").is_ok());
        assert!(limiter.check("conn-1").is_err());
        assert!(limiter.check("conn-2").is_ok());
    }
}
