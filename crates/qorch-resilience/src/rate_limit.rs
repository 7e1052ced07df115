//! Sliding-window rate limiter, keyed by (tool, user) for the Tool Executor
//! (§4.9) and reused as-is by the transport's inbound-message limiter
//! (SPEC_FULL.md §10).

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct Window {
    hits: VecDeque<Instant>,
}

pub struct SlidingWindowLimiter {
    window: Duration,
    limit: u32,
    buckets: DashMap<String, Mutex<Window>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            window,
            limit,
            buckets: DashMap::new(),
        }
    }

    /// Returns `Ok(())` if `key` has capacity remaining in the current
    /// window, recording the hit; otherwise `Err(retry_after)`.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_with_limit(key, self.limit)
    }

    /// Same as `check`, but against a caller-supplied limit instead of the
    /// limiter's own default. Lets one limiter back several budgets that
    /// each cap at a different rate, e.g. one per tool's own
    /// `rate_limit_per_minute` (§4.9).
    pub fn check_with_limit(&self, key: &str, limit: u32) -> Result<(), Duration> {
        let now = Instant::now();
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Window { hits: VecDeque::new() }));
        let mut guard = bucket.lock();
        while let Some(&front) = guard.hits.front() {
            if now.duration_since(front) > self.window {
                guard.hits.pop_front();
            } else {
                break;
            }
        }
        if guard.hits.len() as u32 >= limit {
            let retry_after = self.window - now.duration_since(*guard.hits.front().unwrap());
            return Err(retry_after);
        }
        guard.hits.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("tool:user").is_ok());
        assert!(limiter.check("tool:user").is_ok());
        assert!(limiter.check("tool:user").is_err());
    }

    #[test]
    fn different_keys_have_independent_budgets() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("tool:alice").is_ok());
        assert!(limiter.check("tool:bob").is_ok());
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("k").is_ok());
        assert!(limiter.check("k").is_err());
        sleep(Duration::from_millis(30));
        assert!(limiter.check("k").is_ok());
    }

    #[test]
    fn check_with_limit_overrides_the_default_per_key() {
        let limiter = SlidingWindowLimiter::new(100, Duration::from_secs(60));
        assert!(limiter.check_with_limit("tool-a:user", 1).is_ok());
        assert!(limiter.check_with_limit("tool-a:user", 1).is_err());
        assert!(limiter.check_with_limit("tool-b:user", 5).is_ok());
    }
}
