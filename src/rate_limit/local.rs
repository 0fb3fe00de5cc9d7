use crate::rate_limit::{CallerKey, RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimiter};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// In-process windows; correct for a single gateway instance only
pub struct LocalRateLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<CallerKey, Window>>,
}

impl LocalRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracked_callers(&self) -> usize {
        self.windows.lock().len()
    }

    fn check(&self, caller: &CallerKey, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock();
        let window = windows.entry(caller.clone()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.policy.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.policy.max_requests {
            let elapsed = now.duration_since(window.started);
            return RateLimitDecision::reject(self.policy.window.saturating_sub(elapsed));
        }

        window.count += 1;
        RateLimitDecision::allow(self.policy.max_requests - window.count)
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn allow(&self, caller: &CallerKey) -> RateLimitDecision {
        self.check(caller, Instant::now())
    }

    async fn purge_expired(&self) -> Result<u64, RateLimitError> {
        let now = Instant::now();
        let window = self.policy.window;
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < window);
        Ok((before - windows.len()) as u64)
    }

    fn strategy(&self) -> &'static str {
        "local"
    }
}
