//! Per-caller fixed-window admission control
//!
//! Every caller gets `max_requests` admissions per window. The window starts
//! at the caller's first request and resets once it has fully elapsed. Two
//! strategies implement the same contract: [`LocalRateLimiter`] keeps windows
//! in process memory, [`SharedRateLimiter`] keeps them in PostgreSQL so that
//! several gateway instances share one budget.

pub mod local;
pub mod shared;

use crate::background::PeriodicJob;
use crate::domain::config_types::{IntervalSecs, RequestBudget};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use local::LocalRateLimiter;
pub use shared::SharedRateLimiter;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Rate limit store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Fixed-window policy shared by both strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitPolicy {
    pub fn new(window: IntervalSecs, max_requests: RequestBudget) -> Self {
        Self {
            window: window.as_duration(),
            max_requests: max_requests.into_inner(),
        }
    }
}

/// Identity a window is counted against: the peer IP, or `anonymous` when
/// the connection address is unknown
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerKey(String);

impl CallerKey {
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self(format!("ip:{}", addr.ip()))
    }

    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Time until the current window resets; set when rejected
    pub retry_after: Option<Duration>,
    pub remaining: u32,
}

impl RateLimitDecision {
    pub fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            retry_after: None,
            remaining,
        }
    }

    pub fn reject(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
            remaining: 0,
        }
    }

    /// `Retry-After` value in whole seconds, never below one
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after
            .map(|wait| wait.as_secs() + u64::from(wait.subsec_nanos() > 0))
            .unwrap_or(0)
            .max(1)
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request against `caller` and decide whether to admit it
    async fn allow(&self, caller: &CallerKey) -> RateLimitDecision;

    /// Drop windows that have fully elapsed, returning how many were removed
    async fn purge_expired(&self) -> Result<u64, RateLimitError>;

    fn strategy(&self) -> &'static str;
}

/// Periodic purge of expired windows
pub struct RateLimitCleanup {
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitCleanup {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl PeriodicJob for RateLimitCleanup {
    fn name(&self) -> &'static str {
        "rate_limit_cleanup"
    }

    async fn tick(&self) {
        match self.limiter.purge_expired().await {
            Ok(removed) => debug!(
                strategy = self.limiter.strategy(),
                removed, "Purged expired rate-limit windows"
            ),
            Err(e) => warn!(
                strategy = self.limiter.strategy(),
                error = %e,
                "Failed to purge rate-limit windows"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_key_from_addr_ignores_port() {
        let a = CallerKey::from_addr("10.0.0.5:50000".parse().unwrap());
        let b = CallerKey::from_addr("10.0.0.5:50001".parse().unwrap());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "ip:10.0.0.5");
    }

    #[test]
    fn test_retry_after_rounds_up_to_whole_seconds() {
        assert_eq!(
            RateLimitDecision::reject(Duration::from_millis(1500)).retry_after_secs(),
            2
        );
        assert_eq!(
            RateLimitDecision::reject(Duration::from_secs(30)).retry_after_secs(),
            30
        );
        assert_eq!(RateLimitDecision::reject(Duration::ZERO).retry_after_secs(), 1);
    }
}
