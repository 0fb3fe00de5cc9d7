use crate::rate_limit::{CallerKey, RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimiter};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{info, warn};

const SCHEMA: &str = r#"CREATE TABLE IF NOT EXISTS rate_limit_windows (
    caller TEXT PRIMARY KEY,
    window_start TIMESTAMPTZ NOT NULL,
    hits INTEGER NOT NULL
)"#;

// Old-row values drive both CASE arms, so reset and increment happen in one
// atomic statement regardless of how many gateways hit the same caller.
const HIT: &str = r#"INSERT INTO rate_limit_windows (caller, window_start, hits)
VALUES ($1, now(), 1)
ON CONFLICT (caller) DO UPDATE SET
    hits = CASE
        WHEN rate_limit_windows.window_start <= now() - make_interval(secs => $2)
        THEN 1
        ELSE rate_limit_windows.hits + 1
    END,
    window_start = CASE
        WHEN rate_limit_windows.window_start <= now() - make_interval(secs => $2)
        THEN now()
        ELSE rate_limit_windows.window_start
    END
RETURNING hits,
    EXTRACT(EPOCH FROM (window_start + make_interval(secs => $2) - now()))::float8 AS reset_in"#;

const PURGE: &str =
    "DELETE FROM rate_limit_windows WHERE window_start <= now() - make_interval(secs => $1)";

/// Windows kept in PostgreSQL so every gateway instance shares one budget
///
/// When the store cannot be reached the request is admitted: losing rate
/// limiting briefly is preferred over refusing all traffic.
pub struct SharedRateLimiter {
    pool: PgPool,
    policy: RateLimitPolicy,
}

impl SharedRateLimiter {
    /// Build a limiter without touching the network
    pub fn connect_lazy(url: &str, policy: RateLimitPolicy) -> Result<Self, RateLimitError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy(url)?;
        Ok(Self { pool, policy })
    }

    pub async fn ensure_schema(&self) -> Result<(), RateLimitError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        info!("Shared rate-limit store ready");
        Ok(())
    }

    async fn hit(&self, caller: &CallerKey) -> Result<RateLimitDecision, RateLimitError> {
        let row = sqlx::query(HIT)
            .bind(caller.as_str())
            .bind(self.policy.window.as_secs_f64())
            .fetch_one(&self.pool)
            .await?;

        let hits: i32 = row.try_get("hits")?;
        let reset_in: f64 = row.try_get("reset_in")?;
        let hits = u32::try_from(hits).unwrap_or(0);

        if hits > self.policy.max_requests {
            Ok(RateLimitDecision::reject(Duration::from_secs_f64(
                reset_in.max(0.0),
            )))
        } else {
            Ok(RateLimitDecision::allow(self.policy.max_requests - hits))
        }
    }
}

#[async_trait]
impl RateLimiter for SharedRateLimiter {
    async fn allow(&self, caller: &CallerKey) -> RateLimitDecision {
        match self.hit(caller).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    caller = %caller,
                    error = %e,
                    "Shared rate-limit store unreachable; admitting request"
                );
                RateLimitDecision::allow(self.policy.max_requests)
            }
        }
    }

    async fn purge_expired(&self) -> Result<u64, RateLimitError> {
        let result = sqlx::query(PURGE)
            .bind(self.policy.window.as_secs_f64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn strategy(&self) -> &'static str {
        "shared"
    }
}
