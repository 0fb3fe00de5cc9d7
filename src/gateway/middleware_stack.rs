//! Middleware stack builder for the proxied routes

use crate::auth::Authenticator;
use crate::gateway::middleware::{admission_middleware, auth_middleware, handle_panic};
use crate::gateway::request_log::{request_log_middleware, RequestLogger};
use crate::rate_limit::RateLimiter;
use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

/// Builder for composing the gateway middleware stack
pub struct GatewayMiddlewareStack {
    request_logger: Arc<RequestLogger>,
    rate_limiter: Arc<dyn RateLimiter>,
    authenticator: Arc<Authenticator>,
}

impl GatewayMiddlewareStack {
    pub fn new(
        request_logger: Arc<RequestLogger>,
        rate_limiter: Arc<dyn RateLimiter>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        Self {
            request_logger,
            rate_limiter,
            authenticator,
        }
    }

    /// Apply the stack to the matched routes of a router
    ///
    /// Order, outer to inner:
    /// 1. Request logging (sees every outcome, including refusals)
    /// 2. Panic recovery, so a panicking handler is logged as a 500
    /// 3. Admission control
    /// 4. Authentication
    ///
    /// Only matched routes get the stack; `/health` and the 404 fallback
    /// live outside it.
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            // Innermost first
            .route_layer(from_fn_with_state(self.authenticator, auth_middleware))
            .route_layer(from_fn_with_state(self.rate_limiter, admission_middleware))
            .route_layer(CatchPanicLayer::custom(handle_panic))
            .route_layer(from_fn_with_state(
                self.request_logger,
                request_log_middleware,
            ))
    }
}
