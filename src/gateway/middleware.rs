//! Middleware implementations for the gateway

use crate::auth::{bearer_token, Authenticator};
use crate::gateway::headers::{SECURITY_HEADERS, X_REQUEST_ID};
use crate::gateway::types::GatewayError;
use crate::rate_limit::{CallerKey, RateLimiter};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Request ID middleware - ensures every request has a unique ID for tracing
///
/// A client-supplied UUID is kept; anything else is replaced with a fresh v7.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::now_v7);

    // Hyphenated UUIDs are always valid header values
    let header_value = HeaderValue::from_str(&request_id.to_string())
        .expect("UUID should always produce a valid header value");

    request
        .headers_mut()
        .insert(X_REQUEST_ID, header_value.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(X_REQUEST_ID, header_value);
    response
}

/// Attach the fixed security headers to every response
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// Identify the caller for admission control
///
/// Keyed on the peer address only. Credentials are unvalidated at this
/// point, so they cannot be allowed to pick the budget a request counts
/// against.
pub fn caller_key(request: &Request) -> CallerKey {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| CallerKey::from_addr(*addr))
        .unwrap_or_else(CallerKey::anonymous)
}

/// Admission middleware - rejects callers over their window budget
///
/// Runs before authentication, so rejected callers never cost a key lookup.
pub async fn admission_middleware(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let caller = caller_key(&request);
    let decision = limiter.allow(&caller).await;

    if !decision.allowed {
        debug!(
            caller = %caller,
            strategy = limiter.strategy(),
            retry_after_secs = decision.retry_after_secs(),
            "Request rejected by rate limiter"
        );
        return GatewayError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        }
        .into_response();
    }

    next.run(request).await
}

/// Authentication middleware - validates bearer credentials
pub async fn auth_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    request: Request,
    next: Next,
) -> Response {
    match authenticator.authenticate(request.headers()).await {
        Ok(_) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Panic handler for `CatchPanicLayer`: log the payload, answer with the
/// generic internal-error envelope
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(panic = detail, "Request handler panicked");

    GatewayError::Internal("request handler panicked".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApiKey;
    use crate::infrastructure::MemoryStore;
    use crate::rate_limit::{LocalRateLimiter, RateLimitPolicy};
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::{from_fn, from_fn_with_state};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn limiter(max_requests: u32) -> Arc<dyn RateLimiter> {
        Arc::new(LocalRateLimiter::new(RateLimitPolicy {
            window: Duration::from_secs(60),
            max_requests,
        }))
    }

    #[tokio::test]
    async fn test_request_id_generation() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn(request_id_middleware));

        let response = app
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let request_id = response.headers().get(X_REQUEST_ID).unwrap();
        let uuid = Uuid::parse_str(request_id.to_str().unwrap()).unwrap();
        assert_eq!(uuid.get_version_num(), 7);
    }

    #[tokio::test]
    async fn test_request_id_is_preserved() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn(request_id_middleware));
        let supplied = "0190e1c1-7a3e-7c4a-8d2f-5b6c7d8e9f01";

        let response = app
            .oneshot(
                Request::get("/test")
                    .header(X_REQUEST_ID, supplied)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], supplied);
    }

    #[tokio::test]
    async fn test_security_headers_are_present() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn(security_headers_middleware));

        let response = app
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        for (name, value) in SECURITY_HEADERS {
            assert_eq!(response.headers()[name], value);
        }
    }

    #[test]
    fn test_caller_key_uses_peer_address_and_ignores_credentials() {
        let mut with_key = Request::get("/")
            .header("authorization", "Bearer sk-test")
            .body(Body::empty())
            .unwrap();
        with_key
            .extensions_mut()
            .insert(ConnectInfo("192.168.1.7:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(caller_key(&with_key).as_str(), "ip:192.168.1.7");

        let key_only = Request::get("/")
            .header("authorization", "Bearer sk-test")
            .body(Body::empty())
            .unwrap();
        assert_eq!(caller_key(&key_only), CallerKey::anonymous());

        let bare = Request::get("/").body(Body::empty()).unwrap();
        assert_eq!(caller_key(&bare), CallerKey::anonymous());
    }

    #[tokio::test]
    async fn test_rejected_callers_never_reach_inner_layers() {
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = reached.clone();
        let app = Router::new()
            .route(
                "/test",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .layer(from_fn_with_state(limiter(1), admission_middleware));

        let first = app
            .clone()
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_middleware_rejects_unknown_keys() {
        let key = ApiKey::try_new("sk-good".to_string()).unwrap();
        let authenticator = Arc::new(Authenticator::new(
            Arc::new(MemoryStore::new().with_api_key(&key)),
            Duration::from_secs(60),
        ));
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn_with_state(authenticator, auth_middleware));

        let ok = app
            .clone()
            .oneshot(
                Request::get("/test")
                    .header("authorization", "Bearer sk-good")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let rejected = app
            .oneshot(
                Request::get("/test")
                    .header("authorization", "Bearer sk-bad")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_panic_handler_hides_payload() {
        let response = handle_panic(Box::new("secret detail".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<GatewayError>().is_some());
    }
}
