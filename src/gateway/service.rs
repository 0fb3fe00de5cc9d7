//! Main gateway service
//!
//! `GatewayService` owns the engine adapter and the request pipeline and
//! turns them into an Axum router.
//!
//! ```rust,ignore
//! let service = GatewayService::new(adapter, authenticator, rate_limiter, request_logger);
//! let router = service.into_router();
//! axum::serve(listener, router).await?;
//! ```

use crate::adapter::{EngineAdapter, Operation};
use crate::auth::Authenticator;
use crate::gateway::headers::paths;
use crate::gateway::middleware::{request_id_middleware, security_headers_middleware};
use crate::gateway::middleware_stack::GatewayMiddlewareStack;
use crate::gateway::request_log::RequestLogger;
use crate::gateway::types::{GatewayError, GatewayResult};
use crate::rate_limit::RateLimiter;
use axum::{
    extract::{Request, State},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct GatewayService {
    adapter: Arc<dyn EngineAdapter>,
    stack: GatewayMiddlewareStack,
}

impl GatewayService {
    pub fn new(
        adapter: Arc<dyn EngineAdapter>,
        authenticator: Arc<Authenticator>,
        rate_limiter: Arc<dyn RateLimiter>,
        request_logger: Arc<RequestLogger>,
    ) -> Self {
        Self {
            adapter,
            stack: GatewayMiddlewareStack::new(request_logger, rate_limiter, authenticator),
        }
    }

    /// Build the complete router: proxied routes behind the middleware
    /// stack, plus `/health` and the not-found fallback
    pub fn into_router(self) -> Router {
        let mut proxied = Router::new()
            .route(paths::CHAT_COMPLETIONS, post(chat_completions))
            .route(paths::MODELS, get(list_models));

        if self.adapter.supports_management() {
            proxied = proxied
                .route(paths::OLLAMA_PULL, post(management))
                .route(paths::OLLAMA_DELETE, delete(management))
                .route(paths::OLLAMA_TAGS, get(management))
                .route(paths::OLLAMA_SHOW, post(management));
        }

        let proxied = self
            .stack
            .apply_to_router(proxied.with_state(self.adapter));

        Router::new()
            .route(paths::HEALTH, get(health_handler))
            .merge(proxied)
            .fallback(not_found)
            .layer(TraceLayer::new_for_http())
            .layer(from_fn(request_id_middleware))
            .layer(from_fn(security_headers_middleware))
    }
}

async fn chat_completions(
    State(adapter): State<Arc<dyn EngineAdapter>>,
    request: Request,
) -> GatewayResult<Response> {
    adapter.forward(Operation::ChatCompletions, request).await
}

async fn list_models(
    State(adapter): State<Arc<dyn EngineAdapter>>,
    request: Request,
) -> GatewayResult<Response> {
    adapter.forward(Operation::ListModels, request).await
}

async fn management(
    State(adapter): State<Arc<dyn EngineAdapter>>,
    request: Request,
) -> GatewayResult<Response> {
    adapter.forward(Operation::Management, request).await
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::EngineType;
    use crate::domain::{ApiId, ApiKey};
    use crate::gateway::headers::{SECURITY_HEADERS, X_REQUEST_ID};
    use crate::gateway::request_log::RequestLogConfig;
    use crate::infrastructure::MemoryStore;
    use crate::metrics::{
        AlertEvaluator, CollectorConfig, MetricsCollector, ProcessProbe, ProcessSampler,
        ProcessSnapshot,
    };
    use crate::rate_limit::{LocalRateLimiter, RateLimitPolicy};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    const KEY: &str = "sk-service-test";

    struct NoProbe;

    impl ProcessProbe for NoProbe {
        fn snapshot(&self) -> Option<ProcessSnapshot> {
            None
        }
    }

    /// Echoes the operation it was asked to perform
    struct EchoAdapter {
        management: bool,
    }

    #[async_trait]
    impl EngineAdapter for EchoAdapter {
        fn engine(&self) -> EngineType {
            EngineType::Ollama
        }

        fn supports_management(&self) -> bool {
            self.management
        }

        async fn forward(&self, operation: Operation, request: Request) -> GatewayResult<Response> {
            if request.uri().path() == "/v1/chat/completions"
                && request.headers().contains_key("x-explode")
            {
                panic!("adapter exploded");
            }
            Ok(Json(json!({
                "operation": format!("{operation:?}"),
                "path": request.uri().path(),
            }))
            .into_response())
        }
    }

    fn app(management: bool, max_requests: u32) -> (Arc<MemoryStore>, Router) {
        let key = ApiKey::try_new(KEY.to_string()).unwrap();
        let store = Arc::new(MemoryStore::new().with_api_key(&key));
        let metrics = Arc::new(MetricsCollector::new(
            CollectorConfig::default(),
            store.clone(),
            AlertEvaluator::new(store.clone()),
            ProcessSampler::new(Box::new(NoProbe)),
        ));
        let logger = Arc::new(RequestLogger::new(
            ApiId::try_new("default".to_string()).unwrap(),
            store.clone(),
            metrics,
            RequestLogConfig {
                capture_body: false,
                max_body_chars: 1000,
                max_request_bytes: 1024 * 1024,
            },
        ));
        let service = GatewayService::new(
            Arc::new(EchoAdapter { management }),
            Arc::new(Authenticator::new(store.clone(), Duration::from_secs(60))),
            Arc::new(LocalRateLimiter::new(RateLimitPolicy {
                window: Duration::from_secs(60),
                max_requests,
            })),
            logger,
        );
        (store, service.into_router())
    }

    fn authorized(method: &str, uri: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {KEY}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_credentials() {
        let (_, app) = app(false, 10);

        let response = app
            .oneshot(Request::get(paths::HEALTH).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_routes_map_to_operations() {
        let (_, app) = app(false, 10);

        let chat = app
            .clone()
            .oneshot(authorized("POST", paths::CHAT_COMPLETIONS))
            .await
            .unwrap();
        assert_eq!(body_json(chat).await["operation"], "ChatCompletions");

        let models = app.oneshot(authorized("GET", paths::MODELS)).await.unwrap();
        assert_eq!(body_json(models).await["operation"], "ListModels");
    }

    #[tokio::test]
    async fn test_management_routes_follow_adapter_support() {
        let (_, without) = app(false, 10);
        let response = without
            .oneshot(authorized("POST", paths::OLLAMA_PULL))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let (_, with) = app(true, 10);
        let response = with
            .oneshot(authorized("DELETE", paths::OLLAMA_DELETE))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["operation"], "Management");
        assert_eq!(json["path"], paths::OLLAMA_DELETE);
    }

    #[tokio::test]
    async fn test_unknown_paths_get_not_found_envelope() {
        let (_, app) = app(false, 10);

        let response = app
            .oneshot(Request::get("/v2/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(response.headers()[name], value);
        }
        assert_eq!(body_json(response).await["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_missing_credentials_are_rejected() {
        let (_, app) = app(false, 10);

        let response = app
            .oneshot(
                Request::post(paths::CHAT_COMPLETIONS)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["error"]["code"],
            "missing_api_key"
        );
    }

    fn from_peer(token: &str) -> Request {
        let mut request = Request::post(paths::CHAT_COMPLETIONS)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("10.1.2.3:5000".parse::<SocketAddr>().unwrap()));
        request
    }

    #[tokio::test]
    async fn test_rate_limit_applies_before_authentication() {
        let (_, app) = app(false, 1);

        let first = app.clone().oneshot(from_peer("sk-unknown")).await.unwrap();
        assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

        let second = app.oneshot(from_peer("sk-unknown")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_rotating_tokens_share_one_peer_budget() {
        let (_, app) = app(false, 2);

        let mut statuses = Vec::new();
        for i in 0..20 {
            let response = app
                .clone()
                .oneshot(from_peer(&format!("sk-fake-{i}")))
                .await
                .unwrap();
            statuses.push(response.status());
        }

        assert_eq!(&statuses[..2], &[StatusCode::UNAUTHORIZED; 2]);
        assert!(statuses[2..]
            .iter()
            .all(|status| *status == StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn test_panics_become_internal_errors() {
        let (_, app) = app(false, 10);

        let response = app
            .oneshot(
                Request::post(paths::CHAT_COMPLETIONS)
                    .header("authorization", format!("Bearer {KEY}"))
                    .header("x-explode", "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "internal_error");
        assert!(!json.to_string().contains("exploded"));
    }

    #[tokio::test]
    async fn test_refused_requests_are_logged_once() {
        let (store, app) = app(false, 10);

        let response = app
            .oneshot(
                Request::post(paths::CHAT_COMPLETIONS)
                    .header("authorization", "Bearer sk-wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        drop(response);

        for _ in 0..50 {
            if !store.request_logs().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let logs = store.request_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, 401);
        assert_eq!(logs[0].error.as_deref(), Some("Invalid API key"));
    }
}
