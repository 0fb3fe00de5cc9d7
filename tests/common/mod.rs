//! Shared fixtures for the integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use inference_gateway::adapter::{adapter_for, EngineType};
use inference_gateway::auth::Authenticator;
use inference_gateway::domain::config_types::EngineBaseUrl;
use inference_gateway::domain::{ApiId, ApiKey, RequestLogEntry};
use inference_gateway::gateway::{GatewayService, RequestLogConfig, RequestLogger};
use inference_gateway::infrastructure::MemoryStore;
use inference_gateway::metrics::{
    AlertEvaluator, CollectorConfig, MetricsCollector, ProcessProbe, ProcessSampler,
    ProcessSnapshot,
};
use inference_gateway::rate_limit::{LocalRateLimiter, RateLimitPolicy};
use std::sync::Arc;
use std::time::Duration;

pub const VALID_KEY: &str = "sk-integration-valid";

/// Base URL nothing listens on
pub const UNREACHABLE_ENGINE: &str = "http://127.0.0.1:1";

pub struct NoProbe;

impl ProcessProbe for NoProbe {
    fn snapshot(&self) -> Option<ProcessSnapshot> {
        None
    }
}

pub struct TestGateway {
    pub store: Arc<MemoryStore>,
    pub metrics: Arc<MetricsCollector>,
    pub router: Router,
}

pub fn api_id() -> ApiId {
    ApiId::try_new("default".to_string()).unwrap()
}

pub fn gateway(engine: EngineType, base_url: &str, max_requests: u32) -> TestGateway {
    gateway_with_log_config(
        engine,
        base_url,
        max_requests,
        RequestLogConfig {
            capture_body: true,
            max_body_chars: 10_000,
            max_request_bytes: 1024 * 1024,
        },
    )
}

pub fn gateway_with_log_config(
    engine: EngineType,
    base_url: &str,
    max_requests: u32,
    log_config: RequestLogConfig,
) -> TestGateway {
    let store = Arc::new(
        MemoryStore::new().with_api_key(&ApiKey::try_new(VALID_KEY.to_string()).unwrap()),
    );
    let metrics = Arc::new(MetricsCollector::new(
        CollectorConfig::default(),
        store.clone(),
        AlertEvaluator::new(store.clone()),
        ProcessSampler::new(Box::new(NoProbe)),
    ));
    let logger = Arc::new(RequestLogger::new(
        api_id(),
        store.clone(),
        metrics.clone(),
        log_config,
    ));
    let adapter = adapter_for(
        engine,
        &EngineBaseUrl::try_new(base_url.to_string()).unwrap(),
        Duration::from_secs(5),
    );
    let router = GatewayService::new(
        adapter,
        Arc::new(Authenticator::new(store.clone(), Duration::from_secs(60))),
        Arc::new(LocalRateLimiter::new(RateLimitPolicy {
            window: Duration::from_secs(60),
            max_requests,
        })),
        logger,
    )
    .into_router();

    TestGateway {
        store,
        metrics,
        router,
    }
}

pub fn request(method: &str, uri: &str, key: Option<&str>, body: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {key}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log writes are spawned; poll until `count` have landed
pub async fn wait_for_logs(store: &MemoryStore, count: usize) -> Vec<RequestLogEntry> {
    for _ in 0..100 {
        let logs = store.request_logs();
        if logs.len() >= count {
            return logs;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.request_logs()
}
