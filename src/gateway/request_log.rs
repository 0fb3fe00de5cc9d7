//! Request logging
//!
//! Every proxied request produces exactly one [`RequestLogEntry`] and one
//! set of metric samples, whichever way it ends:
//!
//! - the response body is fully sent,
//! - the response body fails mid-stream,
//! - the client goes away while the response is streaming,
//! - the client goes away before any response exists.
//!
//! A [`RequestLogGuard`] is created when the request arrives. It travels
//! into the response body and finalizes itself when the body ends, or from
//! `Drop` when it is discarded early.

use crate::domain::{ApiId, RequestLogEntry, CLIENT_CLOSED_REQUEST};
use crate::gateway::headers::{CONTENT_LENGTH, X_REQUEST_ID};
use crate::gateway::redact::redact_body;
use crate::gateway::types::{BodyLimitExceeded, GatewayError};
use crate::infrastructure::{BestEffort, GatewayStore};
use crate::metrics::{MetricsCollector, RequestOutcome};
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use bytes::Bytes;
use chrono::Utc;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use pin_project_lite::pin_project;
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Bytes of response kept for token-usage extraction
pub const RESPONSE_TAIL_BYTES: usize = 8 * 1024;

const CLIENT_DISCONNECTED: &str = "client disconnected";
const CLIENT_DISCONNECTED_MID_RESPONSE: &str = "client disconnected before response completed";

#[derive(Debug, Clone, Copy)]
pub struct RequestLogConfig {
    pub capture_body: bool,
    pub max_body_chars: usize,
    pub max_request_bytes: usize,
}

pub struct RequestLogger {
    api_id: ApiId,
    store: Arc<dyn GatewayStore>,
    metrics: Arc<MetricsCollector>,
    capture_body: AtomicBool,
    max_body_chars: usize,
    max_request_bytes: usize,
}

impl RequestLogger {
    pub fn new(
        api_id: ApiId,
        store: Arc<dyn GatewayStore>,
        metrics: Arc<MetricsCollector>,
        config: RequestLogConfig,
    ) -> Self {
        Self {
            api_id,
            store,
            metrics,
            capture_body: AtomicBool::new(config.capture_body),
            max_body_chars: config.max_body_chars,
            max_request_bytes: config.max_request_bytes,
        }
    }

    /// Toggle request-body capture without restarting
    pub fn set_body_capture(&self, enabled: bool) {
        self.capture_body.store(enabled, Ordering::Relaxed);
        info!(enabled, "Request body capture toggled");
    }

    pub fn body_capture_enabled(&self) -> bool {
        self.capture_body.load(Ordering::Relaxed)
    }

    fn begin(self: &Arc<Self>, request: &Request) -> RequestLogGuard {
        RequestLogGuard {
            logger: Arc::clone(self),
            started: Instant::now(),
            request_id: request
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            request_body: None,
            status: None,
            error: None,
            tail: Vec::new(),
            finalized: false,
        }
    }

    fn persist(&self, entry: RequestLogEntry) {
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    BestEffort::from_result(
                        "save_request_log",
                        store.save_request_log(&entry).await,
                    );
                });
            }
            Err(_) => warn!(path = %entry.path, "No runtime available; request log dropped"),
        }
    }
}

/// Owns the bookkeeping for one request until it is finalized
pub struct RequestLogGuard {
    logger: Arc<RequestLogger>,
    started: Instant,
    request_id: String,
    method: String,
    path: String,
    request_body: Option<String>,
    status: Option<u16>,
    error: Option<String>,
    tail: Vec<u8>,
    finalized: bool,
}

impl RequestLogGuard {
    fn set_request_body(&mut self, body: Option<String>) {
        self.request_body = body;
    }

    /// Hand the guard over to the response body
    fn attach(mut self, response: Response) -> Response {
        let status = response.status();
        self.status = Some(status.as_u16());
        self.error = match response.extensions().get::<GatewayError>() {
            Some(error) => Some(error.to_string()),
            None if status.as_u16() >= 400 => Some(format!("upstream returned {status}")),
            None => None,
        };

        let (parts, body) = response.into_parts();
        Response::from_parts(parts, Body::new(LoggedBody::new(body, self)))
    }

    fn observe(&mut self, chunk: &[u8]) {
        if chunk.len() >= RESPONSE_TAIL_BYTES {
            self.tail.clear();
            self.tail
                .extend_from_slice(&chunk[chunk.len() - RESPONSE_TAIL_BYTES..]);
            return;
        }
        self.tail.extend_from_slice(chunk);
        if self.tail.len() > RESPONSE_TAIL_BYTES {
            let excess = self.tail.len() - RESPONSE_TAIL_BYTES;
            self.tail.drain(..excess);
        }
    }

    fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.finalize();
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let duration = self.started.elapsed();
        let status = self.status.unwrap_or(CLIENT_CLOSED_REQUEST);
        let tokens = extract_token_usage(&self.tail);

        let entry = RequestLogEntry {
            id: Uuid::now_v7(),
            api_id: self.logger.api_id.clone(),
            method: std::mem::take(&mut self.method),
            path: std::mem::take(&mut self.path),
            request_body: self.request_body.take(),
            status,
            response_time_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            error: self.error.take(),
            created_at: Utc::now(),
        };

        info!(
            request_id = %self.request_id,
            api_id = %entry.api_id,
            method = %entry.method,
            path = %entry.path,
            status,
            duration_ms = entry.response_time_ms,
            tokens,
            "Request completed"
        );

        self.logger.persist(entry);
        self.logger.metrics.record_request(RequestOutcome {
            api_id: self.logger.api_id.clone(),
            duration,
            status,
            tokens,
        });
    }
}

impl Drop for RequestLogGuard {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        match self.status {
            None => {
                self.status = Some(CLIENT_CLOSED_REQUEST);
                self.error = Some(CLIENT_DISCONNECTED.to_string());
            }
            Some(_) => {
                self.error
                    .get_or_insert_with(|| CLIENT_DISCONNECTED_MID_RESPONSE.to_string());
            }
        }
        self.finalize();
    }
}

pin_project! {
    /// Response body that finalizes its request log when it ends
    pub struct LoggedBody {
        #[pin]
        inner: Body,
        guard: RequestLogGuard,
    }
}

impl LoggedBody {
    fn new(inner: Body, mut guard: RequestLogGuard) -> Self {
        // Empty bodies may never be polled
        if inner.is_end_stream() {
            guard.finalize();
        }
        Self { inner, guard }
    }
}

impl HttpBody for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        match this.inner.as_mut().poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.guard.observe(data);
                }
                if this.inner.is_end_stream() {
                    this.guard.finalize();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.guard.fail(format!("response body error: {e}"));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.guard.finalize();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Outermost middleware of the proxied routes
pub async fn request_log_middleware(
    State(logger): State<Arc<RequestLogger>>,
    request: Request,
    next: Next,
) -> Response {
    let mut guard = logger.begin(&request);
    let limit = logger.max_request_bytes;

    let declared_length = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_length.is_some_and(|length| length > limit) {
        return guard.attach(GatewayError::RequestTooLarge { limit }.into_response());
    }

    let (parts, body) = request.into_parts();
    let body = if logger.body_capture_enabled() {
        match Limited::new(body, limit).collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                guard.set_request_body(redact_body(&bytes, logger.max_body_chars));
                Body::from(bytes)
            }
            Err(e) => {
                let error = if e.is::<LengthLimitError>() {
                    GatewayError::RequestTooLarge { limit }
                } else {
                    warn!(error = %e, "Failed to read request body");
                    GatewayError::Internal(format!("Failed to read request body: {e}"))
                };
                return guard.attach(error.into_response());
            }
        }
    } else {
        Body::new(Limited::new(body, limit).map_err(move |e| {
            if e.is::<LengthLimitError>() {
                BoxError::from(BodyLimitExceeded { limit })
            } else {
                e
            }
        }))
    };

    let response = next.run(Request::from_parts(parts, body)).await;
    guard.attach(response)
}

/// Total tokens reported in the tail of a JSON or SSE response
///
/// OpenAI-style bodies carry `usage.total_tokens`; Ollama reports
/// `prompt_eval_count` and `eval_count` on its final object.
pub fn extract_token_usage(tail: &[u8]) -> Option<u64> {
    if tail.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_slice::<Value>(tail) {
        if let Some(tokens) = usage_from(&value) {
            return Some(tokens);
        }
    }

    let text = String::from_utf8_lossy(tail);
    text.lines()
        .rev()
        .map(str::trim)
        .map(|line| line.strip_prefix("data:").map_or(line, str::trim))
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find_map(|value| usage_from(&value))
}

fn usage_from(value: &Value) -> Option<u64> {
    if let Some(total) = value
        .get("usage")
        .and_then(|usage| usage.get("total_tokens"))
        .and_then(Value::as_u64)
    {
        return Some(total);
    }

    let prompt = value.get("prompt_eval_count").and_then(Value::as_u64);
    let completion = value.get("eval_count").and_then(Value::as_u64);
    match (prompt, completion) {
        (None, None) => None,
        (prompt, completion) => Some(prompt.unwrap_or(0) + completion.unwrap_or(0)),
    }
}
