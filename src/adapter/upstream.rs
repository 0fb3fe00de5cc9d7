//! HTTP client for the upstream engine

use crate::adapter::EngineType;
use crate::domain::config_types::EngineBaseUrl;
use crate::gateway::headers::{is_hop_by_hop, AUTHORIZATION, HOST};
use crate::gateway::types::{BodyLimitExceeded, GatewayError, GatewayResult};
use axum::body::Body;
use http::{HeaderMap, Method, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends requests to the engine, translating transport failures into
/// gateway errors
///
/// The timeout covers the wait for response headers only; streamed bodies
/// are relayed for as long as the engine keeps producing them.
#[derive(Clone)]
pub struct UpstreamClient {
    engine: EngineType,
    base_url: String,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl UpstreamClient {
    pub fn new(engine: EngineType, base_url: &EngineBaseUrl, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build_http();

        Self {
            engine,
            base_url: base_url.without_trailing_slash().to_string(),
            timeout,
            client,
        }
    }

    pub fn engine(&self) -> EngineType {
        self.engine
    }

    /// Forward `request` to `path` on the engine, keeping method, query,
    /// body and end-to-end headers
    pub async fn forward(
        &self,
        request: Request<Body>,
        path: &str,
    ) -> GatewayResult<Response<Body>> {
        let (parts, body) = request.into_parts();
        let uri = self.target_uri(path, parts.uri.query())?;
        self.send(parts.method, uri, &parts.headers, body).await
    }

    fn target_uri(&self, path: &str, query: Option<&str>) -> GatewayResult<Uri> {
        let target = match query {
            Some(query) => format!("{}{path}?{query}", self.base_url),
            None => format!("{}{path}", self.base_url),
        };
        target
            .parse()
            .map_err(|e| GatewayError::Internal(format!("Invalid upstream URI {target}: {e}")))
    }

    async fn send(
        &self,
        method: Method,
        uri: Uri,
        headers: &HeaderMap,
        body: Body,
    ) -> GatewayResult<Response<Body>> {
        let mut outgoing = Request::builder().method(method).uri(uri.clone());
        if let Some(outgoing_headers) = outgoing.headers_mut() {
            for (name, value) in headers {
                // The caller's credential is for the gateway, not the engine
                if name == AUTHORIZATION || name == HOST || is_hop_by_hop(name) {
                    continue;
                }
                outgoing_headers.append(name.clone(), value.clone());
            }
        }
        let outgoing = outgoing
            .body(body)
            .map_err(|e| GatewayError::Internal(format!("Failed to build upstream request: {e}")))?;

        debug!(engine = %self.engine, uri = %uri, "Forwarding to upstream");

        let response = tokio::time::timeout(self.timeout, self.client.request(outgoing))
            .await
            .map_err(|_| {
                warn!(
                    engine = %self.engine,
                    uri = %uri,
                    timeout = ?self.timeout,
                    "Upstream timed out"
                );
                GatewayError::UpstreamTimeout(self.timeout)
            })?
            .map_err(|e| {
                if let Some(exceeded) = body_limit_exceeded(&e) {
                    return GatewayError::RequestTooLarge {
                        limit: exceeded.limit,
                    };
                }
                warn!(engine = %self.engine, uri = %uri, error = %e, "Upstream request failed");
                GatewayError::UpstreamUnavailable {
                    engine: self.engine,
                }
            })?;

        let (mut parts, body) = response.into_parts();
        let hop_by_hop: Vec<_> = parts
            .headers
            .keys()
            .filter(|name| is_hop_by_hop(name))
            .cloned()
            .collect();
        for name in hop_by_hop {
            parts.headers.remove(name);
        }

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// The request body's own limit error, if that is what aborted the send
fn body_limit_exceeded(error: &(dyn StdError + 'static)) -> Option<BodyLimitExceeded> {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(exceeded) = error.downcast_ref::<BodyLimitExceeded>() {
            return Some(*exceeded);
        }
        current = error.source();
    }
    None
}
