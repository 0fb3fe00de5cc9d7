//! Adapter for Ollama's native API
//!
//! Chat requests go to `/api/chat` as-is. `/v1/models` is served from
//! `/api/tags` and reshaped into an OpenAI model list. The management routes
//! (`/api/pull`, `/api/delete`, `/api/tags`, `/api/show`) pass through.

use crate::adapter::models::{ModelList, OllamaTags};
use crate::adapter::{EngineAdapter, EngineType, Operation, UpstreamClient};
use crate::gateway::headers::{paths, CONTENT_LENGTH, CONTENT_TYPE};
use crate::gateway::types::{GatewayError, GatewayResult};
use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderValue, Request, Response};
use http_body_util::BodyExt;
use tracing::warn;

/// Ollama's native dialect
///
/// Chat bodies are forwarded verbatim to `/api/chat`; the model list is
/// rebuilt from `/api/tags` in the OpenAI shape.
pub struct OllamaAdapter {
    upstream: UpstreamClient,
}

impl OllamaAdapter {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    async fn list_models(&self, request: Request<Body>) -> GatewayResult<Response<Body>> {
        let response = self.upstream.forward(request, paths::OLLAMA_TAGS).await?;
        if !response.status().is_success() {
            return Ok(response);
        }

        let (mut parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to read model list from Ollama");
                GatewayError::UpstreamUnavailable {
                    engine: self.engine(),
                }
            })?
            .to_bytes();

        let tags: OllamaTags = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(error = %e, "Ollama returned an unparseable model list");
            GatewayError::UpstreamInvalidResponse(e.to_string())
        })?;

        let list = serde_json::to_vec(&ModelList::from(tags))
            .map_err(|e| GatewayError::Internal(format!("Failed to encode model list: {e}")))?;

        parts.headers.remove(CONTENT_LENGTH);
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Response::from_parts(parts, Body::from(list)))
    }
}

#[async_trait]
impl EngineAdapter for OllamaAdapter {
    fn engine(&self) -> EngineType {
        self.upstream.engine()
    }

    fn supports_management(&self) -> bool {
        true
    }

    async fn forward(
        &self,
        operation: Operation,
        request: Request<Body>,
    ) -> GatewayResult<Response<Body>> {
        match operation {
            Operation::ChatCompletions => self.upstream.forward(request, paths::OLLAMA_CHAT).await,
            Operation::ListModels => self.list_models(request).await,
            Operation::Management => {
                let path = request.uri().path().to_string();
                self.upstream.forward(request, &path).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config_types::EngineBaseUrl;
    use serde_json::json;
    use std::time::Duration;

    fn adapter(url: &str) -> OllamaAdapter {
        OllamaAdapter::new(UpstreamClient::new(
            EngineType::Ollama,
            &EngineBaseUrl::try_new(url.to_string()).unwrap(),
            Duration::from_secs(5),
        ))
    }

    async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_is_forwarded_to_native_endpoint_unchanged() {
        let mut server = mockito::Server::new_async().await;
        let request_body = r#"{"model":"llama3","messages":[{"role":"user","content":"hi"}]}"#;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(request_body)
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant","content":"hello"},"done":true}"#)
            .create_async()
            .await;

        let response = adapter(&server.url())
            .forward(
                Operation::ChatCompletions,
                Request::post("/v1/chat/completions")
                    .body(Body::from(request_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_model_list_is_rewritten() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(
                json!({"models": [
                    {"name": "llama3:8b", "modified_at": "2024-05-01T17:20:30Z"},
                    {"model": "phi3"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let response = adapter(&server.url())
            .forward(
                Operation::ListModels,
                Request::get("/v1/models").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            json_body(response).await,
            json!({
                "object": "list",
                "data": [
                    {"id": "llama3:8b", "object": "model", "created": 1714584030, "owned_by": "local"},
                    {"id": "phi3", "object": "model", "created": 0, "owned_by": "local"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_model_list_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let error = adapter(&server.url())
            .forward(
                Operation::ListModels,
                Request::get("/v1/models").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, GatewayError::UpstreamInvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_failed_model_list_is_relayed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(500)
            .with_body(r#"{"error":"boom"}"#)
            .create_async()
            .await;

        let response = adapter(&server.url())
            .forward(
                Operation::ListModels,
                Request::get("/v1/models").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn test_management_keeps_method_and_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/delete")
            .with_status(200)
            .create_async()
            .await;

        adapter(&server.url())
            .forward(
                Operation::Management,
                Request::delete("/api/delete")
                    .body(Body::from(r#"{"name":"phi3"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
