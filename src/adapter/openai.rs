//! Adapter for engines that already speak the OpenAI API

use crate::adapter::{EngineAdapter, EngineType, Operation, UpstreamClient};
use crate::gateway::headers::paths;
use crate::gateway::types::{GatewayError, GatewayResult};
use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response};

/// Engines that already speak the OpenAI API; requests pass through unchanged
pub struct OpenAiCompatibleAdapter {
    upstream: UpstreamClient,
}

impl OpenAiCompatibleAdapter {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl EngineAdapter for OpenAiCompatibleAdapter {
    fn engine(&self) -> EngineType {
        self.upstream.engine()
    }

    async fn forward(
        &self,
        operation: Operation,
        request: Request<Body>,
    ) -> GatewayResult<Response<Body>> {
        match operation {
            Operation::ChatCompletions => {
                self.upstream.forward(request, paths::CHAT_COMPLETIONS).await
            }
            Operation::ListModels => self.upstream.forward(request, paths::MODELS).await,
            Operation::Management => Err(GatewayError::NotFound),
        }
    }
}
