//! Protocol adapters for the supported inference engines
//!
//! The gateway exposes one OpenAI-compatible surface. Engines speak one of
//! two dialects: Ollama's native API, or the OpenAI API that vLLM, LM Studio,
//! llama.cpp and LocalAI all implement. The dialect is chosen once at startup.

pub mod models;
pub mod ollama;
pub mod openai;
pub mod upstream;

use crate::domain::config_types::EngineBaseUrl;
use crate::gateway::types::GatewayResult;
use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use ollama::OllamaAdapter;
pub use openai::OpenAiCompatibleAdapter;
pub use upstream::UpstreamClient;

/// Supported upstream engines
///
/// All of them are local model servers reached over plain HTTP. `openai`
/// selects a generic server speaking the OpenAI API, not the hosted
/// api.openai.com service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineType {
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "vllm")]
    Vllm,
    #[serde(rename = "lmstudio")]
    LmStudio,
    #[serde(rename = "llamacpp")]
    LlamaCpp,
    #[serde(rename = "localai")]
    LocalAi,
}

/// Wire shape an engine expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Ollama,
    OpenAi,
}

impl EngineType {
    pub fn dialect(&self) -> Dialect {
        match self {
            EngineType::Ollama => Dialect::Ollama,
            EngineType::OpenAi
            | EngineType::Vllm
            | EngineType::LmStudio
            | EngineType::LlamaCpp
            | EngineType::LocalAi => Dialect::OpenAi,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EngineType::Ollama => "Ollama",
            EngineType::OpenAi => "OpenAI-compatible server",
            EngineType::Vllm => "vLLM",
            EngineType::LmStudio => "LM Studio",
            EngineType::LlamaCpp => "llama.cpp",
            EngineType::LocalAi => "LocalAI",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which public operation a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ChatCompletions,
    ListModels,
    /// Engine-management passthrough, forwarded to the same path
    Management,
}

/// Translates the public surface into one engine dialect
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn engine(&self) -> EngineType;

    /// Whether the `/api/*` management routes are served
    fn supports_management(&self) -> bool {
        false
    }

    async fn forward(
        &self,
        operation: Operation,
        request: Request<Body>,
    ) -> GatewayResult<Response<Body>>;
}

/// Build the adapter for the configured engine
pub fn adapter_for(
    engine: EngineType,
    base_url: &EngineBaseUrl,
    timeout: Duration,
) -> Arc<dyn EngineAdapter> {
    let upstream = UpstreamClient::new(engine, base_url, timeout);
    match engine.dialect() {
        Dialect::Ollama => Arc::new(OllamaAdapter::new(upstream)),
        Dialect::OpenAi => Arc::new(OpenAiCompatibleAdapter::new(upstream)),
    }
}
