//! Request-path error type

use crate::adapter::EngineType;
use std::time::Duration;
use thiserror::Error;

/// Everything that can end a proxied request early
///
/// Each variant maps to one OpenAI-style error envelope; transport details
/// are logged where the error is raised and never reach the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Could not connect to {engine}")]
    UpstreamUnavailable { engine: EngineType },

    #[error("Upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Upstream returned an invalid response: {0}")]
    UpstreamInvalidResponse(String),

    #[error("Request body exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Raised by a streamed request body that outgrows the size limit
///
/// Travels inside the upstream client's error chain so the failure can be
/// reported as [`GatewayError::RequestTooLarge`] rather than an engine outage.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Request body exceeds {limit} bytes")]
pub struct BodyLimitExceeded {
    pub limit: usize,
}
