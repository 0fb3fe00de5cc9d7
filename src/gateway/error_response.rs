//! OpenAI-style error envelopes
//!
//! Every error the gateway itself produces has the shape
//! `{"error": {"message", "type", "code"}}` so that OpenAI client libraries
//! surface it sensibly.

use crate::gateway::types::GatewayError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Message used for every internal failure; details stay in the logs
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.into(),
                code: code.into(),
            },
        }
    }

    pub fn internal() -> Self {
        Self::new(INTERNAL_ERROR_MESSAGE, "internal_error", "server_error")
    }

    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    fn to_error_response(&self) -> ErrorResponse;

    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for GatewayError {
    fn to_error_response(&self) -> ErrorResponse {
        use GatewayError::*;

        match self {
            MissingApiKey => ErrorResponse::new(
                "Missing API key. Provide it as 'Authorization: Bearer <key>'",
                "authentication_error",
                "missing_api_key",
            ),
            InvalidApiKey => {
                ErrorResponse::new("Invalid API key", "authentication_error", "invalid_api_key")
            }
            RateLimited { retry_after_secs } => ErrorResponse::new(
                format!("Rate limit exceeded. Retry after {retry_after_secs} seconds"),
                "rate_limit_error",
                "rate_limit_exceeded",
            ),
            UpstreamUnavailable { engine } => ErrorResponse::new(
                format!("Could not connect to {engine}; ensure it is running"),
                "upstream_error",
                "upstream_unavailable",
            ),
            UpstreamTimeout(duration) => ErrorResponse::new(
                format!(
                    "Inference engine did not respond within {}s",
                    duration.as_secs()
                ),
                "upstream_error",
                "upstream_timeout",
            ),
            UpstreamInvalidResponse(_) => ErrorResponse::new(
                "Inference engine returned an invalid response",
                "upstream_error",
                "upstream_invalid_response",
            ),
            RequestTooLarge { limit } => ErrorResponse::new(
                format!("Request body exceeds the {limit} byte limit"),
                "invalid_request_error",
                "request_too_large",
            ),
            NotFound => ErrorResponse::new("Not found", "invalid_request_error", "not_found"),
            Internal(_) => ErrorResponse::internal(),
        }
    }

    fn status_code(&self) -> StatusCode {
        use GatewayError::*;

        match self {
            MissingApiKey | InvalidApiKey => StatusCode::UNAUTHORIZED,
            RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            UpstreamUnavailable { .. } | UpstreamInvalidResponse(_) => StatusCode::BAD_GATEWAY,
            UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            NotFound => StatusCode::NOT_FOUND,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = self
            .to_error_response()
            .into_response_with_status(self.status_code());

        if let GatewayError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        // Lets the request log record why the gateway refused the request
        response.extensions_mut().insert(self);
        response
    }
}
