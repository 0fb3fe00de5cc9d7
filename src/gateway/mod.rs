//! HTTP surface of the gateway
//!
//! The proxied routes run through request logging, admission control and
//! authentication before an engine adapter forwards them upstream.
//! `/health` and unknown paths bypass that pipeline.

pub mod error_response;
pub mod headers;
pub mod middleware;
pub mod middleware_stack;
pub mod redact;
pub mod request_log;
pub mod service;
pub mod types;

pub use error_response::{ErrorResponse, ErrorResponseExt};
pub use middleware_stack::GatewayMiddlewareStack;
pub use request_log::{RequestLogConfig, RequestLogger};
pub use service::GatewayService;
pub use types::{GatewayError, GatewayResult};
