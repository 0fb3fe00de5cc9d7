//! Inference Gateway - an authenticated, TLS-terminating front door for a
//! locally-run inference engine
//!
//! Callers speak the OpenAI-compatible API; the gateway rate-limits and
//! authenticates them, translates to the configured engine's dialect, logs
//! every call with sensitive fields redacted, and aggregates performance
//! metrics into threshold alerts.

pub mod adapter;
pub mod application;
pub mod auth;
pub mod background;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod infrastructure;
pub mod metrics;
pub mod rate_limit;
pub mod telemetry;
pub mod tls;

pub use application::Application;
pub use error::{Error, Result};
