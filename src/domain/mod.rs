//! Gateway domain types
//!
//! Identities, credentials, metrics, alerts and request log entries. Values
//! are validated on construction so the rest of the crate can trust them.

pub mod alerts;
pub mod config_types;
pub mod identifiers;
pub mod metrics;
pub mod request_log;

pub use alerts::*;
pub use identifiers::*;
pub use metrics::*;
pub use request_log::*;
