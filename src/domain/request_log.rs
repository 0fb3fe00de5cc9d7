//! Request log entries written once per proxied call

use crate::domain::identifiers::ApiId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status recorded when the caller went away before a response was produced
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// An immutable record of one completed or aborted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: Uuid,
    pub api_id: ApiId,
    pub method: String,
    pub path: String,
    /// Redacted and size-capped copy of the request body, when capture is on
    pub request_body: Option<String>,
    pub status: u16,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
