//! HTTP header and path constants for the gateway

use ::http::header::{self, HeaderName};

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Authorization header prefix for bearer tokens
pub const BEARER_PREFIX: &str = "Bearer ";

pub use header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST};

/// Hop-by-hop headers must not be forwarded between connections
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
}

/// Security headers attached to every response
pub const SECURITY_HEADERS: [(&str, &str); 8] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("cross-origin-embedder-policy", "require-corp"),
    (
        "permissions-policy",
        "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), payment=(), usb=()",
    ),
];

/// Well-known paths
pub mod paths {
    pub const HEALTH: &str = "/health";
    pub const CHAT_COMPLETIONS: &str = "/v1/chat/completions";
    pub const MODELS: &str = "/v1/models";

    /// Ollama management passthrough
    pub const OLLAMA_PULL: &str = "/api/pull";
    pub const OLLAMA_DELETE: &str = "/api/delete";
    pub const OLLAMA_TAGS: &str = "/api/tags";
    pub const OLLAMA_SHOW: &str = "/api/show";
    pub const OLLAMA_CHAT: &str = "/api/chat";
}
