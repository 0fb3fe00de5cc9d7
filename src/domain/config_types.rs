//! Validated configuration values
//!
//! Settings deserialize straight into these types, so a bad port, URL or
//! budget is rejected when configuration loads rather than at first use.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Host address for network services
#[nutype(
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct Host(String);

/// Port number for network services
#[nutype(
    validate(predicate = |port| (1..=65535).contains(port)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct Port(u16);

impl Port {
    /// The port the HTTPS listener binds: always one above the plaintext port
    pub fn tls_companion(&self) -> Option<Port> {
        self.into_inner()
            .checked_add(1)
            .and_then(|port| Port::try_new(port).ok())
    }
}

/// Base URL of the upstream inference engine
///
/// Only plain `http://` is accepted: the engine is expected to run on the
/// same host or a trusted local network. This holds for every engine
/// selector, `openai` included.
#[nutype(
    sanitize(trim),
    validate(predicate = |s| s.starts_with("http://") && s.len() > "http://".len()),
    derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRef, Display)
)]
pub struct EngineBaseUrl(String);

impl EngineBaseUrl {
    /// The base URL without a trailing slash, ready for path concatenation
    pub fn without_trailing_slash(&self) -> &str {
        self.as_ref().trim_end_matches('/')
    }
}

/// Requests admitted per caller per window
#[nutype(
    validate(predicate = |count| *count > 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct RequestBudget(u32);

/// Sample count at which a metric buffer is flushed regardless of age
#[nutype(
    validate(predicate = |size| *size > 0 && *size <= 100_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct BufferCapacity(usize);

/// A strictly positive interval expressed in whole seconds
#[nutype(
    validate(predicate = |secs| *secs > 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct IntervalSecs(u64);

impl IntervalSecs {
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.into_inner())
    }
}

/// Upper bound on a body size in bytes
#[nutype(
    validate(predicate = |bytes| *bytes > 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct ByteLimit(usize);

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
