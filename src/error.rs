use crate::infrastructure::StorageError;
use crate::tls::TlsError;
use std::net::SocketAddr;
use thiserror::Error;

/// Gateway startup and lifecycle errors
///
/// Per-request failures never surface here; they are rendered as
/// [`crate::gateway::GatewayError`] responses instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("Address {addr} is already in use")]
    AddressInUse { addr: SocketAddr },

    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_setting(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }

    /// Map a bind failure, singling out the port-already-taken case
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AddrInUse {
            Self::AddressInUse { addr }
        } else {
            Self::Listen { addr, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
