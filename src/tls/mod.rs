//! TLS bootstrap
//!
//! The gateway never serves proxied traffic over plaintext: a certificate
//! pair must exist (or be generated) before any listener is bound.

pub mod certificates;
pub mod server;

pub use certificates::{CertificatePair, CertificateStore, SelfSignedCertificateStore};
pub use server::{redirect_router, server_config};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Identity {0:?} cannot name a certificate")]
    InvalidIdentity(String),

    #[error("Certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    #[error("Certificate file {path} is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Certificate pair is unusable: {0}")]
    InvalidPair(String),

    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

impl TlsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// File stem for an identity's certificate pair
///
/// Anything outside `[A-Za-z0-9_-]` becomes `_`, so the stem can never
/// escape the certificate directory.
pub fn sanitize_identity(identity: &str) -> Result<String, TlsError> {
    let identity = identity.trim();
    if identity.is_empty() {
        return Err(TlsError::InvalidIdentity(identity.to_string()));
    }
    Ok(identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect())
}
