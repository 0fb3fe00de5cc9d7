//! Certificate pair storage and self-signed generation

use super::{sanitize_identity, server::server_config, TlsError};
use crate::domain::config_types::Port;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const CERTIFICATE_DIR: &str = "certificates";

const SUBJECT_ALT_NAMES: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Paths of a PEM certificate and its private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePair {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Return a usable pair for `identity`, generating one if needed
    async fn ensure_certificate(
        &self,
        identity: &str,
        port: Port,
    ) -> Result<CertificatePair, TlsError>;
}

/// Keeps `<data_dir>/certificates/<identity>.{crt,key}`, generating a
/// self-signed pair when none is usable
pub struct SelfSignedCertificateStore {
    dir: PathBuf,
}

impl SelfSignedCertificateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(CERTIFICATE_DIR),
        }
    }

    pub fn pair_for(&self, stem: &str) -> CertificatePair {
        CertificatePair {
            cert_path: self.dir.join(format!("{stem}.crt")),
            key_path: self.dir.join(format!("{stem}.key")),
        }
    }

    async fn generate(&self, pair: &CertificatePair) -> Result<(), TlsError> {
        let names: Vec<String> = SUBJECT_ALT_NAMES
            .iter()
            .map(|name| name.to_string())
            .collect();
        let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TlsError::io(&self.dir, e))?;
        write_pem(&pair.cert_path, &cert.pem(), false).await?;
        write_pem(&pair.key_path, &key_pair.serialize_pem(), true).await?;
        Ok(())
    }
}

#[async_trait]
impl CertificateStore for SelfSignedCertificateStore {
    async fn ensure_certificate(
        &self,
        identity: &str,
        port: Port,
    ) -> Result<CertificatePair, TlsError> {
        let stem = sanitize_identity(identity)?;
        let pair = self.pair_for(&stem);

        if pair.cert_path.exists() && pair.key_path.exists() {
            match server_config(&pair) {
                Ok(_) => return Ok(pair),
                Err(e) => warn!(
                    identity = %stem,
                    error = %e,
                    "Stored certificate pair is unusable; regenerating"
                ),
            }
        }

        self.generate(&pair).await?;
        // A pair that cannot be loaded right after generation is fatal
        server_config(&pair)?;

        info!(
            identity = %stem,
            port = %port,
            cert = %pair.cert_path.display(),
            "Generated self-signed certificate"
        );
        Ok(pair)
    }
}

async fn write_pem(path: &Path, pem: &str, private: bool) -> Result<(), TlsError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        owner_only(&mut options);
    }

    let mut file = options.open(path).await.map_err(|e| TlsError::io(path, e))?;
    file.write_all(pem.as_bytes())
        .await
        .map_err(|e| TlsError::io(path, e))?;
    file.flush().await.map_err(|e| TlsError::io(path, e))
}

#[cfg(unix)]
fn owner_only(options: &mut tokio::fs::OpenOptions) {
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only(_options: &mut tokio::fs::OpenOptions) {}
