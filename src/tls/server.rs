//! HTTPS configuration and the plaintext redirect listener

use super::{CertificatePair, TlsError};
use crate::domain::config_types::{Host, Port};
use axum::{
    extract::State,
    http::{uri::Authority, HeaderMap, Uri},
    response::Redirect,
    Router,
};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::sync::Arc;

/// Load a certificate pair into a rustls server configuration
pub fn server_config(pair: &CertificatePair) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = CertificateDer::pem_file_iter(&pair.cert_path)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|e| {
            TlsError::InvalidPair(format!("{}: {e}", pair.cert_path.display()))
        })?;
    if certs.is_empty() {
        return Err(TlsError::InvalidPair(format!(
            "{}: no certificate found",
            pair.cert_path.display()
        )));
    }

    let key = PrivateKeyDer::from_pem_file(&pair.key_path)
        .map_err(|e| TlsError::InvalidPair(format!("{}: {e}", pair.key_path.display())))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

#[derive(Clone)]
struct RedirectTarget {
    fallback_host: Host,
    https_port: Port,
}

/// Router for the plaintext listener: every path answers with a permanent
/// redirect to the same path on the HTTPS port
pub fn redirect_router(fallback_host: Host, https_port: Port) -> Router {
    Router::new()
        .fallback(redirect_to_https)
        .with_state(RedirectTarget {
            fallback_host,
            https_port,
        })
}

async fn redirect_to_https(
    State(target): State<RedirectTarget>,
    headers: HeaderMap,
    uri: Uri,
) -> Redirect {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Authority>().ok())
        .map(|authority| authority.host().to_string())
        .unwrap_or_else(|| target.fallback_host.to_string());
    let path = uri.path_and_query().map_or("/", |path| path.as_str());

    Redirect::permanent(&format!("https://{host}:{}{path}", target.https_port))
}
