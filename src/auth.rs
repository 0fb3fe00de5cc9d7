//! Bearer-credential authentication
//!
//! Keys are validated by the key store. Successful validations are cached by
//! key digest for a short TTL; failures are never cached, so a key that is
//! registered after a rejected attempt works on the very next request.

use crate::domain::{ApiKey, KeyDigest};
use crate::gateway::headers::{AUTHORIZATION, BEARER_PREFIX};
use crate::gateway::types::GatewayError;
use crate::infrastructure::ApiKeyStore;
use http::HeaderMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, warn};

/// Extract the bearer token, if the header is well formed and non-empty
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub struct Authenticator {
    store: Arc<dyn ApiKeyStore>,
    ttl: Duration,
    cache: Mutex<HashMap<KeyDigest, Instant>>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn ApiKeyStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the caller's credential or explain why it was refused
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<ApiKey, GatewayError> {
        let Some(token) = bearer_token(headers) else {
            warn!(
                target: "security",
                reason = "missing_api_key",
                "Rejected request without credentials"
            );
            return Err(GatewayError::MissingApiKey);
        };

        let Ok(key) = ApiKey::try_new(token.to_string()) else {
            warn!(
                target: "security",
                reason = "malformed_api_key",
                "Rejected malformed credential"
            );
            return Err(GatewayError::InvalidApiKey);
        };

        let digest = key.digest();
        if self.is_cached(&digest) {
            return Ok(key);
        }

        match self.store.validate_api_key(&key).await {
            Ok(true) => {
                self.cache.lock().insert(digest, Instant::now() + self.ttl);
                Ok(key)
            }
            Ok(false) => {
                warn!(
                    target: "security",
                    reason = "invalid_api_key",
                    key = digest.short(),
                    "Rejected unknown or inactive credential"
                );
                Err(GatewayError::InvalidApiKey)
            }
            Err(e) => {
                error!(error = %e, "API key validation failed");
                Err(GatewayError::Internal(format!("Key store error: {e}")))
            }
        }
    }

    fn is_cached(&self, digest: &KeyDigest) -> bool {
        let mut cache = self.cache.lock();
        match cache.get(digest) {
            Some(expires_at) if *expires_at > Instant::now() => true,
            Some(_) => {
                cache.remove(digest);
                false
            }
            None => false,
        }
    }
}
