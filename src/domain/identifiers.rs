//! Identifiers and credentials
//!
//! The gateway serves exactly one local API identity; callers present bearer
//! credentials that are only ever compared through their SHA-256 digest.

use nutype::nutype;
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of the local API fronted by this gateway
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct ApiId(String);

/// Bearer credential presented by a caller
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 512),
    derive(Clone, PartialEq, Eq, Hash, Deserialize, AsRef)
)]
pub struct ApiKey(String);

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(***)")
    }
}

impl ApiKey {
    /// Hex-encoded SHA-256 of the credential
    pub fn digest(&self) -> KeyDigest {
        KeyDigest::new(hex::encode(Sha256::digest(self.as_ref().as_bytes())))
    }
}

/// Hex SHA-256 digest of an [`ApiKey`]; the only form in which keys are stored or cached
#[nutype(derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRef,
    Display
))]
pub struct KeyDigest(String);

impl KeyDigest {
    /// Short prefix suitable for use as a rate-limit caller key or in log lines
    pub fn short(&self) -> &str {
        let digest = self.as_ref();
        &digest[..digest.len().min(16)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_id_is_trimmed_and_non_empty() {
        let id = ApiId::try_new("  local-llama  ".to_string()).unwrap();
        assert_eq!(id.as_ref(), "local-llama");
        assert!(ApiId::try_new("   ".to_string()).is_err());
        assert!(ApiId::try_new("x".repeat(129)).is_err());
    }

    #[test]
    fn test_api_key_debug_is_masked() {
        let key = ApiKey::try_new("sk-secret".to_string()).unwrap();
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }

    #[test]
    fn test_digest_is_stable_sha256_hex() {
        let key = ApiKey::try_new("abc".to_string()).unwrap();
        assert_eq!(
            key.digest().as_ref(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(key.digest().short(), "ba7816bf8f01cfea");
    }
}
