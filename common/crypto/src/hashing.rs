//! Credential hashing: one slow adaptive verifier shared by tenant passwords
//! and API key secrets, plus a fast deterministic digest used only to index
//! API keys for O(1) lookup.

use sha2::{Digest, Sha256};
use thiserror::Error;

const BCRYPT_COST: u32 = 12;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("bcrypt hashing failed: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

/// Reduce a plaintext secret to its SHA-256 digest so it always fits under
/// bcrypt's 72-byte input ceiling, regardless of the caller's password length.
fn prehash(plaintext: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().into()
}

/// Hash a plaintext secret (tenant password or API key) with bcrypt over its
/// SHA-256 pre-digest. Returns a self-describing ASCII string for storage.
pub fn hash_secret(plaintext: &str) -> Result<String, HashError> {
    let digest = prehash(plaintext);
    Ok(bcrypt::hash(digest, BCRYPT_COST)?)
}

/// Verify a plaintext secret against a previously stored hash.
pub fn verify_secret(plaintext: &str, stored_hash: &str) -> Result<bool, HashError> {
    let digest = prehash(plaintext);
    Ok(bcrypt::verify(digest, stored_hash)?)
}

/// SHA-256 hex digest of the plaintext, used as the fast O(1) API key lookup key.
pub fn lookup_digest(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_hash_and_verify() {
        let hash = hash_secret("correct horse battery staple").unwrap();
        assert!(verify_secret("correct horse battery staple", &hash).unwrap());
        assert!(!verify_secret("wrong password", &hash).unwrap());
    }

    #[test]
    fn long_password_is_accepted() {
        let long = "p".repeat(200);
        let hash = hash_secret(&long).unwrap();
        assert!(verify_secret(&long, &hash).unwrap());
    }

    #[test]
    fn lookup_digest_is_deterministic_and_keyable() {
        let a = lookup_digest("my-api-key-secret");
        let b = lookup_digest("my-api-key-secret");
        let c = lookup_digest("a-different-secret");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
