//! Symmetric bearer token codec: mint and verify HMAC-SHA-256 signed tokens
//! carrying a tenant subject and a seven-day absolute expiry.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_SECRET_LEN: usize = 32;
const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt secret must be at least {MIN_SECRET_LEN} bytes")]
    SecretTooShort,
    #[error("token is malformed or signature is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Mints and verifies bearer tokens against one symmetric signing secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: std::sync::Arc<EncodingKey>,
    decoding_key: std::sync::Arc<DecodingKey>,
}

impl TokenCodec {
    /// Construct a codec from a raw secret. Fails fast if the secret is too
    /// short to provide meaningful HMAC-SHA-256 security.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::SecretTooShort);
        }
        Ok(Self {
            encoding_key: std::sync::Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: std::sync::Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        })
    }

    /// Mint a token whose subject is the tenant id, expiring seven days from now.
    pub fn mint(&self, subject: &str) -> Result<String, TokenError> {
        let exp = chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS);
        let claims = Claims { sub: subject.to_string(), exp: exp.timestamp() };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|_| TokenError::Invalid)
    }

    /// Verify a token's signature and expiry, returning its subject on success.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&"0".repeat(32)).unwrap()
    }

    #[test]
    fn secret_too_short_is_rejected() {
        assert!(matches!(TokenCodec::new("short"), Err(TokenError::SecretTooShort)));
    }

    #[test]
    fn mint_then_verify_round_trips_subject() {
        let codec = codec();
        let token = codec.mint("tenant-123").unwrap();
        let subject = codec.verify(&token).unwrap();
        assert_eq!(subject, "tenant-123");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let codec = codec();
        let mut token = codec.mint("tenant-123").unwrap();
        token.push('x');
        assert!(matches!(codec.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn different_secret_cannot_verify() {
        let codec_a = codec();
        let codec_b = TokenCodec::new(&"1".repeat(32)).unwrap();
        let token = codec_a.mint("tenant-123").unwrap();
        assert!(matches!(codec_b.verify(&token), Err(TokenError::Invalid)));
    }
}
