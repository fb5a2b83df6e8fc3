//! Dual-mode authentication: bearer JWT first, then opaque API key. API-key
//! resolution prefers the O(1) lookup-digest index and falls back to an
//! O(n) scan over keys still missing one, backfilling the digest on a hit
//! so the slow path is self-healing.

use common_crypto::hashing;
use common_crypto::token::TokenCodec;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ApiKeyRow, AuthenticatedPrincipal, Tenant};

#[derive(Debug)]
pub enum ResolveError {
    Malformed,
    Invalid,
    InactiveTenant,
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ResolveError {
    fn from(e: sqlx::Error) -> Self {
        ResolveError::Database(e)
    }
}

pub enum Credential<'a> {
    Bearer(&'a str),
    ApiKey(&'a str),
}

/// Parse an `Authorization` header value into a credential. API keys are
/// presented the same way, just without the JWT's three-dot structure, so
/// this only needs to strip the `Bearer ` prefix; callers decide which
/// resolution path to try from the header scheme they were actually given.
pub fn parse_authorization(header_value: &str) -> Option<Credential<'_>> {
    let value = header_value.trim();
    if let Some(token) = value.strip_prefix("Bearer ") {
        Some(Credential::Bearer(token.trim()))
    } else if let Some(key) = value.strip_prefix("ApiKey ") {
        Some(Credential::ApiKey(key.trim()))
    } else {
        None
    }
}

pub async fn resolve_bearer(
    pool: &PgPool,
    codec: &TokenCodec,
    token: &str,
) -> Result<AuthenticatedPrincipal, ResolveError> {
    let subject = codec.verify(token).map_err(|_| ResolveError::Invalid)?;
    let tenant_id: Uuid = subject.parse().map_err(|_| ResolveError::Malformed)?;

    let tenant = sqlx::query_as::<_, Tenant>(
        "SELECT id, email, password_hash, created_at, is_active FROM tenants WHERE id = $1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ResolveError::Invalid)?;

    if !tenant.is_active {
        return Err(ResolveError::InactiveTenant);
    }

    Ok(AuthenticatedPrincipal { tenant, project_id: None })
}

/// Resolve an API key's plaintext secret to a principal. First consults the
/// lookup-digest index; any row still missing a digest (pre-existing legacy
/// keys) is checked by a linear bcrypt scan instead, and on a match its
/// digest is backfilled so future lookups hit the fast path.
pub async fn resolve_api_key(
    pool: &PgPool,
    secret: &str,
) -> Result<AuthenticatedPrincipal, ResolveError> {
    let digest = hashing::lookup_digest(secret);

    let indexed = sqlx::query_as::<_, ApiKeyRow>(
        "SELECT id, tenant_id, project_id, name, secret_hash, lookup_digest, created_at, last_used_at
         FROM api_keys WHERE lookup_digest = $1",
    )
    .bind(&digest)
    .fetch_optional(pool)
    .await?;

    let key_row = match indexed {
        Some(row) => {
            if !hashing::verify_secret(secret, &row.secret_hash).unwrap_or(false) {
                return Err(ResolveError::Invalid);
            }
            row
        }
        None => {
            let legacy_candidates = sqlx::query_as::<_, ApiKeyRow>(
                "SELECT id, tenant_id, project_id, name, secret_hash, lookup_digest, created_at, last_used_at
                 FROM api_keys WHERE lookup_digest IS NULL",
            )
            .fetch_all(pool)
            .await?;

            let mut matched = None;
            for candidate in legacy_candidates {
                if hashing::verify_secret(secret, &candidate.secret_hash).unwrap_or(false) {
                    matched = Some(candidate);
                    break;
                }
            }
            let row = matched.ok_or(ResolveError::Invalid)?;

            sqlx::query("UPDATE api_keys SET lookup_digest = $1 WHERE id = $2")
                .bind(&digest)
                .bind(row.id)
                .execute(pool)
                .await?;
            row
        }
    };

    let tenant = sqlx::query_as::<_, Tenant>(
        "SELECT id, email, password_hash, created_at, is_active FROM tenants WHERE id = $1",
    )
    .bind(key_row.tenant_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ResolveError::Invalid)?;

    if !tenant.is_active {
        return Err(ResolveError::InactiveTenant);
    }

    sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
        .bind(key_row.id)
        .execute(pool)
        .await?;

    Ok(AuthenticatedPrincipal { tenant, project_id: Some(key_row.project_id) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_scheme() {
        match parse_authorization("Bearer abc.def.ghi") {
            Some(Credential::Bearer(t)) => assert_eq!(t, "abc.def.ghi"),
            _ => panic!("expected bearer credential"),
        }
    }

    #[test]
    fn parses_api_key_scheme() {
        match parse_authorization("ApiKey secret123") {
            Some(Credential::ApiKey(k)) => assert_eq!(k, "secret123"),
            _ => panic!("expected api key credential"),
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_authorization("Basic dXNlcjpwYXNz").is_none());
    }
}
