pub mod admin;
pub mod api_keys;
pub mod auth;
pub mod health;
pub mod projects;
pub mod stream;
pub mod topics;
pub mod usage;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common_http_errors::ApiError;

use crate::models::AuthenticatedPrincipal;
use crate::resolver::{self, Credential, ResolveError};
use crate::state::AppState;

/// Extracts an `AuthenticatedPrincipal` from the `Authorization` header,
/// trying bearer first and falling back to API-key resolution. Any handler
/// that takes this as an argument gets 401 for free on missing/invalid
/// credentials.
pub struct Principal(pub AuthenticatedPrincipal);

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated { trace_id: None })?;

        let credential = resolver::parse_authorization(header_value)
            .ok_or(ApiError::Unauthenticated { trace_id: None })?;

        let principal = match credential {
            Credential::Bearer(token) => resolver::resolve_bearer(&state.db, &state.token_codec, token).await,
            Credential::ApiKey(secret) => resolver::resolve_api_key(&state.db, secret).await,
        };

        principal.map(Principal).map_err(map_resolve_error)
    }
}

pub fn map_resolve_error(e: ResolveError) -> ApiError {
    match e {
        ResolveError::Malformed | ResolveError::Invalid | ResolveError::InactiveTenant => {
            ApiError::Unauthenticated { trace_id: None }
        }
        ResolveError::Database(err) => ApiError::internal(err, None),
    }
}
