use axum::extract::{Path, State};
use axum::Json;
use common_crypto::hashing;
use common_http_errors::{ApiError, ApiResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::Principal;
use crate::models::{ApiKeyRow, ApiKeyView};
use crate::state::AppState;

/// 43 random alphanumeric characters, comparable in entropy to a
/// base64url-encoded 32-byte secret.
fn generate_secret() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(43).map(char::from).collect()
}

pub async fn list(State(state): State<AppState>, Principal(principal): Principal) -> ApiResult<Json<Vec<ApiKeyView>>> {
    let rows = sqlx::query_as::<_, ApiKeyRow>(
        "SELECT id, tenant_id, project_id, name, secret_hash, lookup_digest, created_at, last_used_at \
         FROM api_keys WHERE tenant_id = $1 ORDER BY created_at",
    )
    .bind(principal.tenant.id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    Ok(Json(rows.iter().map(ApiKeyView::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub project_id: Uuid,
}

#[derive(Serialize)]
pub struct CreateApiKeyResponse {
    #[serde(flatten)]
    pub key: ApiKeyView,
    pub secret: String,
}

/// Create an API key scoped to one of the tenant's own projects. The secret
/// is returned once, in plaintext; only its hash and lookup digest persist.
pub async fn create(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Json(req): Json<CreateApiKeyRequest>,
) -> ApiResult<Json<CreateApiKeyResponse>> {
    let owns_project: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE id = $1 AND tenant_id = $2")
        .bind(req.project_id)
        .bind(principal.tenant.id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    if owns_project.is_none() {
        return Err(ApiError::not_found("project_not_found", None));
    }

    let secret = generate_secret();
    let secret_hash = hashing::hash_secret(&secret).map_err(|e| ApiError::internal(e, None))?;
    let lookup_digest = hashing::lookup_digest(&secret);

    let row = sqlx::query_as::<_, ApiKeyRow>(
        "INSERT INTO api_keys (id, tenant_id, project_id, name, secret_hash, lookup_digest, created_at) \
         VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now()) \
         RETURNING id, tenant_id, project_id, name, secret_hash, lookup_digest, created_at, last_used_at",
    )
    .bind(principal.tenant.id)
    .bind(req.project_id)
    .bind(&req.name)
    .bind(&secret_hash)
    .bind(&lookup_digest)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    Ok(Json(CreateApiKeyResponse { key: ApiKeyView::from(&row), secret }))
}

#[derive(Serialize)]
pub struct DeleteApiKeyResponse {
    pub message: String,
}

pub async fn delete(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteApiKeyResponse>> {
    let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(principal.tenant.id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("api_key_not_found", None));
    }

    Ok(Json(DeleteApiKeyResponse { message: "api key revoked".to_string() }))
}
