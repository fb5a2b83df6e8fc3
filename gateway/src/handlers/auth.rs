use axum::extract::State;
use axum::Json;
use common_crypto::hashing;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker;
use crate::handlers::Principal;
use crate::models::{Project, Tenant, TenantView};
use crate::naming::random_display_name;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: TenantView,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create a tenant, its default project, and a best-effort broker topic,
/// then mint a bearer token for it.
pub async fn signup(State(state): State<AppState>, Json(req): Json<SignupRequest>) -> ApiResult<Json<AuthResponse>> {
    if req.password.is_empty() {
        return Err(ApiError::bad_request("invalid_password", None));
    }
    let email = normalize_email(&req.email);
    let password_hash = hashing::hash_secret(&req.password).map_err(|e| ApiError::internal(e, None))?;

    let mut tx = state.db.begin().await.map_err(|e| ApiError::internal(e, None))?;

    let tenant = sqlx::query_as::<_, Tenant>(
        "INSERT INTO tenants (id, email, password_hash, created_at, is_active) \
         VALUES (gen_random_uuid(), $1, $2, now(), true) RETURNING id, email, password_hash, created_at, is_active",
    )
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return ApiError::bad_request("email_already_registered", None);
            }
        }
        ApiError::internal(e, None)
    })?;

    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (id, tenant_id, name, created_at, is_default) \
         VALUES (gen_random_uuid(), $1, $2, now(), true) RETURNING id, tenant_id, name, created_at, is_default",
    )
    .bind(tenant.id)
    .bind(random_display_name())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    let broker_topic_name = broker::user_topic_name(&tenant.id.to_string());
    if let Err(e) = state.broker.create_topic(&broker_topic_name).await {
        warn!(error = %e, topic = %broker_topic_name, "best-effort topic creation failed during signup");
    }

    sqlx::query(
        "INSERT INTO topics (id, project_id, name, broker_topic_name, created_at) \
         VALUES (gen_random_uuid(), $1, $2, $3, now())",
    )
    .bind(project.id)
    .bind(random_display_name())
    .bind(&broker_topic_name)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, None))?;

    let token = state.token_codec.mint(&tenant.id.to_string()).map_err(|e| ApiError::internal(e, None))?;
    info!(tenant_id = %tenant.id, event = "signup", "tenant signed up");

    Ok(Json(AuthResponse { token, user: TenantView::from(&tenant) }))
}

/// Verify credentials and mint a token. Invalid email and invalid password
/// both surface as the same 401 to avoid leaking which one was wrong.
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> ApiResult<Json<AuthResponse>> {
    let email = normalize_email(&req.email);

    let tenant = sqlx::query_as::<_, Tenant>(
        "SELECT id, email, password_hash, created_at, is_active FROM tenants WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    let tenant = match tenant {
        Some(t) if t.is_active => t,
        _ => return Err(ApiError::Unauthenticated { trace_id: None }),
    };

    let verified = hashing::verify_secret(&req.password, &tenant.password_hash).unwrap_or(false);
    if !verified {
        return Err(ApiError::Unauthenticated { trace_id: None });
    }

    let token = state.token_codec.mint(&tenant.id.to_string()).map_err(|e| ApiError::internal(e, None))?;
    info!(tenant_id = %tenant.id, event = "login", "tenant logged in");

    Ok(Json(AuthResponse { token, user: TenantView::from(&tenant) }))
}

pub async fn me_get(Principal(principal): Principal) -> Json<TenantView> {
    Json(TenantView::from(&principal.tenant))
}

#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct UpdateMeResponse {
    pub message: String,
    pub user: TenantView,
}

pub async fn me_patch(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Json(req): Json<UpdateMeRequest>,
) -> ApiResult<Json<UpdateMeResponse>> {
    if req.email.is_none() && req.password.is_none() {
        return Err(ApiError::bad_request("no_fields_to_update", None));
    }

    let new_email = req.email.as_deref().map(normalize_email);
    let new_password_hash = match &req.password {
        Some(p) => Some(hashing::hash_secret(p).map_err(|e| ApiError::internal(e, None))?),
        None => None,
    };

    let tenant = sqlx::query_as::<_, Tenant>(
        "UPDATE tenants SET \
            email = COALESCE($1, email), \
            password_hash = COALESCE($2, password_hash) \
         WHERE id = $3 \
         RETURNING id, email, password_hash, created_at, is_active",
    )
    .bind(new_email)
    .bind(new_password_hash)
    .bind(principal.tenant.id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return ApiError::bad_request("email_already_registered", None);
            }
        }
        ApiError::internal(e, None)
    })?;

    Ok(Json(UpdateMeResponse { message: "user updated".to_string(), user: TenantView::from(&tenant) }))
}

#[derive(Serialize)]
pub struct DeleteMeResponse {
    pub message: String,
}

/// Soft-delete: best-effort tear down this tenant's broker topics (failure
/// isolated per topic), then flip the active flag. Rows are never cascaded.
pub async fn me_delete(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> ApiResult<Json<DeleteMeResponse>> {
    let topics: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT t.id, t.broker_topic_name FROM topics t \
         JOIN projects p ON p.id = t.project_id WHERE p.tenant_id = $1",
    )
    .bind(principal.tenant.id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    if topics.is_empty() {
        info!(tenant_id = %principal.tenant.id, event = "kafka_topics_deletion_skipped", reason = "no_topics", "nothing to delete");
    } else {
        let mut deleted = 0u32;
        let mut failed = 0u32;
        for (_, topic_name) in &topics {
            match state.broker.delete_topic(topic_name).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(topic = %topic_name, error = %e, "topic deletion failed during tenant delete");
                }
            }
        }
        info!(tenant_id = %principal.tenant.id, event = "kafka_topics_deletion_completed", deleted, failed, "topic teardown finished");
    }

    sqlx::query("UPDATE tenants SET is_active = false WHERE id = $1")
        .bind(principal.tenant.id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    Ok(Json(DeleteMeResponse { message: "user deactivated".to_string() }))
}
