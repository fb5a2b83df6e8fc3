use axum::extract::{Path, State};
use axum::Json;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker;
use crate::handlers::Principal;
use crate::models::Project;
use crate::naming::random_display_name;
use crate::state::AppState;
use tracing::warn;

pub async fn list(State(state): State<AppState>, Principal(principal): Principal) -> ApiResult<Json<Vec<Project>>> {
    let projects = sqlx::query_as::<_, Project>(
        "SELECT id, tenant_id, name, created_at, is_default FROM projects WHERE tenant_id = $1 ORDER BY created_at",
    )
    .bind(principal.tenant.id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    Ok(Json(projects))
}

/// Create an additional project with an auto-generated name and topic.
/// Only available to bearer-authenticated callers: an API key is already
/// scoped to one project, so creating another from it makes no sense.
pub async fn create(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> ApiResult<Json<Project>> {
    if principal.project_id.is_some() {
        return Err(ApiError::Forbidden { code: "api_key_cannot_create_projects", trace_id: None });
    }

    let mut tx = state.db.begin().await.map_err(|e| ApiError::internal(e, None))?;

    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (id, tenant_id, name, created_at, is_default) \
         VALUES (gen_random_uuid(), $1, $2, now(), false) RETURNING id, tenant_id, name, created_at, is_default",
    )
    .bind(principal.tenant.id)
    .bind(random_display_name())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    let broker_topic_name = broker::project_topic_name(&project.id.to_string());
    if let Err(e) = state.broker.create_topic(&broker_topic_name).await {
        warn!(error = %e, topic = %broker_topic_name, "best-effort topic creation failed during project create");
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

    Ok(Json(project))
}

#[derive(Deserialize)]
pub struct RenameProjectRequest {
    pub name: String,
}

pub async fn rename(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameProjectRequest>,
) -> ApiResult<Json<Project>> {
    let project = sqlx::query_as::<_, Project>(
        "UPDATE projects SET name = $1 WHERE id = $2 AND tenant_id = $3 \
         RETURNING id, tenant_id, name, created_at, is_default",
    )
    .bind(&req.name)
    .bind(id)
    .bind(principal.tenant.id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?
    .ok_or(ApiError::not_found("project_not_found", None))?;

    Ok(Json(project))
}

#[derive(Serialize)]
pub struct DeleteProjectResponse {
    pub message: String,
}

/// Best-effort broker topic teardown, then a relational delete that
/// cascades the project's topic, keys, and usage counters.
pub async fn delete(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteProjectResponse>> {
    let topic_names: Vec<String> = sqlx::query_scalar(
        "SELECT t.broker_topic_name FROM topics t \
         JOIN projects p ON p.id = t.project_id \
         WHERE t.project_id = $1 AND p.tenant_id = $2",
    )
    .bind(id)
    .bind(principal.tenant.id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    for topic_name in &topic_names {
        if let Err(e) = state.broker.delete_topic(topic_name).await {
            warn!(topic = %topic_name, error = %e, "topic deletion failed during project delete");
        }
    }

    let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(principal.tenant.id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("project_not_found", None));
    }

    Ok(Json(DeleteProjectResponse { message: "project deleted".to_string() }))
}
