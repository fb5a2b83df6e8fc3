use axum::extract::{Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::Principal;
use crate::quota::{self, UsageMetrics};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UsageQuery {
    pub project_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct Direction {
    pub inbound: UsageMetrics,
    pub outbound: UsageMetrics,
}

#[derive(Serialize)]
pub struct ProjectUsageResponse {
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub usage: Direction,
}

#[derive(Serialize)]
pub struct TenantUsageResponse {
    pub tenant_id: Uuid,
    pub date: NaiveDate,
    pub usage: Direction,
}

/// Current-day usage. An API-key caller is always scoped to its own
/// project; a bearer caller aggregates across all projects unless
/// `project_id` narrows it to one.
pub async fn usage(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let today = Utc::now().date_naive();
    let project_id = principal.project_id.or(query.project_id);

    if let Some(project_id) = project_id {
        let (messages_in, messages_out, bytes_in, bytes_out) =
            quota::get_project_usage(&state.db, principal.tenant.id, project_id, today)
                .await
                .map_err(|e| ApiError::internal(e, None))?;

        let response = ProjectUsageResponse {
            project_id,
            date: today,
            usage: Direction {
                inbound: quota::calculate_usage_metrics(messages_in, bytes_in),
                outbound: quota::calculate_usage_metrics(messages_out, bytes_out),
            },
        };
        return Ok(Json(serde_json::to_value(response).map_err(|e| ApiError::internal(e, None))?));
    }

    let (messages_in, messages_out, bytes_in, bytes_out) = quota::get_tenant_usage(&state.db, principal.tenant.id, today)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    let response = TenantUsageResponse {
        tenant_id: principal.tenant.id,
        date: today,
        usage: Direction {
            inbound: quota::calculate_usage_metrics(messages_in, bytes_in),
            outbound: quota::calculate_usage_metrics(messages_out, bytes_out),
        },
    };
    Ok(Json(serde_json::to_value(response).map_err(|e| ApiError::internal(e, None))?))
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
}

#[derive(Serialize)]
pub struct PerProjectUsage {
    pub project_id: Uuid,
    pub project_name: String,
    pub usage: Direction,
}

/// Per-project breakdown. Bearer-only: an API key is already scoped to one
/// project, so there is nothing to break down.
pub async fn usage_by_project(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> ApiResult<Json<Vec<PerProjectUsage>>> {
    if principal.project_id.is_some() {
        return Err(ApiError::Forbidden { code: "api_key_scoped_to_one_project", trace_id: None });
    }

    let today = Utc::now().date_naive();
    let projects = sqlx::query_as::<_, ProjectRow>("SELECT id, name FROM projects WHERE tenant_id = $1")
        .bind(principal.tenant.id)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    let mut breakdown = Vec::with_capacity(projects.len());
    for project in projects {
        let (messages_in, messages_out, bytes_in, bytes_out) =
            quota::get_project_usage(&state.db, principal.tenant.id, project.id, today)
                .await
                .map_err(|e| ApiError::internal(e, None))?;

        breakdown.push(PerProjectUsage {
            project_id: project.id,
            project_name: project.name,
            usage: Direction {
                inbound: quota::calculate_usage_metrics(messages_in, bytes_in),
                outbound: quota::calculate_usage_metrics(messages_out, bytes_out),
            },
        });
    }

    Ok(Json(breakdown))
}
