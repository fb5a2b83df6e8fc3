use axum::extract::{Path, State};
use axum::Json;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handlers::Principal;
use crate::models::Topic;
use crate::quota::{self, Direction, QuotaRequest};
use crate::state::AppState;

pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

pub async fn list(State(state): State<AppState>, Principal(principal): Principal) -> ApiResult<Json<Vec<Topic>>> {
    let topics = if let Some(project_id) = principal.project_id {
        sqlx::query_as::<_, Topic>(
            "SELECT id, project_id, name, broker_topic_name, created_at FROM topics WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_all(&state.db)
        .await
    } else {
        sqlx::query_as::<_, Topic>(
            "SELECT t.id, t.project_id, t.name, t.broker_topic_name, t.created_at FROM topics t \
             JOIN projects p ON p.id = t.project_id WHERE p.tenant_id = $1",
        )
        .bind(principal.tenant.id)
        .fetch_all(&state.db)
        .await
    }
    .map_err(|e| ApiError::internal(e, None))?;

    Ok(Json(topics))
}

/// Resolve a topic the caller may address by either its display name
/// (within its scope) or its global broker topic name.
async fn resolve_topic(
    state: &AppState,
    principal: &crate::models::AuthenticatedPrincipal,
    name: &str,
) -> ApiResult<Topic> {
    let topic = if let Some(project_id) = principal.project_id {
        sqlx::query_as::<_, Topic>(
            "SELECT id, project_id, name, broker_topic_name, created_at FROM topics \
             WHERE project_id = $1 AND (name = $2 OR broker_topic_name = $2)",
        )
        .bind(project_id)
        .bind(name)
        .fetch_optional(&state.db)
        .await
    } else {
        sqlx::query_as::<_, Topic>(
            "SELECT t.id, t.project_id, t.name, t.broker_topic_name, t.created_at FROM topics t \
             JOIN projects p ON p.id = t.project_id \
             WHERE p.tenant_id = $1 AND (t.name = $2 OR t.broker_topic_name = $2)",
        )
        .bind(principal.tenant.id)
        .bind(name)
        .fetch_optional(&state.db)
        .await
    }
    .map_err(|e| ApiError::internal(e, None))?;

    topic.ok_or(ApiError::not_found("topic_not_found", None))
}

#[derive(Deserialize)]
pub struct MessageValue {
    pub value: Value,
}

#[derive(Deserialize)]
pub struct PublishRequest {
    pub messages: Vec<MessageValue>,
}

#[derive(Serialize)]
pub struct PublishResponse {
    pub success: bool,
    pub message: String,
}

pub async fn publish(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(name): Path<String>,
    Json(req): Json<PublishRequest>,
) -> ApiResult<Json<PublishResponse>> {
    let topic = resolve_topic(&state, &principal, &name).await?;

    let mut encoded_messages = Vec::with_capacity(req.messages.len());
    let mut total_bytes: i64 = 0;
    for (index, message) in req.messages.iter().enumerate() {
        // Compact encoding (no separators), not the original's `json.dumps`
        // default `", "`/`": "` separators, so byte counts diverge slightly
        // near quota boundaries.
        let encoded = serde_json::to_vec(&message.value).map_err(|e| ApiError::internal(e, None))?;
        if encoded.len() > MAX_PAYLOAD_SIZE {
            return Err(ApiError::PayloadTooLarge { trace_id: None, index });
        }
        total_bytes += encoded.len() as i64;
        encoded_messages.push(encoded);
    }

    quota::check_and_increment(
        &state.db,
        QuotaRequest {
            tenant_id: principal.tenant.id,
            project_id: topic.project_id,
            direction: Direction::In,
            messages: encoded_messages.len() as i64,
            bytes: total_bytes,
        },
    )
    .await?;

    for encoded in &encoded_messages {
        state
            .broker
            .produce(&topic.broker_topic_name, encoded)
            .await
            .map_err(|e| ApiError::internal(e, None))?;
    }

    Ok(Json(PublishResponse { success: true, message: "published".to_string() }))
}

#[cfg(test)]
mod tests {
    use super::MAX_PAYLOAD_SIZE;

    #[test]
    fn payload_cap_matches_sixty_four_kib() {
        assert_eq!(MAX_PAYLOAD_SIZE, 65536);
    }
}
