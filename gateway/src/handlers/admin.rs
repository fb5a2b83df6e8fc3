use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use common_http_errors::{ApiError, ApiResult};
use serde::Serialize;
use uuid::Uuid;

use crate::registry::ConnectionDescriptor;
use crate::state::AppState;

const ADMIN_KEY_HEADER: &str = "X-Admin-API-Key";

#[derive(Serialize)]
pub struct TenantStreams {
    pub tenant_id: Uuid,
    pub active_streams: Vec<ConnectionDescriptor>,
}

#[derive(Serialize)]
pub struct ActiveStreamsResponse {
    pub tenants: Vec<TenantStreams>,
}

/// Gated by a shared secret header. A server with no admin key configured
/// fails closed (500), never silently open.
pub async fn active_streams(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<ActiveStreamsResponse>> {
    if state.config.admin_api_key.is_empty() {
        return Err(ApiError::internal("ADMIN_API_KEY is not configured", None));
    }

    let provided = headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(state.config.admin_api_key.as_str()) {
        return Err(ApiError::Unauthenticated { trace_id: None });
    }

    let snapshot = state.registry.snapshot();
    let tenants = snapshot
        .into_iter()
        .map(|(tenant_id, active_streams)| TenantStreams { tenant_id, active_streams })
        .collect();

    Ok(Json(ActiveStreamsResponse { tenants }))
}
