use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "service": "gateway", "status": "ok" }))
}

#[derive(Serialize)]
struct HealthResponse {
    database: &'static str,
    broker: &'static str,
}

/// Synthetic database ping plus a broker topic-list probe. Both must
/// succeed for 200; either failing reports 503.
pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db).await.is_ok();
    let broker_ok = state.broker.list_topics().await.is_ok();

    let body = HealthResponse {
        database: if db_ok { "ok" } else { "unavailable" },
        broker: if broker_ok { "ok" } else { "unavailable" },
    };

    let status = if db_ok && broker_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, [("Content-Type", "text/plain; version=0.0.4")], body),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, [("Content-Type", "text/plain")], String::new()),
    }
}
