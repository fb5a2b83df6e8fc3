use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use common_http_errors::ApiError;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::info;

use crate::broker;
use crate::handlers::Principal;
use crate::models::AuthenticatedPrincipal;
use crate::state::AppState;
use crate::stream::{self as stream_engine, SseFrame};

async fn resolve_topic(
    state: &AppState,
    principal: &AuthenticatedPrincipal,
    name: &str,
) -> Result<crate::models::Topic, ApiError> {
    let topic = if let Some(project_id) = principal.project_id {
        sqlx::query_as::<_, crate::models::Topic>(
            "SELECT id, project_id, name, broker_topic_name, created_at FROM topics \
             WHERE project_id = $1 AND (name = $2 OR broker_topic_name = $2)",
        )
        .bind(project_id)
        .bind(name)
        .fetch_optional(&state.db)
        .await
    } else {
        sqlx::query_as::<_, crate::models::Topic>(
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

/// SSE stream endpoint. Admits the connection into the registry, spawns a
/// dedicated broker consumer, and forwards every emitted frame to the HTTP
/// client until the stream ends or the client disconnects.
pub async fn stream(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(name): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let topic = resolve_topic(&state, &principal, &name).await?;

    let connection_id = state
        .registry
        .admit(principal.tenant.id, &topic.name)
        .ok_or(ApiError::StreamLimitBreach { trace_id: None })?;

    let group_id = broker::stream_group_id(&principal.tenant.id.to_string(), &connection_id.to_string());
    let (frame_tx, frame_rx) = mpsc::channel::<SseFrame>(8);

    let broker_client = state.broker.clone();
    let pool = state.db.clone();
    let registry = state.registry.clone();
    let tenant_id = principal.tenant.id;
    let project_id = topic.project_id;
    let broker_topic_name = topic.broker_topic_name.clone();

    tokio::spawn(async move {
        let outcome =
            stream_engine::run_stream(broker_client, &broker_topic_name, &group_id, pool, tenant_id, project_id, frame_tx)
                .await;

        let reason = match outcome {
            Ok(o) => o.reason.as_str(),
            Err(_) => "broker",
        };
        info!(tenant_id = %tenant_id, connection_id = %connection_id, reason, event = "stream", "stream ended");
        registry.remove(tenant_id, connection_id);
    });

    let frame_stream = stream::unfold(frame_rx, |mut rx| async move { rx.recv().await.map(|frame| (frame, rx)) });
    let initial = stream::once(async { SseFrame::Comment("connected".to_string()) });

    let event_stream = initial.chain(frame_stream).map(|frame| {
        Ok(match frame {
            SseFrame::Data(payload) => Event::default().data(payload),
            SseFrame::Comment(text) => Event::default().comment(text),
        })
    });

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(20)).text("")))
}
