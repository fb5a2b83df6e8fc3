//! Request-scoped middleware, applied in a fixed order: request id first,
//! then best-effort user extraction (so a bearer-authenticated request is
//! rate-limited by tenant rather than by address), then rate-limit
//! enforcement itself.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use common_http_errors::ApiError;
use uuid::Uuid;

use crate::resolver::{self, Credential};
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Honor an inbound `X-Request-ID`, or mint one. Either way the response
/// echoes it back.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Best-effort bearer-only pre-extraction of the calling tenant, so the
/// rate limiter downstream can key by identity instead of falling back to
/// the client address. API-key credentials are left for the handler itself
/// to resolve, since that path needs a bcrypt verify against the database.
#[derive(Debug, Clone)]
pub struct ExtractedTenant(pub Option<Uuid>);

pub async fn user_extraction(State(state): State<AppState>, mut request: Request<Body>, next: Next) -> Response {
    let tenant_id = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(resolver::parse_authorization)
        .and_then(|cred| match cred {
            Credential::Bearer(token) => state.token_codec.verify(token).ok(),
            Credential::ApiKey(_) => None,
        })
        .and_then(|subject| subject.parse::<Uuid>().ok());

    request.extensions_mut().insert(ExtractedTenant(tenant_id));
    next.run(request).await
}

/// Rate-limit enforcement, keyed by the tenant extracted above when present,
/// falling back to the connecting address otherwise.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let key = match request.extensions().get::<ExtractedTenant>() {
        Some(ExtractedTenant(Some(tenant_id))) => format!("user:{tenant_id}"),
        _ => request
            .extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    };

    let decision = state.rate_limiter.check(&key, state.config.rate_limit_requests).await;
    if !decision.allowed {
        state
            .metrics
            .rate_limit_breaches_total
            .with_label_values(&[request.uri().path()])
            .inc();
        return Err(ApiError::RateLimitBreach {
            limit: decision.limit,
            reset_epoch_seconds: decision.reset_epoch_seconds,
            retry_after_seconds: decision.retry_after_seconds,
        });
    }

    Ok(next.run(request).await)
}
