use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub index: Option<usize>,
}

/// Quota dimension a breach was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDimension {
    Messages,
    Bytes,
}

impl QuotaDimension {
    fn as_str(self) -> &'static str {
        match self {
            QuotaDimension::Messages => "messages",
            QuotaDimension::Bytes => "bytes",
        }
    }
}

/// Whether a quota breach was against the per-tenant counter or the cluster-wide panic brake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    Tenant,
    Global,
}

#[derive(Debug)]
pub enum ApiError {
    Validation { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    Unauthenticated { trace_id: Option<Uuid> },
    Forbidden { code: &'static str, trace_id: Option<Uuid> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    PayloadTooLarge { trace_id: Option<Uuid>, index: usize },
    QuotaBreach { scope: QuotaScope, dimension: QuotaDimension, trace_id: Option<Uuid> },
    StreamLimitBreach { trace_id: Option<Uuid> },
    RateLimitBreach { limit: u32, reset_epoch_seconds: u64, retry_after_seconds: u64 },
    Transient { trace_id: Option<Uuid> },
    Internal { trace_id: Option<Uuid>, message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self {
        Self::Internal { trace_id, message: Some(e.to_string()) }
    }

    pub fn bad_request(code: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::Validation { code, trace_id, message: None }
    }

    pub fn not_found(code: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::NotFound { code, trace_id }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation { code, trace_id, message } => {
                respond(StatusCode::BAD_REQUEST, code, ErrorBody { code: code.into(), message, trace_id, index: None })
            }
            ApiError::Unauthenticated { trace_id } => respond(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                ErrorBody { code: "unauthenticated".into(), message: None, trace_id, index: None },
            ),
            ApiError::Forbidden { code, trace_id } => {
                respond(StatusCode::FORBIDDEN, code, ErrorBody { code: code.into(), message: None, trace_id, index: None })
            }
            ApiError::NotFound { code, trace_id } => {
                respond(StatusCode::NOT_FOUND, code, ErrorBody { code: code.into(), message: None, trace_id, index: None })
            }
            ApiError::PayloadTooLarge { trace_id, index } => respond(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                ErrorBody { code: "payload_too_large".into(), message: None, trace_id, index: Some(index) },
            ),
            ApiError::QuotaBreach { scope, dimension, trace_id } => {
                let code: &'static str = match (scope, dimension) {
                    (QuotaScope::Tenant, QuotaDimension::Messages) => "quota_user_messages",
                    (QuotaScope::Tenant, QuotaDimension::Bytes) => "quota_user_bytes",
                    (QuotaScope::Global, QuotaDimension::Messages) => "quota_global_messages",
                    (QuotaScope::Global, QuotaDimension::Bytes) => "quota_global_bytes",
                };
                let message = Some(match scope {
                    QuotaScope::Tenant => format!("daily {} limit reached", dimension.as_str()),
                    QuotaScope::Global => format!("Cluster-wide daily {} limit exceeded", dimension.as_str()),
                });
                respond(StatusCode::TOO_MANY_REQUESTS, code, ErrorBody { code: code.into(), message, trace_id, index: None })
            }
            ApiError::StreamLimitBreach { trace_id } => respond(
                StatusCode::TOO_MANY_REQUESTS,
                "stream_limit_exceeded",
                ErrorBody { code: "stream_limit_exceeded".into(), message: None, trace_id, index: None },
            ),
            ApiError::RateLimitBreach { limit, reset_epoch_seconds, retry_after_seconds } => {
                let mut resp = respond(
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limit_exceeded",
                    ErrorBody { code: "rate_limit_exceeded".into(), message: None, trace_id: None, index: None },
                );
                let headers = resp.headers_mut();
                headers.insert("X-RateLimit-Limit", HeaderValue::from_str(&limit.to_string()).unwrap());
                headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
                headers.insert("X-RateLimit-Reset", HeaderValue::from_str(&reset_epoch_seconds.to_string()).unwrap());
                headers.insert("Retry-After", HeaderValue::from_str(&retry_after_seconds.to_string()).unwrap());
                resp
            }
            ApiError::Transient { trace_id } => respond(
                StatusCode::SERVICE_UNAVAILABLE,
                "transient_unavailable",
                ErrorBody { code: "transient_unavailable".into(), message: None, trace_id, index: None },
            ),
            ApiError::Internal { trace_id, message } => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                ErrorBody { code: "internal_error".into(), message, trace_id, index: None },
            ),
        }
    }
}

fn respond(status: StatusCode, error_code: &'static str, body: ErrorBody) -> Response {
    let mut resp = (status, Json(body)).into_response();
    if let Ok(val) = HeaderValue::from_str(error_code) {
        resp.headers_mut().insert("X-Error-Code", val);
    }
    resp
}

pub type ApiResult<T> = Result<T, ApiError>;
