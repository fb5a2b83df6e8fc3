use common_http_errors::{ApiError, QuotaDimension, QuotaScope};
use axum::response::IntoResponse;
use axum::http::StatusCode;
use uuid::Uuid;

#[test]
fn forbidden_variant() {
    let err = ApiError::Forbidden { code: "forbidden", trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "forbidden");
}

#[test]
fn validation_variant() {
    let err = ApiError::Validation { code: "invalid_something", trace_id: None, message: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_something");
}

#[test]
fn not_found_variant() {
    let err = ApiError::NotFound { code: "missing_resource", trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_resource");
}

#[test]
fn unauthenticated_variant() {
    let err = ApiError::Unauthenticated { trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "unauthenticated");
}

#[test]
fn payload_too_large_carries_index() {
    let err = ApiError::PayloadTooLarge { trace_id: None, index: 3 };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn quota_breach_user_vs_global_codes_differ() {
    let user = ApiError::QuotaBreach { scope: QuotaScope::Tenant, dimension: QuotaDimension::Messages, trace_id: None }.into_response();
    assert_eq!(user.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(user.headers().get("X-Error-Code").unwrap(), "quota_user_messages");

    let global = ApiError::QuotaBreach { scope: QuotaScope::Global, dimension: QuotaDimension::Bytes, trace_id: None }.into_response();
    assert_eq!(global.headers().get("X-Error-Code").unwrap(), "quota_global_bytes");
}

#[test]
fn stream_limit_breach_variant() {
    let err = ApiError::StreamLimitBreach { trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "stream_limit_exceeded");
}

#[test]
fn rate_limit_breach_sets_headers() {
    let err = ApiError::RateLimitBreach { limit: 100, reset_epoch_seconds: 1_700_000_060, retry_after_seconds: 60 };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers().get("X-RateLimit-Limit").unwrap(), "100");
    assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), "0");
    assert_eq!(resp.headers().get("Retry-After").unwrap(), "60");
}

#[test]
fn transient_variant() {
    let err = ApiError::Transient { trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn internal_variant() {
    let trace = Some(Uuid::new_v4());
    let err = ApiError::Internal { trace_id: trace, message: Some("boom".into()) };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
}
