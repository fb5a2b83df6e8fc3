use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common_crypto::token::TokenCodec;
use gateway::broker::inmemory::InMemoryBroker;
use gateway::broker::BrokerClient;
use gateway::config::GatewayConfig;
use gateway::handlers::{auth, health, projects};
use gateway::rate_limit::{InMemoryRateLimiter, RateLimiterEngine};
use gateway::state::AppState;
use tower::ServiceExt;

fn test_config() -> GatewayConfig {
    GatewayConfig {
        database_url: "postgres://localhost/does-not-exist".to_string(),
        jwt_secret: "0".repeat(32),
        kafka_bootstrap_servers: String::new(),
        admin_api_key: "secret-admin-key".to_string(),
        cors_origins: vec!["http://localhost:3000".to_string()],
        rate_limit_requests: 100,
        rate_limit_period: "minute".to_string(),
    }
}

fn test_state() -> AppState {
    let pool = sqlx::postgres::PgPoolOptions::new().connect_lazy(&test_config().database_url).unwrap();
    let token_codec = TokenCodec::new(&test_config().jwt_secret).unwrap();
    let rate_limiter: Arc<dyn RateLimiterEngine> = Arc::new(InMemoryRateLimiter::new(60));
    let broker: Arc<dyn BrokerClient> = Arc::new(InMemoryBroker::new());
    AppState::new(pool, token_codec, rate_limiter, broker, test_config())
}

fn test_router() -> Router {
    Router::new()
        .route("/", axum::routing::get(health::root))
        .route("/healthcheck", axum::routing::get(health::healthcheck))
        .route("/auth/signup", axum::routing::post(auth::signup))
        .route("/projects", axum::routing::get(projects::list))
        .with_state(test_state())
}

#[tokio::test]
async fn root_reports_service_metadata() {
    let response =
        test_router().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn healthcheck_is_unavailable_without_a_real_database() {
    let response =
        test_router().oneshot(Request::builder().uri("/healthcheck").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn protected_route_without_authorization_header_is_unauthenticated() {
    let response =
        test_router().oneshot(Request::builder().uri("/projects").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_with_malformed_bearer_is_unauthenticated() {
    let request = Request::builder()
        .uri("/projects")
        .header("Authorization", "Bearer not-a-real-token")
        .body(Body::empty())
        .unwrap();
    let response = test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
