use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::middleware as axum_middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use common_crypto::token::TokenCodec;
use gateway::broker::inmemory::InMemoryBroker;
use gateway::broker::BrokerClient;
use gateway::config::GatewayConfig;
use gateway::handlers::{admin, api_keys, auth, health, projects, stream, topics, usage};
use gateway::logging::init_tracing;
use gateway::middleware::{rate_limit, request_id, user_extraction};
use gateway::rate_limit::{InMemoryRateLimiter, RateLimiterEngine};
use gateway::state::AppState;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = GatewayConfig::from_env()?;

    let db_pool = PgPoolOptions::new().max_connections(20).connect(&config.database_url).await?;

    let token_codec = TokenCodec::new(&config.jwt_secret)?;
    let rate_limiter: Arc<dyn RateLimiterEngine> = Arc::new(InMemoryRateLimiter::new(config.rate_limit_window_secs()));

    let broker: Arc<dyn BrokerClient> = build_broker(&config)?;

    let cors_origins: Vec<HeaderValue> =
        config.cors_origins.iter().filter_map(|origin| origin.parse::<HeaderValue>().ok()).collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any);

    let state = AppState::new(db_pool, token_codec, rate_limiter, broker, config);

    let protected = Router::new()
        .route("/auth/me", get(auth::me_get).patch(auth::me_patch).delete(auth::me_delete))
        .route("/api-keys", get(api_keys::list).post(api_keys::create))
        .route("/api-keys/:id", delete(api_keys::delete))
        .route("/projects", get(projects::list).post(projects::create))
        .route("/projects/:id", patch(projects::rename).delete(projects::delete))
        .route("/topics", get(topics::list))
        .route("/topics/:name/publish", post(topics::publish))
        .route("/topics/:name/stream", get(stream::stream))
        .route("/usage", get(usage::usage))
        .route("/usage/projects", get(usage::usage_by_project))
        .layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(axum_middleware::from_fn_with_state(state.clone(), user_extraction));

    let app = Router::new()
        .route("/", get(health::root))
        .route("/healthcheck", get(health::healthcheck))
        .route("/metrics", get(health::metrics))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/admin/active-streams", get(admin::active_streams))
        .merge(protected)
        .layer(cors)
        .layer(axum_middleware::from_fn(request_id))
        .with_state(state);

    let addr: SocketAddr = "0.0.0.0:8080".parse()?;
    info!(%addr, "starting gateway");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn build_broker(config: &GatewayConfig) -> anyhow::Result<Arc<dyn BrokerClient>> {
    #[cfg(feature = "kafka-broker")]
    {
        let broker = gateway::broker::rdkafka_impl::RdKafkaBroker::new(&config.kafka_bootstrap_servers)?;
        return Ok(Arc::new(broker));
    }

    #[cfg(not(feature = "kafka-broker"))]
    {
        let _ = config;
        tracing::warn!("kafka-broker feature disabled: using in-memory broker stub");
        Ok(Arc::new(InMemoryBroker::new()))
    }
}
