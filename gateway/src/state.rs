//! Shared application state, assembled once at startup and cloned cheaply
//! into every request (everything inside is an `Arc` or already `Clone`).

use std::sync::Arc;

use common_crypto::token::TokenCodec;
use sqlx::PgPool;

use crate::broker::BrokerClient;
use crate::config::GatewayConfig;
use crate::metrics::GatewayMetrics;
use crate::rate_limit::RateLimiterEngine;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub token_codec: Arc<TokenCodec>,
    pub registry: Arc<ConnectionRegistry>,
    pub rate_limiter: Arc<dyn RateLimiterEngine>,
    pub broker: Arc<dyn BrokerClient>,
    pub metrics: Arc<GatewayMetrics>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        token_codec: TokenCodec,
        rate_limiter: Arc<dyn RateLimiterEngine>,
        broker: Arc<dyn BrokerClient>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            db,
            token_codec: Arc::new(token_codec),
            registry: Arc::new(ConnectionRegistry::new()),
            rate_limiter,
            broker,
            metrics: Arc::new(GatewayMetrics::new()),
            config: Arc::new(config),
        }
    }
}
