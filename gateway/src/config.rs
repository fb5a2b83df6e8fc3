use anyhow::{bail, Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub kafka_bootstrap_servers: String,
    pub admin_api_key: String,
    pub cors_origins: Vec<String>,
    pub rate_limit_requests: u32,
    pub rate_limit_period: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 bytes");
        }
        let kafka_bootstrap_servers =
            env::var("KAFKA_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "localhost:9092".to_string());
        let admin_api_key = env::var("ADMIN_API_KEY").unwrap_or_default();
        let cors_origins_str = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:8000".to_string());
        let cors_origins = cors_origins_str
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        let rate_limit_requests = env::var("RATE_LIMIT_REQUESTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(100);
        let rate_limit_period = env::var("RATE_LIMIT_PERIOD").unwrap_or_else(|_| "minute".to_string());

        Ok(Self {
            database_url,
            jwt_secret,
            kafka_bootstrap_servers,
            admin_api_key,
            cors_origins,
            rate_limit_requests: rate_limit_requests.max(1),
            rate_limit_period,
        })
    }

    /// Rate limit window expressed in seconds, derived from `rate_limit_period`.
    pub fn rate_limit_window_secs(&self) -> u64 {
        match self.rate_limit_period.to_lowercase().as_str() {
            p if p.contains("second") => 1,
            p if p.contains("hour") => 3600,
            p if p.contains("day") => 86_400,
            _ => 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_window_defaults_to_minute() {
        let cfg = GatewayConfig {
            database_url: String::new(),
            jwt_secret: "0".repeat(32),
            kafka_bootstrap_servers: String::new(),
            admin_api_key: String::new(),
            cors_origins: vec![],
            rate_limit_requests: 100,
            rate_limit_period: "minute".to_string(),
        };
        assert_eq!(cfg.rate_limit_window_secs(), 60);
    }

    #[test]
    fn rate_limit_window_recognizes_hour() {
        let mut cfg = GatewayConfig {
            database_url: String::new(),
            jwt_secret: "0".repeat(32),
            kafka_bootstrap_servers: String::new(),
            admin_api_key: String::new(),
            cors_origins: vec![],
            rate_limit_requests: 100,
            rate_limit_period: "hour".to_string(),
        };
        assert_eq!(cfg.rate_limit_window_secs(), 3600);
        cfg.rate_limit_period = "second".to_string();
        assert_eq!(cfg.rate_limit_window_secs(), 1);
    }
}
