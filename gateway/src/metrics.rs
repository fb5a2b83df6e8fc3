//! Process metrics, exposed in Prometheus text format at `/metrics`. Built
//! on the `prometheus` crate's own `Registry`, the same shape used
//! elsewhere in the reference workspace for domain-specific metric sets.

use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

pub struct GatewayMetrics {
    registry: Registry,
    pub http_requests_total: IntCounterVec,
    pub quota_breaches_total: IntCounterVec,
    pub rate_limit_breaches_total: IntCounterVec,
    pub quota_lock_retries_total: IntCounterVec,
    pub publish_latency_seconds: HistogramVec,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_http_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )
        .expect("metric definition is valid");

        let quota_breaches_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_quota_breaches_total", "Quota breaches by scope and dimension"),
            &["scope", "dimension"],
        )
        .expect("metric definition is valid");

        let rate_limit_breaches_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_rate_limit_breaches_total", "Rate limit breaches by route"),
            &["route"],
        )
        .expect("metric definition is valid");

        let quota_lock_retries_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_quota_lock_retries_total", "Quota row-lock retry attempts"),
            &["outcome"],
        )
        .expect("metric definition is valid");

        let publish_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("gateway_publish_latency_seconds", "Publish request latency"),
            &["route"],
        )
        .expect("metric definition is valid");

        registry.register(Box::new(http_requests_total.clone())).expect("register metric");
        registry.register(Box::new(quota_breaches_total.clone())).expect("register metric");
        registry.register(Box::new(rate_limit_breaches_total.clone())).expect("register metric");
        registry.register(Box::new(quota_lock_retries_total.clone())).expect("register metric");
        registry.register(Box::new(publish_latency_seconds.clone())).expect("register metric");

        Self {
            registry,
            http_requests_total,
            quota_breaches_total,
            rate_limit_breaches_total,
            quota_lock_retries_total,
            publish_latency_seconds,
        }
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus text encoding is always utf-8"))
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = GatewayMetrics::new();
        metrics.http_requests_total.with_label_values(&["/publish", "200"]).inc();
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("gateway_http_requests_total"));
    }
}
