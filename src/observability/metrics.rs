use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use tracing::info;
use std::sync::Arc;

use crate::error::BrokerError;
use crate::token::AccessToken;

/// Broker metrics, constructed once at startup and shared by `Arc`.
#[derive(Clone)]
pub struct BrokerMetrics {
    pub registry: Registry,

    // Provider metrics
    pub token_requests: IntCounterVec,
    pub token_failures: IntCounterVec,
    pub token_request_duration: HistogramVec,
    pub token_expiry_unix: IntGaugeVec,

    // Identity request exchange
    pub identity_request_renewals: IntCounter,

    // Runtime
    pub up: IntGauge,
}

impl BrokerMetrics {
    pub fn new() -> prometheus::Result<Arc<Self>> {
        info!("Initializing Metrics ...");
        let registry = Registry::new_custom(Some("tokenbroker".into()), None)?;

        let metrics = Arc::new(Self {
            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Total get_token calls by provider"), &["provider"])?,
            token_failures: IntCounterVec::new(Opts::new("token_failures_total", "Failed get_token calls by provider and error kind"), &["provider", "kind"])?,
            token_request_duration: HistogramVec::new(HistogramOpts::new("token_request_duration_seconds", "get_token duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 30.0, 300.0]), &["provider"])?,
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_unix_seconds", "Expiry of the last issued token"), &["provider"])?,

            identity_request_renewals: IntCounter::new("identity_request_renewals_total", "Identity requests created or renewed")?,
            up: IntGauge::new("up", "1 if service is healthy")?,

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_requests.clone()))?;
        reg.register(Box::new(metrics.token_failures.clone()))?;
        reg.register(Box::new(metrics.token_request_duration.clone()))?;
        reg.register(Box::new(metrics.token_expiry_unix.clone()))?;
        reg.register(Box::new(metrics.identity_request_renewals.clone()))?;
        reg.register(Box::new(metrics.up.clone()))?;

        Ok(metrics)
    }

    pub fn record_success(&self, provider: &str, token: &AccessToken, elapsed_secs: f64) {
        self.token_requests.with_label_values(&[provider]).inc();
        self.token_request_duration.with_label_values(&[provider]).observe(elapsed_secs);
        if let Some(expires_at) = token.expires_at() {
            self.token_expiry_unix.with_label_values(&[provider]).set(expires_at.timestamp());
        }
    }

    pub fn record_failure(&self, provider: &str, error: &BrokerError, elapsed_secs: f64) {
        self.token_requests.with_label_values(&[provider]).inc();
        self.token_request_duration.with_label_values(&[provider]).observe(elapsed_secs);
        self.token_failures.with_label_values(&[provider, error.kind()]).inc();
    }
}
