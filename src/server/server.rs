use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use http::StatusCode;
use tokio::sync::watch;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::BrokerMetrics;
use crate::observability::routes::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    /// true once the broker has issued at least one token and the last refresh succeeded
    pub healthy: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(metrics: &BrokerMetrics, healthy: watch::Receiver<bool>) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            healthy,
        }
    }
}

pub fn router(settings_config: &SettingsConfig, state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(state.metrics_state.router(&settings_config.metrics))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    if *state.healthy.borrow() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Serve `/healthz` and, when enabled, `/metrics`.
pub async fn start(
    settings_config: &SettingsConfig,
    metrics: Arc<BrokerMetrics>,
    healthy: watch::Receiver<bool>,
) -> Result<()> {
    let state = AppState::new(&metrics, healthy);
    let app = router(settings_config, state);

    let bind_addr = &settings_config.server.host;
    let port = &settings_config.server.port;
    info!(address = %bind_addr, port = %port, "starting http server");
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port))
        .await
        .with_context(|| format!("failed to bind {}:{}", bind_addr, port))?;
    metrics.up.set(1);
    axum::serve(listener, app).await.context("http server failed")?;

    Ok(())
}
