use std::sync::Arc;

use anyhow::{Context, Result};
use azure_token_broker::config::settings::RefreshConfig;
use azure_token_broker::config::{proc_loader, AgentEnvironment};
use azure_token_broker::helpers::time::next_refresh_in;
use azure_token_broker::identity::{management_namespace, KubeIdentityStore};
use azure_token_broker::observability::metrics::BrokerMetrics;
use azure_token_broker::providers::aad::build_http_client;
use azure_token_broker::providers::{ProviderFactory, TokenProvider};
use azure_token_broker::resilience::retry::DEFAULT_RETRY_INTERVAL;
use azure_token_broker::server;
use azure_token_broker::utils::logging;
use azure_token_broker::utils::logging::LogLevel;
use azure_token_broker::BrokerError;
use clap::Parser;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-broker.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// Fetch a single token, print its metadata and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, environment and logging
    // -------------------------------

    let args = Args::parse();
    let broker_config = proc_loader::run(&args.config)?;
    let env = AgentEnvironment::from_process();
    logging::run(&broker_config, args.log_level, env.debug_logging);

    // -------------------------------
    // 2. Metrics and http client
    // -------------------------------

    let metrics = BrokerMetrics::new().context("failed to register metrics")?;
    let http = build_http_client(broker_config.settings.http.timeout_ms)?;

    // -------------------------------
    // 3. Select and build the token provider
    // -------------------------------

    let mut factory = ProviderFactory::new(&broker_config, env, http).with_metrics(metrics.clone());
    let kind = factory.kind()?;
    if kind.needs_identity_store() {
        let client = kube::Client::try_default()
            .await
            .context("failed to create kubernetes client")?;
        factory = factory.with_identity_store(Arc::new(KubeIdentityStore::new(client)), &management_namespace());
    }
    let mut provider = match &broker_config.provider.extension_name {
        Some(extension_name) => factory.extension_provider(factory.audience(), extension_name)?,
        None => factory.build().await?,
    };
    info!(provider = provider.name(), cluster_type = factory.cluster_type(), "token provider ready");

    if args.once {
        let token = provider.get_token_observed(&metrics).await?;
        info!(
            header = token.header_name(),
            scheme = token.auth_scheme(),
            expires_at = ?token.expires_at(),
            "token issued"
        );
        return Ok(());
    }

    // -------------------------------
    // 4. Refresh loop and http server
    // -------------------------------

    let (healthy_tx, healthy_rx) = watch::channel(false);
    let refresher = refresh_loop(&mut provider, &metrics, healthy_tx, &broker_config.settings.refresh);
    let http_server = server::server::start(&broker_config.settings, metrics.clone(), healthy_rx);

    info!("Service starting...");
    tokio::select! {
        result = async { tokio::try_join!(refresher, http_server) } => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    metrics.up.set(0);

    Ok(())
}

async fn refresh_loop(
    provider: &mut TokenProvider,
    metrics: &BrokerMetrics,
    healthy: watch::Sender<bool>,
    refresh: &RefreshConfig,
) -> Result<()> {
    let margin = Duration::from_secs(refresh.margin_seconds);
    let idle_period = Duration::from_secs(refresh.idle_period_seconds);
    let min_interval = Duration::from_secs(refresh.min_interval_seconds);
    let retry_interval = DEFAULT_RETRY_INTERVAL.max(min_interval);
    loop {
        let wait = match provider.get_token_observed(metrics).await {
            Ok(token) => {
                let _ = healthy.send(true);
                let wait = next_refresh_in(token.expires_at(), margin, idle_period, min_interval);
                info!(provider = provider.name(), expires_at = ?token.expires_at(), next_refresh = ?wait, "token refreshed");
                wait
            }
            // configuration does not change at runtime
            Err(e @ BrokerError::Config(_)) => {
                let _ = healthy.send(false);
                error!(provider = provider.name(), error = %e, "token refresh failed permanently");
                return Err(e.into());
            }
            Err(e) => {
                let _ = healthy.send(false);
                warn!(provider = provider.name(), error = %e, "token refresh failed, retrying in {:?}", retry_interval);
                retry_interval
            }
        };
        tokio::time::sleep(wait).await;
    }
}
