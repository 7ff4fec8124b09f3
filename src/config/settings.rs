use std::path::PathBuf;

use serde::Deserialize;
use tokio::time::Duration;

use crate::config::auth::AuthConfig;
use crate::providers::signed_message::SigningScheme;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BrokerConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Credential mechanism of the secrets-provider side (pod identity, VM identity, ...)
    pub auth: Option<AuthConfig>,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SettingsConfig {
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { path: default_metrics_path(), is_enabled: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_owned(), port: "9100".to_owned() }
    }
}

/// Per-call bound for every outgoing HTTP request.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_ms: default_http_timeout_ms() }
    }
}

/// Timings of the identity request exchange.
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// renew once the cached token has less than this left
    #[serde(default = "default_renew_before_minutes")]
    pub renew_before_minutes: u64,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_wait_timeout_seconds")]
    pub wait_timeout_seconds: u64,
    /// `spec.apiVersion` of identity requests; omitted when unset so the issuer picks its default
    #[serde(default)]
    pub request_api_version: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            renew_before_minutes: default_renew_before_minutes(),
            poll_interval_seconds: default_poll_interval_seconds(),
            wait_timeout_seconds: default_wait_timeout_seconds(),
            request_api_version: None,
        }
    }
}

/// Retry bound for dependencies that must exist before the broker can work at all.
#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub retry_interval_seconds: u64,
    #[serde(default = "default_bootstrap_deadline_seconds")]
    pub deadline_seconds: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            retry_interval_seconds: default_poll_interval_seconds(),
            deadline_seconds: default_bootstrap_deadline_seconds(),
        }
    }
}

/// How the binary schedules the next `get_token` call.
#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// refresh this many seconds before the token expires
    #[serde(default = "default_refresh_margin_seconds")]
    pub margin_seconds: u64,
    /// period used for credentials without an expiry
    #[serde(default = "default_idle_period_seconds")]
    pub idle_period_seconds: u64,
    /// lower bound between two refreshes, also after failures
    #[serde(default = "default_min_interval_seconds")]
    pub min_interval_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            margin_seconds: default_refresh_margin_seconds(),
            idle_period_seconds: default_idle_period_seconds(),
            min_interval_seconds: default_min_interval_seconds(),
        }
    }
}

impl ExchangeConfig {
    pub fn renew_before(&self) -> Duration {
        Duration::from_secs(self.renew_before_minutes * 60)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }
}

/// ================================
/// Provider selection
/// ================================
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOverride {
    SignedMessage,
    ManagedIdentity,
    BearerTokenClientId,
    BearerTokenCertificate,
    #[default]
    NoOverride,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    #[serde(default, rename = "override")]
    pub override_value: ProviderOverride,
    /// falls back to CLUSTER_TYPE
    pub cluster_type: Option<String>,
    /// audience of identity requests; defaults by cluster type
    pub audience: Option<String>,
    /// AAD resource the secrets-provider mechanisms request tokens for
    pub resource: Option<String>,
    /// binds identity requests to an extension (`resourceId`)
    pub extension_name: Option<String>,
    /// overrides the region-derived active directory endpoint
    pub authority_host: Option<String>,
    pub imds_endpoint: Option<String>,
    #[serde(default)]
    pub nmi: NmiConfig,
    pub certificate: Option<CertificateConfig>,
    #[serde(default)]
    pub signing_scheme: SigningScheme,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NmiConfig {
    #[serde(default = "default_nmi_host")]
    pub host: String,
    #[serde(default = "default_nmi_port")]
    pub port: String,
}

impl Default for NmiConfig {
    fn default() -> Self {
        Self { host: default_nmi_host(), port: default_nmi_port() }
    }
}

/// PEM files backing the certificate provider.
#[derive(Debug, Deserialize, Clone)]
pub struct CertificateConfig {
    pub client_id: String,
    pub resource: String,
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "compact" | "text" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_http_timeout_ms() -> u64 {
    crate::utils::constants::DEFAULT_HTTP_TIMEOUT_MS
}

fn default_renew_before_minutes() -> u64 {
    60
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_wait_timeout_seconds() -> u64 {
    5 * 60
}

fn default_bootstrap_deadline_seconds() -> u64 {
    2 * 60 * 60
}

fn default_refresh_margin_seconds() -> u64 {
    5 * 60
}

fn default_idle_period_seconds() -> u64 {
    10 * 60
}

fn default_min_interval_seconds() -> u64 {
    30
}

fn default_nmi_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_nmi_port() -> String {
    "2579".to_owned()
}
