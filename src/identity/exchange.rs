use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::settings::ExchangeConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::identity::crd::AzureClusterIdentityRequest;
use crate::identity::store::IdentityRequestStore;
use crate::observability::metrics::BrokerMetrics;
use crate::resilience::{OnTimeout, RetryPolicy};
use crate::token::access_token::{AccessToken, AUTHORIZATION_HEADER, BEARER_SCHEME};

/// Where a [`ClusterIdentityExchange`] is in its request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Uninitialized,
    FetchingCached,
    Renewing,
    Polling,
    Valid,
    Failed,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::Uninitialized => "uninitialized",
            ExchangeState::FetchingCached => "fetching_cached",
            ExchangeState::Renewing => "renewing",
            ExchangeState::Polling => "polling",
            ExchangeState::Valid => "valid",
            ExchangeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// renew when less than this is left before expiry
    pub renew_before: Duration,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub api_version: Option<String>,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self::from(&ExchangeConfig::default())
    }
}

impl From<&ExchangeConfig> for ExchangeSettings {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            renew_before: config.renew_before(),
            poll_interval: config.poll_interval(),
            wait_timeout: config.wait_timeout(),
            api_version: config.request_api_version.clone().filter(|version| !version.is_empty()),
        }
    }
}

/// Token read back from a populated status.
#[derive(Clone)]
struct IssuedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Submits an identity request object and awaits the issuer's answer in its status.
///
/// The in-memory token is authoritative until the expiry check forces a renewal;
/// status is not re-read in between.
pub struct ClusterIdentityExchange {
    store: Arc<dyn IdentityRequestStore>,
    request: AzureClusterIdentityRequest,
    namespace: String,
    name: String,
    settings: ExchangeSettings,
    metrics: Option<Arc<BrokerMetrics>>,
    state: ExchangeState,
    transitions: Vec<ExchangeState>,
    token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl ClusterIdentityExchange {
    pub fn new(
        store: Arc<dyn IdentityRequestStore>,
        namespace: &str,
        audience: &str,
        resource_id: &str,
        settings: ExchangeSettings,
    ) -> Self {
        let mut request = AzureClusterIdentityRequest::for_audience(namespace, audience, resource_id);
        if let Some(api_version) = &settings.api_version {
            request.spec.api_version = api_version.clone();
        }
        let name = request.metadata.name.clone().unwrap_or_default();
        Self {
            store,
            request,
            namespace: namespace.to_owned(),
            name,
            settings,
            metrics: None,
            state: ExchangeState::Uninitialized,
            transitions: Vec::new(),
            token: None,
            // expired until the first status read says otherwise
            expires_at: Utc::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<BrokerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// States entered during the most recent [`get_token`](Self::get_token) call.
    pub fn last_transitions(&self) -> &[ExchangeState] {
        &self.transitions
    }

    pub fn request_name(&self) -> &str {
        &self.name
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn enter(&mut self, state: ExchangeState) {
        debug!(request = %self.name, from = %self.state, to = %state, "identity request state change");
        self.state = state;
        self.transitions.push(state);
    }

    fn needs_renewal(&self) -> bool {
        let renew_before = TimeDelta::from_std(self.settings.renew_before).unwrap_or(TimeDelta::MAX);
        self.token.is_none() || self.expires_at - Utc::now() < renew_before
    }

    /// Keeps the freshest known expiry; an older answer never replaces a newer one.
    fn adopt(&mut self, issued: IssuedToken) {
        if self.token.is_none() || issued.expires_at >= self.expires_at {
            self.expires_at = issued.expires_at;
            self.token = Some(issued.token);
        } else {
            warn!(
                request = %self.name,
                issued_expiry = %issued.expires_at,
                cached_expiry = %self.expires_at,
                "ignoring issued token older than the cached one"
            );
        }
    }

    pub async fn get_token(&mut self) -> BrokerResult<AccessToken> {
        self.transitions.clear();

        let mut cached_missing = false;
        if self.state == ExchangeState::Uninitialized {
            // a restarted broker may find a token issued for its predecessor
            self.enter(ExchangeState::FetchingCached);
            match read_issued_token(self.store.as_ref(), &self.namespace, &self.name).await {
                Ok(issued) => self.adopt(issued),
                Err(e) => {
                    debug!(request = %self.name, error = %e, "no usable cached token");
                    cached_missing = true;
                }
            }
        }

        if cached_missing || self.needs_renewal() {
            self.enter(ExchangeState::Renewing);
            if let Err(e) = self.create_or_renew().await {
                self.enter(ExchangeState::Failed);
                return Err(e);
            }
            if let Some(metrics) = &self.metrics {
                metrics.identity_request_renewals.inc();
            }

            self.enter(ExchangeState::Polling);
            match self.poll_status().await {
                Ok(issued) => self.adopt(issued),
                Err(e) => {
                    warn!(request = %self.name, error = %e, "identity request was not answered");
                    self.enter(ExchangeState::Failed);
                    return Err(e);
                }
            }
        }

        match &self.token {
            Some(token) => {
                let access_token = AccessToken::new(
                    token.clone(),
                    Some(self.expires_at),
                    AUTHORIZATION_HEADER,
                    BEARER_SCHEME,
                );
                if self.state != ExchangeState::Valid {
                    self.enter(ExchangeState::Valid);
                }
                Ok(access_token)
            }
            None => {
                self.enter(ExchangeState::Failed);
                Err(BrokerError::response("identity request produced no token"))
            }
        }
    }

    /// Create the object, or update it and then clear its status so a stale answer is never served.
    async fn create_or_renew(&mut self) -> BrokerResult<()> {
        let existing = self.store.get(&self.namespace, &self.name).await?;
        info!(request = %self.name, found = existing.is_some(), "renewing identity request");
        match existing {
            None => self.store.create(&self.request).await,
            Some(_) => {
                self.store.update(&self.request).await?;
                self.store.clear_status(&self.namespace, &self.name).await
            }
        }
    }

    async fn poll_status(&self) -> BrokerResult<IssuedToken> {
        let policy = RetryPolicy::new(self.settings.poll_interval, self.settings.wait_timeout, OnTimeout::Error);
        let store = self.store.clone();
        let namespace = self.namespace.clone();
        let name = self.name.clone();
        policy
            .run_with_retry(move || {
                let store = store.clone();
                let namespace = namespace.clone();
                let name = name.clone();
                async move { read_issued_token(store.as_ref(), &namespace, &name).await }
            })
            .await
    }
}

/// Reads status and the referenced secret.
///
/// A missing or partial status is retryable; an unparseable expiry is not.
async fn read_issued_token(
    store: &dyn IdentityRequestStore,
    namespace: &str,
    name: &str,
) -> BrokerResult<IssuedToken> {
    let request = store
        .get(namespace, name)
        .await?
        .ok_or_else(|| BrokerError::transient(format!("identity request {} not found", name)))?;
    let status = request
        .status
        .filter(|status| status.is_populated())
        .ok_or_else(|| BrokerError::transient(format!("identity request {} status not populated", name)))?;

    let expires_at = status.expires_at()?;
    let token = store
        .secret_value(namespace, &status.token_reference.secret_name, &status.token_reference.data_name)
        .await?;
    if token.is_empty() {
        return Err(BrokerError::response(format!(
            "secret {} referenced by {} holds an empty token",
            status.token_reference.secret_name, name
        )));
    }
    debug!(request = name, token_len = token.len(), expires_at = %expires_at, "issued token read");
    Ok(IssuedToken { token, expires_at })
}
