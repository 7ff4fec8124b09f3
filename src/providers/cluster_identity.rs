use std::fmt;
use std::sync::Arc;

use crate::error::BrokerResult;
use crate::identity::{ClusterIdentityExchange, ExchangeSettings, IdentityRequestStore};
use crate::observability::metrics::BrokerMetrics;
use crate::token::AccessToken;

/// Token issued by the cluster's identity controller through an identity request object.
///
/// The exchange is created on the first `get_token` call.
pub struct ClusterIdentityProvider {
    store: Arc<dyn IdentityRequestStore>,
    namespace: String,
    audience: String,
    resource_id: String,
    settings: ExchangeSettings,
    metrics: Option<Arc<BrokerMetrics>>,
    exchange: Option<ClusterIdentityExchange>,
}

impl fmt::Debug for ClusterIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterIdentityProvider")
            .field("namespace", &self.namespace)
            .field("audience", &self.audience)
            .field("resource_id", &self.resource_id)
            .field("initialized", &self.exchange.is_some())
            .finish()
    }
}

impl ClusterIdentityProvider {
    pub fn new(
        store: Arc<dyn IdentityRequestStore>,
        namespace: &str,
        audience: &str,
        resource_id: &str,
        settings: ExchangeSettings,
    ) -> Self {
        Self {
            store,
            namespace: namespace.to_owned(),
            audience: audience.to_owned(),
            resource_id: resource_id.to_owned(),
            settings,
            metrics: None,
            exchange: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<BrokerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn exchange(&self) -> Option<&ClusterIdentityExchange> {
        self.exchange.as_ref()
    }

    pub async fn get_token(&mut self) -> BrokerResult<AccessToken> {
        let exchange = self.exchange.get_or_insert_with(|| {
            let exchange = ClusterIdentityExchange::new(
                self.store.clone(),
                &self.namespace,
                &self.audience,
                &self.resource_id,
                self.settings.clone(),
            );
            match &self.metrics {
                Some(metrics) => exchange.with_metrics(metrics.clone()),
                None => exchange,
            }
        });
        exchange.get_token().await
    }
}
