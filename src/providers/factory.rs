use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio::time::Duration;
use tracing::{error, info};

use crate::config::auth::{AuthConfig, AuthMechanism};
use crate::config::environment::AgentEnvironment;
use crate::config::settings::{BootstrapConfig, BrokerConfig, ProviderConfig, ProviderOverride};
use crate::error::{BrokerError, BrokerResult};
use crate::identity::{ExchangeSettings, IdentityRequestStore};
use crate::observability::metrics::BrokerMetrics;
use crate::providers::aad::AadClient;
use crate::providers::aks_credential::{AksCredential, AksCredentialProvider};
use crate::providers::certificate::CertificateProvider;
use crate::providers::cluster_identity::ClusterIdentityProvider;
use crate::providers::managed_identity::VmManagedIdentityProvider;
use crate::providers::null::NullProvider;
use crate::providers::pod_identity::PodIdentityProvider;
use crate::providers::service_principal::ServicePrincipalProvider;
use crate::providers::signed_message::{ResourceMetadata, SignedMessageProvider};
use crate::providers::workload_identity::{FederatedTokenSource, WorkloadIdentityProvider};
use crate::providers::TokenProvider;
use crate::resilience::{OnTimeout, RetryPolicy};
use crate::utils::constants::{
    APPLIANCE_AUDIENCE, CLUSTER_TYPE_APPLIANCE, CLUSTER_TYPE_CONNECTED, CLUSTER_TYPE_MANAGED,
    CONNECTED_CLUSTER_AUDIENCE, DEFAULT_VAULT_RESOURCE, PRIVATE_KEY_DATA_KEY,
};

/// The mechanism a configuration resolves to, before anything is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    PodIdentity,
    VmManagedIdentity { user_assigned_identity_id: Option<String> },
    WorkloadIdentity,
    ServicePrincipal,
    Certificate,
    SignedMessage,
    ClusterIdentity,
    AksCredential,
    Null,
}

impl ProviderKind {
    /// Variants that talk to the Kubernetes API.
    pub fn needs_identity_store(&self) -> bool {
        matches!(self, ProviderKind::ClusterIdentity | ProviderKind::SignedMessage)
    }
}

/// First-party app id used as the identity request audience for a cluster type.
pub fn audience_for_cluster_type(cluster_type: &str) -> &'static str {
    if cluster_type.eq_ignore_ascii_case(CLUSTER_TYPE_APPLIANCE) {
        APPLIANCE_AUDIENCE
    } else {
        CONNECTED_CLUSTER_AUDIENCE
    }
}

/// Precedence: explicit override, then the auth section (pod identity, VM identity,
/// workload identity, service principal), then the cluster-type default.
pub fn select_provider(
    override_value: ProviderOverride,
    auth: Option<&AuthConfig>,
    cluster_type: &str,
    env: &AgentEnvironment,
) -> BrokerResult<ProviderKind> {
    match override_value {
        ProviderOverride::SignedMessage => return Ok(ProviderKind::SignedMessage),
        ProviderOverride::ManagedIdentity => return Ok(ProviderKind::ClusterIdentity),
        ProviderOverride::BearerTokenClientId => return Ok(ProviderKind::AksCredential),
        ProviderOverride::BearerTokenCertificate => return Ok(ProviderKind::Certificate),
        ProviderOverride::NoOverride => {}
    }

    if let Some(auth) = auth {
        auth.validate()?;
        return Ok(match auth.mechanism() {
            AuthMechanism::PodIdentity => ProviderKind::PodIdentity,
            AuthMechanism::VmManagedIdentity { user_assigned_identity_id } => {
                ProviderKind::VmManagedIdentity { user_assigned_identity_id }
            }
            AuthMechanism::WorkloadIdentity => ProviderKind::WorkloadIdentity,
            AuthMechanism::ServicePrincipal => ProviderKind::ServicePrincipal,
        });
    }

    match cluster_type.to_lowercase().as_str() {
        CLUSTER_TYPE_MANAGED => Ok(ProviderKind::AksCredential),
        CLUSTER_TYPE_CONNECTED | CLUSTER_TYPE_APPLIANCE => {
            if env.null_auth {
                Ok(ProviderKind::Null)
            } else if env.managed_identity_auth {
                Ok(ProviderKind::ClusterIdentity)
            } else {
                Ok(ProviderKind::SignedMessage)
            }
        }
        "" => Err(BrokerError::config("no provider override, auth section or cluster type configured")),
        other => Err(BrokerError::config(format!("unsupported cluster type '{}'", other))),
    }
}

/// Builds the [`TokenProvider`] a configuration asks for.
pub struct ProviderFactory {
    provider: ProviderConfig,
    auth: Option<AuthConfig>,
    env: AgentEnvironment,
    http: Client,
    exchange: ExchangeSettings,
    bootstrap: BootstrapConfig,
    store: Option<(Arc<dyn IdentityRequestStore>, String)>,
    metrics: Option<Arc<BrokerMetrics>>,
}

impl ProviderFactory {
    pub fn new(config: &BrokerConfig, env: AgentEnvironment, http: Client) -> Self {
        Self {
            provider: config.provider.clone(),
            auth: config.auth.clone(),
            env,
            http,
            exchange: ExchangeSettings::from(&config.settings.exchange),
            bootstrap: config.settings.bootstrap.clone(),
            store: None,
            metrics: None,
        }
    }

    /// Object store plus the management namespace identity requests live in.
    pub fn with_identity_store(mut self, store: Arc<dyn IdentityRequestStore>, namespace: &str) -> Self {
        self.store = Some((store, namespace.to_owned()));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<BrokerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cluster_type(&self) -> &str {
        self.provider.cluster_type.as_deref().unwrap_or(&self.env.cluster_type)
    }

    pub fn resource(&self) -> &str {
        self.provider.resource.as_deref().unwrap_or(DEFAULT_VAULT_RESOURCE)
    }

    pub fn audience(&self) -> &str {
        self.provider
            .audience
            .as_deref()
            .unwrap_or_else(|| audience_for_cluster_type(self.cluster_type()))
    }

    pub fn kind(&self) -> BrokerResult<ProviderKind> {
        select_provider(self.provider.override_value, self.auth.as_ref(), self.cluster_type(), &self.env)
    }

    pub fn aad_client(&self) -> AadClient {
        let authority = self
            .provider
            .authority_host
            .as_deref()
            .unwrap_or_else(|| self.env.active_directory_endpoint());
        let aad = AadClient::new(self.http.clone(), authority);
        match &self.provider.imds_endpoint {
            Some(endpoint) => aad.with_imds_endpoint(endpoint),
            None => aad,
        }
    }

    fn identity_store(&self) -> BrokerResult<(Arc<dyn IdentityRequestStore>, String)> {
        self.store
            .clone()
            .ok_or_else(|| BrokerError::config("this provider needs access to the Kubernetes API"))
    }

    fn auth(&self) -> BrokerResult<&AuthConfig> {
        self.auth
            .as_ref()
            .ok_or_else(|| BrokerError::config("auth section is required for this provider"))
    }

    pub async fn build(&self) -> BrokerResult<TokenProvider> {
        let kind = self.kind()?;
        info!(provider = ?kind, cluster_type = self.cluster_type(), "selected token provider");
        let provider = match kind {
            ProviderKind::PodIdentity => TokenProvider::PodIdentity(PodIdentityProvider::new(
                self.http.clone(),
                &self.provider.nmi.host,
                &self.provider.nmi.port,
                &self.env.pod_name,
                &self.env.pod_namespace,
                self.resource(),
            )),
            ProviderKind::VmManagedIdentity { user_assigned_identity_id } => TokenProvider::VmManagedIdentity(
                VmManagedIdentityProvider::new(self.aad_client(), self.resource(), user_assigned_identity_id),
            ),
            ProviderKind::WorkloadIdentity => {
                let auth = self.auth()?;
                let source = match &auth.workload_identity_token_file {
                    Some(path) => FederatedTokenSource::File(path.clone()),
                    None => FederatedTokenSource::Inline(auth.workload_identity_token.clone()),
                };
                TokenProvider::WorkloadIdentity(WorkloadIdentityProvider::new(
                    self.aad_client(),
                    &self.env.tenant_id,
                    &auth.workload_identity_client_id,
                    self.resource(),
                    source,
                ))
            }
            ProviderKind::ServicePrincipal => {
                let auth = self.auth()?;
                TokenProvider::ServicePrincipal(ServicePrincipalProvider::new(
                    self.aad_client(),
                    &self.env.tenant_id,
                    auth.client_id(),
                    auth.client_secret(),
                    self.resource(),
                )?)
            }
            ProviderKind::Certificate => TokenProvider::Certificate(self.certificate_provider()?),
            ProviderKind::SignedMessage => TokenProvider::SignedMessage(self.signed_message_provider().await?),
            ProviderKind::ClusterIdentity => {
                TokenProvider::ClusterIdentity(self.cluster_identity_provider(self.audience(), "")?)
            }
            ProviderKind::AksCredential => {
                let credential = AksCredential::from_file(Path::new(&self.env.aks_credential_location))?;
                TokenProvider::AksCredential(AksCredentialProvider::new(
                    self.aad_client(),
                    credential,
                    &self.env.aks_user_assigned_identity_client_id,
                ))
            }
            ProviderKind::Null => TokenProvider::Null(NullProvider),
        };
        Ok(provider)
    }

    /// Cluster identity provider whose requests are bound to an extension.
    pub fn extension_provider(&self, audience: &str, extension_name: &str) -> BrokerResult<TokenProvider> {
        Ok(TokenProvider::ClusterIdentity(self.cluster_identity_provider(audience, extension_name)?))
    }

    fn cluster_identity_provider(&self, audience: &str, resource_id: &str) -> BrokerResult<ClusterIdentityProvider> {
        let (store, namespace) = self.identity_store()?;
        let provider = ClusterIdentityProvider::new(store, &namespace, audience, resource_id, self.exchange.clone());
        Ok(match &self.metrics {
            Some(metrics) => provider.with_metrics(metrics.clone()),
            None => provider,
        })
    }

    fn certificate_provider(&self) -> BrokerResult<CertificateProvider> {
        let files = self
            .provider
            .certificate
            .as_ref()
            .ok_or_else(|| BrokerError::config("provider.certificate is required for certificate auth"))?;
        let certificate_pem = read_pem(&files.certificate_path)?;
        let private_key_pem = read_pem(&files.private_key_path)?;
        CertificateProvider::new(
            self.aad_client(),
            &self.env.tenant_id,
            &files.client_id,
            &files.resource,
            &certificate_pem,
            &private_key_pem,
        )
    }

    /// Waits (bounded, fatal on timeout) for the onboarding key secret to appear.
    async fn signed_message_provider(&self) -> BrokerResult<SignedMessageProvider> {
        let (store, _) = self.identity_store()?;
        let secret_name = self.env.private_key_secret_name.clone();
        let secret_namespace = self.env.private_key_secret_namespace.clone();
        if secret_name.is_empty() || secret_namespace.is_empty() {
            return Err(BrokerError::config("SECRET_NAME and SECRET_NAMESPACE must name the onboarding key secret"));
        }

        let policy = RetryPolicy::new(
            Duration::from_secs(self.bootstrap.retry_interval_seconds),
            Duration::from_secs(self.bootstrap.deadline_seconds),
            OnTimeout::Fatal,
        );
        let private_key = policy
            .run_or_exit(move || {
                let store = store.clone();
                let secret_name = secret_name.clone();
                let secret_namespace = secret_namespace.clone();
                async move { store.secret_value(&secret_namespace, &secret_name, PRIVATE_KEY_DATA_KEY).await }
            })
            .await
            .inspect_err(|e| error!(error = %e, "unable to retrieve the onboarding secret"))?;

        let metadata = ResourceMetadata {
            subscription_id: self.env.subscription_id.clone(),
            resource_group: self.env.resource_group.clone(),
            cluster_type: self.env.cluster_type.clone(),
            resource_name: self.env.resource_name.clone(),
        };
        SignedMessageProvider::new(metadata, &private_key, self.provider.signing_scheme)
    }
}

fn read_pem(path: &Path) -> BrokerResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| BrokerError::config(format!("failed to read {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::auth::{CLIENT_ID_KEY, CLIENT_SECRET_KEY};

    fn env() -> AgentEnvironment {
        AgentEnvironment::default()
    }

    #[test]
    fn override_wins_over_everything() {
        let auth = AuthConfig { use_pod_identity: true, ..Default::default() };
        let kind = select_provider(ProviderOverride::BearerTokenCertificate, Some(&auth), "managedclusters", &env());
        assert_eq!(kind.unwrap(), ProviderKind::Certificate);
        let kind = select_provider(ProviderOverride::ManagedIdentity, None, "", &env());
        assert_eq!(kind.unwrap(), ProviderKind::ClusterIdentity);
    }

    #[test]
    fn pod_identity_wins_over_cluster_type() {
        let auth = AuthConfig { use_pod_identity: true, ..Default::default() };
        let kind = select_provider(ProviderOverride::NoOverride, Some(&auth), "connectedclusters", &env());
        assert_eq!(kind.unwrap(), ProviderKind::PodIdentity);
    }

    #[test]
    fn invalid_auth_section_is_rejected() {
        let auth = AuthConfig {
            service_principal_credentials: HashMap::from([
                (CLIENT_ID_KEY.to_owned(), "id".to_owned()),
                (CLIENT_SECRET_KEY.to_owned(), String::new()),
            ]),
            ..Default::default()
        };
        let err = select_provider(ProviderOverride::NoOverride, Some(&auth), "", &env()).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn cluster_type_defaults() {
        let mut env = env();
        assert_eq!(
            select_provider(ProviderOverride::NoOverride, None, "ManagedClusters", &env).unwrap(),
            ProviderKind::AksCredential
        );
        assert_eq!(
            select_provider(ProviderOverride::NoOverride, None, "connectedclusters", &env).unwrap(),
            ProviderKind::SignedMessage
        );
        env.managed_identity_auth = true;
        assert_eq!(
            select_provider(ProviderOverride::NoOverride, None, "appliances", &env).unwrap(),
            ProviderKind::ClusterIdentity
        );
        env.null_auth = true;
        assert_eq!(
            select_provider(ProviderOverride::NoOverride, None, "connectedclusters", &env).unwrap(),
            ProviderKind::Null
        );
        assert!(select_provider(ProviderOverride::NoOverride, None, "provisionedclusters", &env).is_err());
        assert!(select_provider(ProviderOverride::NoOverride, None, "", &env).is_err());
    }

    #[test]
    fn audiences_by_cluster_type() {
        assert_eq!(audience_for_cluster_type("Appliances"), APPLIANCE_AUDIENCE);
        assert_eq!(audience_for_cluster_type("connectedclusters"), CONNECTED_CLUSTER_AUDIENCE);
        assert_eq!(audience_for_cluster_type(""), CONNECTED_CLUSTER_AUDIENCE);
    }
}
