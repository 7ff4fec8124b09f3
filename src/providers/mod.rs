//! Token providers, one per identity mechanism.
//!
//! [`TokenProvider`] is the closed set of mechanisms; [`factory`] picks one from
//! configuration and environment.

pub mod aad;
pub mod aks_credential;
pub mod certificate;
pub mod cluster_identity;
pub mod factory;
pub mod managed_identity;
pub mod null;
pub mod pod_identity;
pub mod service_principal;
pub mod signed_message;
pub mod workload_identity;

use std::time::Instant;

use tracing::{debug, warn};

use crate::error::BrokerResult;
use crate::observability::metrics::BrokerMetrics;
use crate::token::AccessToken;

pub use aad::AadClient;
pub use aks_credential::{AksCredential, AksCredentialProvider};
pub use certificate::CertificateProvider;
pub use cluster_identity::ClusterIdentityProvider;
pub use factory::ProviderFactory;
pub use managed_identity::VmManagedIdentityProvider;
pub use null::NullProvider;
pub use pod_identity::PodIdentityProvider;
pub use service_principal::ServicePrincipalProvider;
pub use signed_message::{ResourceMetadata, SignedMessageProvider, SigningScheme};
pub use workload_identity::{FederatedTokenSource, WorkloadIdentityProvider};

/// One identity mechanism, ready to hand out tokens.
///
/// `get_token` takes `&mut self`: callers sharing a provider serialize access themselves.
#[derive(Debug)]
pub enum TokenProvider {
    PodIdentity(PodIdentityProvider),
    VmManagedIdentity(VmManagedIdentityProvider),
    WorkloadIdentity(WorkloadIdentityProvider),
    ServicePrincipal(ServicePrincipalProvider),
    Certificate(CertificateProvider),
    SignedMessage(SignedMessageProvider),
    ClusterIdentity(ClusterIdentityProvider),
    AksCredential(AksCredentialProvider),
    Null(NullProvider),
}

impl TokenProvider {
    pub fn name(&self) -> &'static str {
        match self {
            TokenProvider::PodIdentity(_) => "pod_identity",
            TokenProvider::VmManagedIdentity(_) => "vm_managed_identity",
            TokenProvider::WorkloadIdentity(_) => "workload_identity",
            TokenProvider::ServicePrincipal(_) => "service_principal",
            TokenProvider::Certificate(_) => "certificate",
            TokenProvider::SignedMessage(_) => "signed_message",
            TokenProvider::ClusterIdentity(_) => "cluster_identity",
            TokenProvider::AksCredential(_) => "aks_credential",
            TokenProvider::Null(_) => "null",
        }
    }

    pub async fn get_token(&mut self) -> BrokerResult<AccessToken> {
        match self {
            TokenProvider::PodIdentity(provider) => provider.get_token().await,
            TokenProvider::VmManagedIdentity(provider) => provider.get_token().await,
            TokenProvider::WorkloadIdentity(provider) => provider.get_token().await,
            TokenProvider::ServicePrincipal(provider) => provider.get_token().await,
            TokenProvider::Certificate(provider) => provider.get_token().await,
            TokenProvider::SignedMessage(provider) => provider.get_token().await,
            TokenProvider::ClusterIdentity(provider) => provider.get_token().await,
            TokenProvider::AksCredential(provider) => provider.get_token().await,
            TokenProvider::Null(provider) => provider.get_token().await,
        }
    }

    /// [`get_token`](Self::get_token), recording request, failure and expiry metrics.
    pub async fn get_token_observed(&mut self, metrics: &BrokerMetrics) -> BrokerResult<AccessToken> {
        let provider = self.name();
        let start = Instant::now();
        let result = self.get_token().await;
        let elapsed = start.elapsed().as_secs_f64();
        match &result {
            Ok(token) => {
                debug!(
                    provider,
                    header = token.header_name(),
                    expires_at = ?token.expires_at(),
                    token_len = token.token().len(),
                    "token issued"
                );
                metrics.record_success(provider, token, elapsed);
            }
            Err(e) => {
                warn!(provider, kind = e.kind(), error = %e, "token request failed");
                metrics.record_failure(provider, e, elapsed);
            }
        }
        result
    }
}
