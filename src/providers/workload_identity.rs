use std::path::PathBuf;

use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::parser::parse_federated_token_bundle;
use crate::providers::aad::AadClient;
use crate::token::AccessToken;

/// Where the federated service-account token comes from.
#[derive(Debug, Clone)]
pub enum FederatedTokenSource {
    /// Bundle handed over with the mount request.
    Inline(String),
    /// Projected file rotated by the kubelet; read on every call.
    File(PathBuf),
}

/// AAD federated-credential exchange of a service-account token.
#[derive(Debug, Clone)]
pub struct WorkloadIdentityProvider {
    aad: AadClient,
    tenant_id: String,
    client_id: String,
    resource: String,
    source: FederatedTokenSource,
}

impl WorkloadIdentityProvider {
    pub fn new(aad: AadClient, tenant_id: &str, client_id: &str, resource: &str, source: FederatedTokenSource) -> Self {
        Self {
            aad,
            tenant_id: tenant_id.to_owned(),
            client_id: client_id.to_owned(),
            resource: resource.to_owned(),
            source,
        }
    }

    /// The assertion to exchange: either a token bundle or a bare JWT.
    async fn federated_token(&self) -> BrokerResult<String> {
        let content = match &self.source {
            FederatedTokenSource::Inline(bundle) => bundle.clone(),
            FederatedTokenSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                BrokerError::config(format!("failed to read token file {}: {}", path.display(), e))
            })?,
        };
        let content = content.trim();
        if content.starts_with('{') {
            parse_federated_token_bundle(content)
        } else if content.is_empty() {
            Err(BrokerError::parse("federated token is empty"))
        } else {
            Ok(content.to_owned())
        }
    }

    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        let assertion = self.federated_token().await?;
        debug!(client_id = %self.client_id, assertion_len = assertion.len(), "exchanging federated token");
        self.aad
            .federated_token(&self.tenant_id, &self.client_id, &assertion, &self.resource)
            .await?
            .into_access_token()
    }
}
