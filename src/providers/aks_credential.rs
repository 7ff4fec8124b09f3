use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{BrokerError, BrokerResult};
use crate::providers::aad::AadClient;
use crate::token::AccessToken;
use crate::utils::constants::MANAGED_CLUSTER_AUDIENCE;

/// Credential file written onto AKS nodes.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AksCredential {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub aad_client_id: String,
    #[serde(default)]
    pub aad_client_secret: String,
    #[serde(default)]
    pub use_managed_identity_extension: bool,
}

impl fmt::Debug for AksCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AksCredential")
            .field("tenant_id", &self.tenant_id)
            .field("aad_client_id", &self.aad_client_id)
            .field("use_managed_identity_extension", &self.use_managed_identity_extension)
            .finish()
    }
}

impl AksCredential {
    pub fn from_file(path: &Path) -> BrokerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::config(format!("failed to read AKS credential file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| BrokerError::parse(format!("invalid AKS credential file {}: {}", path.display(), e)))
    }
}

/// Bearer token for a managed cluster, from the node's user-assigned identity or its service principal.
#[derive(Debug, Clone)]
pub struct AksCredentialProvider {
    aad: AadClient,
    credential: AksCredential,
    user_assigned_identity_client_id: String,
    audience: String,
}

impl AksCredentialProvider {
    pub fn new(aad: AadClient, credential: AksCredential, user_assigned_identity_client_id: &str) -> Self {
        Self {
            aad,
            credential,
            user_assigned_identity_client_id: user_assigned_identity_client_id.to_owned(),
            audience: MANAGED_CLUSTER_AUDIENCE.to_owned(),
        }
    }

    pub fn uses_managed_identity(&self) -> bool {
        self.credential.use_managed_identity_extension
    }

    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        let token = if self.credential.use_managed_identity_extension {
            debug!(client_id = %self.user_assigned_identity_client_id, "requesting AKS managed identity token");
            let client_id = Some(self.user_assigned_identity_client_id.as_str()).filter(|id| !id.is_empty());
            self.aad.imds_token(&self.audience, client_id).await
        } else {
            debug!(client_id = %self.credential.aad_client_id, "requesting AKS service principal token");
            self.aad
                .client_secret_token(
                    &self.credential.tenant_id,
                    &self.credential.aad_client_id,
                    &self.credential.aad_client_secret,
                    &self.audience,
                )
                .await
        };
        token
            .inspect_err(|e| error!(error = %e, "failed to get AKS cluster token"))?
            .into_access_token()
    }
}
