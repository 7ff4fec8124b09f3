use tracing::debug;

use crate::error::BrokerResult;
use crate::providers::aad::AadClient;
use crate::token::AccessToken;

/// Identity assigned to the VM (system-assigned, or user-assigned when an id is given).
#[derive(Debug, Clone)]
pub struct VmManagedIdentityProvider {
    aad: AadClient,
    resource: String,
    user_assigned_identity_id: Option<String>,
}

impl VmManagedIdentityProvider {
    pub fn new(aad: AadClient, resource: &str, user_assigned_identity_id: Option<String>) -> Self {
        Self {
            aad,
            resource: resource.to_owned(),
            user_assigned_identity_id: user_assigned_identity_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn is_user_assigned(&self) -> bool {
        self.user_assigned_identity_id.is_some()
    }

    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        debug!(user_assigned = self.is_user_assigned(), "requesting VM managed identity token");
        self.aad
            .imds_token(&self.resource, self.user_assigned_identity_id.as_deref())
            .await?
            .into_access_token()
    }
}
