use std::fmt;

use crate::error::{BrokerError, BrokerResult};
use crate::providers::aad::AadClient;
use crate::token::AccessToken;

/// Client-credentials flow with a statically configured secret.
#[derive(Clone)]
pub struct ServicePrincipalProvider {
    aad: AadClient,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    resource: String,
}

impl fmt::Debug for ServicePrincipalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipalProvider")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("resource", &self.resource)
            .finish()
    }
}

impl ServicePrincipalProvider {
    pub fn new(
        aad: AadClient,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        resource: &str,
    ) -> BrokerResult<Self> {
        if client_id.is_empty() {
            return Err(BrokerError::config("could not find clientid in secrets"));
        }
        if client_secret.is_empty() {
            return Err(BrokerError::config("could not find clientsecret in secrets"));
        }
        Ok(Self {
            aad,
            tenant_id: tenant_id.to_owned(),
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            resource: resource.to_owned(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        self.aad
            .client_secret_token(&self.tenant_id, &self.client_id, &self.client_secret, &self.resource)
            .await?
            .into_access_token()
    }
}
