use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{BrokerError, BrokerResult};

pub const CLIENT_ID_KEY: &str = "clientid";
pub const CLIENT_SECRET_KEY: &str = "clientsecret";

/// Credential mechanism configuration of the secrets-provider process.
///
/// Exactly one family is active; pod identity and VM managed identity exclude each other.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub use_pod_identity: bool,
    #[serde(default, rename = "useVMManagedIdentity")]
    pub use_vm_managed_identity: bool,
    #[serde(default, rename = "userAssignedIdentityID")]
    pub user_assigned_identity_id: String,
    #[serde(default, rename = "workloadIdentityClientID")]
    pub workload_identity_client_id: String,
    /// service-account token bundle handed over by the CSI driver
    #[serde(default)]
    pub workload_identity_token: String,
    /// projected bundle on disk, re-read on every refresh; wins over the inline token
    #[serde(default)]
    pub workload_identity_token_file: Option<PathBuf>,
    #[serde(default)]
    pub service_principal_credentials: HashMap<String, String>,
}

/// The mechanism family an [`AuthConfig`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMechanism {
    PodIdentity,
    VmManagedIdentity { user_assigned_identity_id: Option<String> },
    WorkloadIdentity,
    ServicePrincipal,
}

impl AuthConfig {
    pub fn validate(&self) -> BrokerResult<()> {
        if self.use_pod_identity && self.use_vm_managed_identity {
            return Err(BrokerError::config(
                "cannot enable both pod identity and user-assigned managed identity",
            ));
        }
        if !self.use_pod_identity && !self.use_vm_managed_identity {
            if !self.workload_identity_client_id.is_empty() {
                if self.workload_identity_token.is_empty() && self.workload_identity_token_file.is_none() {
                    return Err(BrokerError::config(
                        "workload identity requires a service account token or a token file",
                    ));
                }
                return Ok(());
            }
            if self.client_id().is_empty() {
                return Err(BrokerError::config("could not find clientid in secrets"));
            }
            if self.client_secret().is_empty() {
                return Err(BrokerError::config("could not find clientsecret in secrets"));
            }
        }
        Ok(())
    }

    /// Precedence: pod identity, VM managed identity, workload identity, service principal.
    pub fn mechanism(&self) -> AuthMechanism {
        if self.use_pod_identity {
            AuthMechanism::PodIdentity
        } else if self.use_vm_managed_identity {
            let user_assigned_identity_id =
                Some(self.user_assigned_identity_id.clone()).filter(|id| !id.is_empty());
            AuthMechanism::VmManagedIdentity { user_assigned_identity_id }
        } else if !self.workload_identity_client_id.is_empty() {
            AuthMechanism::WorkloadIdentity
        } else {
            AuthMechanism::ServicePrincipal
        }
    }

    pub fn client_id(&self) -> &str {
        self.service_principal_credentials
            .get(CLIENT_ID_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn client_secret(&self) -> &str {
        self.service_principal_credentials
            .get(CLIENT_SECRET_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}
