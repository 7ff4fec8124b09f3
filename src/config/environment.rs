use std::collections::HashMap;

use crate::utils::constants::{
    ACTIVE_DIRECTORY_ENDPOINT_PUBLIC, ACTIVE_DIRECTORY_ENDPOINT_US_GOV, DEFAULT_AKS_CREDENTIAL_LOCATION,
};

pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const AZURE_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";
pub const AZURE_RESOURCE_NAME: &str = "AZURE_RESOURCE_NAME";
pub const AZURE_REGION: &str = "AZURE_REGION";
pub const CLUSTER_TYPE: &str = "CLUSTER_TYPE";
pub const MANAGED_IDENTITY_AUTH: &str = "MANAGED_IDENTITY_AUTH";
pub const NO_AUTH_HEADER_DATA_PLANE: &str = "NO_AUTH_HEADER_DATA_PLANE";
pub const DEBUG_LOGGING: &str = "DEBUG_LOGGING";
pub const AKS_CREDENTIAL_LOCATION: &str = "AKS_CREDENTIAL_LOCATION";
pub const AKS_USER_ASSIGNED_IDENTITY_CLIENT_ID: &str = "AKS_USER_ASSIGNED_IDENTITY_CLIENT_ID";
pub const SECRET_NAME: &str = "SECRET_NAME";
pub const SECRET_NAMESPACE: &str = "SECRET_NAMESPACE";
pub const POD_NAME: &str = "POD_NAME";
pub const POD_NAMESPACE: &str = "POD_NAMESPACE";

/// Key-value view over the process environment.
pub trait EnvLookup: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;

    /// Empty when unset.
    fn string(&self, key: &str) -> String {
        self.lookup(key).unwrap_or_default()
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.lookup(key)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }

    /// Unparseable values fall back to `default`.
    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.lookup(key)
            .and_then(|value| parse_bool(&value))
            .unwrap_or(default)
    }
}

/// Same literals Go's `strconv.ParseBool` accepts, which is what the cluster agents emit.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvLookup for MapEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Environment-derived settings, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEnvironment {
    pub tenant_id: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub resource_name: String,
    pub region: String,
    pub cluster_type: String,
    pub managed_identity_auth: bool,
    pub null_auth: bool,
    pub debug_logging: bool,
    pub aks_credential_location: String,
    pub aks_user_assigned_identity_client_id: String,
    pub private_key_secret_name: String,
    pub private_key_secret_namespace: String,
    pub pod_name: String,
    pub pod_namespace: String,
}

impl AgentEnvironment {
    pub fn from_lookup(env: &dyn EnvLookup) -> Self {
        Self {
            tenant_id: env.string(AZURE_TENANT_ID),
            subscription_id: env.string(AZURE_SUBSCRIPTION_ID),
            resource_group: env.string(AZURE_RESOURCE_GROUP),
            resource_name: env.string(AZURE_RESOURCE_NAME),
            region: env.string(AZURE_REGION),
            cluster_type: env.string(CLUSTER_TYPE),
            managed_identity_auth: env.bool_or(MANAGED_IDENTITY_AUTH, false),
            null_auth: env.bool_or(NO_AUTH_HEADER_DATA_PLANE, false),
            debug_logging: env.bool_or(DEBUG_LOGGING, false),
            aks_credential_location: env.string_or(AKS_CREDENTIAL_LOCATION, DEFAULT_AKS_CREDENTIAL_LOCATION),
            aks_user_assigned_identity_client_id: env.string(AKS_USER_ASSIGNED_IDENTITY_CLIENT_ID),
            private_key_secret_name: env.string(SECRET_NAME),
            private_key_secret_namespace: env.string(SECRET_NAMESPACE),
            pod_name: env.string(POD_NAME),
            pod_namespace: env.string(POD_NAMESPACE),
        }
    }

    pub fn from_process() -> Self {
        Self::from_lookup(&ProcessEnv)
    }

    /// Sovereign US government regions authenticate against their own authority.
    pub fn active_directory_endpoint(&self) -> &'static str {
        let region = self.region.to_lowercase();
        if region.starts_with("usgov") || region.starts_with("usdod") {
            ACTIVE_DIRECTORY_ENDPOINT_US_GOV
        } else {
            ACTIVE_DIRECTORY_ENDPOINT_PUBLIC
        }
    }
}
