//! Shared constants and invariants

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

pub const ACTIVE_DIRECTORY_ENDPOINT_PUBLIC: &str = "https://login.microsoftonline.com/";
pub const ACTIVE_DIRECTORY_ENDPOINT_US_GOV: &str = "https://login.microsoftonline.us/";
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
pub const IMDS_API_VERSION: &str = "2018-02-01";

pub const DEFAULT_AKS_CREDENTIAL_LOCATION: &str = "/etc/kubernetes/azure.json";
pub const DEFAULT_MANAGEMENT_NAMESPACE: &str = "azure-arc";
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str = "/run/secrets/kubernetes.io/serviceaccount/namespace";
pub const PRIVATE_KEY_DATA_KEY: &str = "privateKey";

// Supported cluster types
pub const CLUSTER_TYPE_MANAGED: &str = "managedclusters";
pub const CLUSTER_TYPE_CONNECTED: &str = "connectedclusters";
pub const CLUSTER_TYPE_APPLIANCE: &str = "appliances";

// First-party application ids used as token audiences
pub const CONNECTED_CLUSTER_AUDIENCE: &str = "c699bf69-fb1d-4eaf-999b-99e6b2ae4d85";
pub const APPLIANCE_AUDIENCE: &str = "d22ea4d1-2678-4a7b-aa5e-f340c2a7d993";
pub const MANAGED_CLUSTER_AUDIENCE: &str = "03db181c-e9d3-4868-9097-f0b728327182";

/// Resource requested by the secrets-provider mechanisms unless configured otherwise.
pub const DEFAULT_VAULT_RESOURCE: &str = "https://vault.azure.net";
