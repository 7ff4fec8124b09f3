//! Token exchange through `AzureClusterIdentityRequest` objects.

pub mod crd;
pub mod exchange;
pub mod namespace;
pub mod store;

pub use crd::{identity_request_name, AzureClusterIdentityRequest, AzureClusterIdentityRequestStatus, TokenReference};
pub use exchange::{ClusterIdentityExchange, ExchangeSettings, ExchangeState};
pub use namespace::management_namespace;
pub use store::{IdentityRequestStore, KubeIdentityStore};
