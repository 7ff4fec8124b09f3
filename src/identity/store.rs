use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::identity::crd::AzureClusterIdentityRequest;

/// The subset of the Kubernetes API the identity request exchange needs.
#[async_trait]
pub trait IdentityRequestStore: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get(&self, namespace: &str, name: &str) -> BrokerResult<Option<AzureClusterIdentityRequest>>;

    async fn create(&self, request: &AzureClusterIdentityRequest) -> BrokerResult<()>;

    /// Replaces the spec of an existing object.
    async fn update(&self, request: &AzureClusterIdentityRequest) -> BrokerResult<()>;

    /// Resets the status subresource to empty.
    async fn clear_status(&self, namespace: &str, name: &str) -> BrokerResult<()>;

    /// Value of `key` inside Secret `namespace/name`.
    async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> BrokerResult<String>;
}

/// [`IdentityRequestStore`] backed by the cluster API server.
#[derive(Clone)]
pub struct KubeIdentityStore {
    client: Client,
}

impl KubeIdentityStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn requests(&self, namespace: &str) -> Api<AzureClusterIdentityRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of(request: &AzureClusterIdentityRequest) -> BrokerResult<&str> {
        request
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| BrokerError::config("identity request has no namespace"))
    }

    fn name_of(request: &AzureClusterIdentityRequest) -> BrokerResult<&str> {
        request
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| BrokerError::config("identity request has no name"))
    }
}

#[async_trait]
impl IdentityRequestStore for KubeIdentityStore {
    async fn get(&self, namespace: &str, name: &str) -> BrokerResult<Option<AzureClusterIdentityRequest>> {
        Ok(self.requests(namespace).get_opt(name).await?)
    }

    async fn create(&self, request: &AzureClusterIdentityRequest) -> BrokerResult<()> {
        let namespace = Self::namespace_of(request)?;
        self.requests(namespace).create(&PostParams::default(), request).await?;
        debug!(request = ?request.metadata.name, "identity request created");
        Ok(())
    }

    async fn update(&self, request: &AzureClusterIdentityRequest) -> BrokerResult<()> {
        let namespace = Self::namespace_of(request)?;
        let name = Self::name_of(request)?;
        let api = self.requests(namespace);
        // replace needs the current resourceVersion
        let mut desired = request.clone();
        if let Some(current) = api.get_opt(name).await? {
            desired.metadata.resource_version = current.metadata.resource_version;
        }
        api.replace(name, &PostParams::default(), &desired).await?;
        debug!(request = name, "identity request updated");
        Ok(())
    }

    async fn clear_status(&self, namespace: &str, name: &str) -> BrokerResult<()> {
        let patch = json!({ "status": null });
        self.requests(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> BrokerResult<String> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets.get(name).await?;
        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|value| value.0.clone())
            .ok_or_else(|| BrokerError::response(format!("secret {}/{} has no key '{}'", namespace, name, key)))?;
        String::from_utf8(bytes)
            .map_err(|e| BrokerError::parse(format!("secret {}/{} key '{}' is not utf-8: {}", namespace, name, key, e)))
    }
}
