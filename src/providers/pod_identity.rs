use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{BrokerError, BrokerResult};
use crate::parser::AadToken;
use crate::token::AccessToken;

pub const POD_NAME_HEADER: &str = "podname";
pub const POD_NAMESPACE_HEADER: &str = "podns";

/// Body returned by the node managed identity (NMI) endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NmiResponse {
    #[serde(default)]
    pub token: AadToken,
    #[serde(default, rename = "clientid")]
    pub client_id: String,
}

/// Token for the identity bound to a pod, handed out by the node-local NMI proxy.
///
/// NMI performs the AAD exchange for the pod's identity, so the returned token is
/// already issued for `resource` in the identity's tenant and is used as-is.
#[derive(Debug, Clone)]
pub struct PodIdentityProvider {
    http: Client,
    /// `http://<nmi-host>:<port>`
    nmi_endpoint: String,
    pod_name: String,
    pod_namespace: String,
    resource: String,
}

impl PodIdentityProvider {
    pub fn new(http: Client, nmi_host: &str, nmi_port: &str, pod_name: &str, pod_namespace: &str, resource: &str) -> Self {
        Self {
            http,
            nmi_endpoint: format!("http://{}:{}", nmi_host, nmi_port),
            pod_name: pod_name.to_owned(),
            pod_namespace: pod_namespace.to_owned(),
            resource: resource.to_owned(),
        }
    }

    /// The validated NMI answer: a token plus the client id of the identity it belongs to.
    pub async fn nmi_token(&self) -> BrokerResult<NmiResponse> {
        if self.pod_name.is_empty() {
            return Err(BrokerError::config(
                "pod information is not available. deploy a CSIDriver object to set podInfoOnMount: true",
            ));
        }

        let url = format!("{}/host/token/", self.nmi_endpoint);
        debug!(pod = %self.pod_name, namespace = %self.pod_namespace, "requesting token from NMI");
        let response = self
            .http
            .get(&url)
            .query(&[("resource", self.resource.as_str())])
            .header(POD_NAME_HEADER, &self.pod_name)
            .header(POD_NAMESPACE_HEADER, &self.pod_namespace)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(%status, "NMI request failed");
            return Err(BrokerError::transient(format!(
                "nmi response failed with status code: {}, response body: {}",
                status, body
            )));
        }

        let nmi: NmiResponse = if body.trim().is_empty() {
            NmiResponse::default()
        } else {
            serde_json::from_str(&body)?
        };
        if nmi.token.access_token.is_empty() || nmi.client_id.is_empty() {
            return Err(BrokerError::response(
                "nmi did not return expected values in response: token and clientid",
            ));
        }
        debug!(client_id = %nmi.client_id, "NMI returned a token");
        Ok(nmi)
    }

    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        self.nmi_token().await?.token.into_access_token()
    }
}
