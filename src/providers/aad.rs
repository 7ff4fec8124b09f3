use reqwest::{Client, Response};
use tokio::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{BrokerError, BrokerResult};
use crate::parser::AadToken;
use crate::utils::constants::{DEFAULT_IMDS_ENDPOINT, IMDS_API_VERSION};

pub const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Build the HTTP client shared by all providers; every call is bounded by `timeout_ms`.
pub fn build_http_client(timeout_ms: u64) -> BrokerResult<Client> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| BrokerError::config(format!("failed to build http client: {}", e)))
}

/// Resource for v2 endpoints, which take scopes instead of resources.
pub fn format_scope(resource: &str) -> String {
    if resource.ends_with("/.default") {
        resource.to_string()
    } else {
        format!("{}/.default", resource.trim_end_matches('/'))
    }
}

/// OAuth2 calls against AAD and the instance metadata service.
#[derive(Debug, Clone)]
pub struct AadClient {
    http: Client,
    /// active directory endpoint, always ending in '/'
    authority: String,
    imds_endpoint: String,
}

impl AadClient {
    pub fn new(http: Client, authority: &str) -> Self {
        let authority = if authority.ends_with('/') {
            authority.to_owned()
        } else {
            format!("{}/", authority)
        };
        Self {
            http,
            authority,
            imds_endpoint: DEFAULT_IMDS_ENDPOINT.to_owned(),
        }
    }

    pub fn with_imds_endpoint(mut self, endpoint: &str) -> Self {
        self.imds_endpoint = endpoint.to_owned();
        self
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// v1 token endpoint, also the audience of certificate assertions.
    pub fn token_endpoint(&self, tenant_id: &str) -> String {
        format!("{}{}/oauth2/token", self.authority, tenant_id)
    }

    pub fn token_endpoint_v2(&self, tenant_id: &str) -> String {
        format!("{}{}/oauth2/v2.0/token", self.authority, tenant_id)
    }

    pub async fn client_secret_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        resource: &str,
    ) -> BrokerResult<AadToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("resource", resource),
        ];
        self.post_form(&self.token_endpoint(tenant_id), &params).await
    }

    pub async fn client_assertion_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        assertion: &str,
        resource: &str,
    ) -> BrokerResult<AadToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE),
            ("client_assertion", assertion),
            ("resource", resource),
        ];
        self.post_form(&self.token_endpoint(tenant_id), &params).await
    }

    /// Exchange a federated (service account) token for an access token.
    pub async fn federated_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        federated_token: &str,
        resource: &str,
    ) -> BrokerResult<AadToken> {
        let scope = format_scope(resource);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE),
            ("client_assertion", federated_token),
            ("scope", scope.as_str()),
        ];
        self.post_form(&self.token_endpoint_v2(tenant_id), &params).await
    }

    /// System-assigned identity unless `client_id` names a user-assigned one.
    pub async fn imds_token(&self, resource: &str, client_id: Option<&str>) -> BrokerResult<AadToken> {
        let mut url = Url::parse(&self.imds_endpoint)
            .map_err(|e| BrokerError::config(format!("invalid IMDS endpoint '{}': {}", self.imds_endpoint, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", IMDS_API_VERSION);
            query.append_pair("resource", resource);
            if let Some(client_id) = client_id {
                query.append_pair("client_id", client_id);
            }
        }
        debug!(endpoint = %self.imds_endpoint, user_assigned = client_id.is_some(), "requesting IMDS token");
        let response = self.http.get(url).header("Metadata", "true").send().await?;
        read_token_response(response).await
    }

    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> BrokerResult<AadToken> {
        debug!(url, "requesting AAD token");
        let response = self.http.post(url).form(params).send().await?;
        read_token_response(response).await
    }
}

/// Non-success statuses are transient; a body that is not a token is a parse error.
pub async fn read_token_response(response: Response) -> BrokerResult<AadToken> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(BrokerError::transient(format!(
            "token request failed with status {}: {}",
            status, body
        )));
    }
    Ok(serde_json::from_str(&body)?)
}
