use chrono::{DateTime, NaiveDateTime, Utc};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BrokerError, BrokerResult};

pub const IDENTITY_REQUEST_PREFIX: &str = "identity-request-";
/// Format the issuer writes into `status.expirationTime`.
pub const STATUS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Request for a token scoped to `audience` (and optionally an extension `resourceId`).
///
/// The spec is the trigger, the status is the mailbox an out-of-process issuer fills in.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[kube(
    group = "clusterconfig.azure.com",
    version = "v1beta1",
    kind = "AzureClusterIdentityRequest",
    namespaced
)]
#[kube(status = "AzureClusterIdentityRequestStatus", schema = "disabled")]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterIdentityRequestSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audience: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_id: String,
    /// token API version requested from the issuer; empty means the issuer's default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterIdentityRequestStatus {
    #[serde(default)]
    pub token_reference: TokenReference,
    #[serde(default)]
    pub expiration_time: String,
}

/// Secret (and data key inside it) holding the issued token.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenReference {
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub data_name: String,
}

impl AzureClusterIdentityRequestStatus {
    /// All three fields are set by the issuer at once; anything less means "not issued yet".
    pub fn is_populated(&self) -> bool {
        !self.token_reference.secret_name.is_empty()
            && !self.token_reference.data_name.is_empty()
            && !self.expiration_time.is_empty()
    }

    pub fn expires_at(&self) -> BrokerResult<DateTime<Utc>> {
        parse_status_time(&self.expiration_time)
    }
}

pub fn parse_status_time(value: &str) -> BrokerResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, STATUS_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| BrokerError::parse(format!("invalid expiration time '{}': {}", value, e)))
}

pub fn format_status_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Deterministic object name: repeated requests for one audience/resource converge on one object.
pub fn identity_request_name(audience: &str, resource_id: &str) -> String {
    let digest = if resource_id.is_empty() {
        Sha256::digest(audience.as_bytes())
    } else {
        Sha256::digest(format!("{}-{}", audience, resource_id).as_bytes())
    };
    format!("{}{}", IDENTITY_REQUEST_PREFIX, hex::encode(digest)).to_lowercase()
}

impl AzureClusterIdentityRequest {
    /// A request object with an empty status, addressed by [`identity_request_name`].
    pub fn for_audience(namespace: &str, audience: &str, resource_id: &str) -> Self {
        let mut request = AzureClusterIdentityRequest::new(
            &identity_request_name(audience, resource_id),
            AzureClusterIdentityRequestSpec {
                audience: audience.to_owned(),
                resource_id: resource_id.to_owned(),
                api_version: String::new(),
            },
        );
        request.metadata.namespace = Some(namespace.to_owned());
        request
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};
    use kube::ResourceExt;

    use super::*;

    #[test]
    fn name_is_hash_of_audience() {
        let name = identity_request_name("audience", "");
        assert!(name.starts_with(IDENTITY_REQUEST_PREFIX));
        assert_eq!(name.len(), IDENTITY_REQUEST_PREFIX.len() + 64);
        assert_eq!(name, identity_request_name("audience", ""));
        assert_eq!(name, name.to_lowercase());
    }

    #[test]
    fn resource_id_changes_the_name() {
        let plain = identity_request_name("audience", "");
        let bound = identity_request_name("audience", "my-extension");
        assert_ne!(plain, bound);
        let expected = format!(
            "{}{}",
            IDENTITY_REQUEST_PREFIX,
            hex::encode(Sha256::digest(b"audience-my-extension"))
        );
        assert_eq!(bound, expected);
    }

    #[test]
    fn status_time_round_trips_through_issuer_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).single().unwrap();
        let formatted = format_status_time(at);
        assert_eq!(formatted, "2024-03-01T12:30:00.000Z");
        assert_eq!(parse_status_time(&formatted).unwrap(), at);

        let with_millis = parse_status_time("2024-03-01T12:30:00.250Z").unwrap();
        assert_eq!(with_millis.nanosecond(), 250_000_000);
    }

    #[test]
    fn malformed_status_time_is_parse_error() {
        let err = parse_status_time("01/03/2024 12:30").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn status_population() {
        let mut status = AzureClusterIdentityRequestStatus::default();
        assert!(!status.is_populated());
        status.token_reference = TokenReference { secret_name: "s".into(), data_name: "d".into() };
        assert!(!status.is_populated());
        status.expiration_time = "2024-03-01T12:30:00.000Z".into();
        assert!(status.is_populated());
    }

    #[test]
    fn request_serializes_in_camel_case() {
        let request = AzureClusterIdentityRequest::for_audience("azure-arc", "aud", "ext");
        assert_eq!(request.namespace().as_deref(), Some("azure-arc"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["apiVersion"], "clusterconfig.azure.com/v1beta1");
        assert_eq!(value["kind"], "AzureClusterIdentityRequest");
        assert_eq!(value["spec"]["resourceId"], "ext");
        assert!(value["spec"].get("apiVersion").is_none());
    }
}
