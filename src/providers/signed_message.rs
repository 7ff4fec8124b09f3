use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use jsonwebtoken::{crypto, Algorithm, EncodingKey};
use serde::Deserialize;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::token::access_token::{AUTHORIZATION_HEADER, NO_SCHEME, SHARED_KEY_SCHEME, SIGNED_MESSAGE_HEADER};
use crate::token::AccessToken;

/// How the signature is produced and attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningScheme {
    /// RSASSA-PSS, sent as `signedMessage: <message>:rsapss <sig>`.
    SignedMessage,
    /// PKCS#1 v1.5, sent as `Authorization: SharedKey <message>:<sig>`.
    #[default]
    SharedKey,
}

/// Identifies the resource the signed message is about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_type: String,
    pub resource_name: String,
}

impl ResourceMetadata {
    pub fn message(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.subscription_id, self.resource_group, self.cluster_type, self.resource_name
        )
    }
}

/// Credential made of the resource path signed with the onboarding private key.
#[derive(Clone)]
pub struct SignedMessageProvider {
    metadata: ResourceMetadata,
    key: EncodingKey,
    scheme: SigningScheme,
}

impl fmt::Debug for SignedMessageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedMessageProvider")
            .field("metadata", &self.metadata)
            .field("scheme", &self.scheme)
            .finish()
    }
}

impl SignedMessageProvider {
    /// `private_key_pem` is a PKCS#1 or PKCS#8 RSA private key.
    pub fn new(metadata: ResourceMetadata, private_key_pem: &str, scheme: SigningScheme) -> BrokerResult<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| BrokerError::parse(format!("failed to parse onboarding private key: {}", e)))?;
        Ok(Self { metadata, key, scheme })
    }

    pub fn scheme(&self) -> SigningScheme {
        self.scheme
    }

    /// Standard base64 signature over SHA-256 of `message`.
    fn sign(&self, message: &str) -> BrokerResult<String> {
        let algorithm = match self.scheme {
            SigningScheme::SignedMessage => Algorithm::PS256,
            SigningScheme::SharedKey => Algorithm::RS256,
        };
        let signature = crypto::sign(message.as_bytes(), &self.key, algorithm)
            .map_err(|e| BrokerError::config(format!("failed to sign message {}: {}", message, e)))?;
        let raw = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| BrokerError::parse(format!("unexpected signature encoding: {}", e)))?;
        Ok(STANDARD.encode(raw))
    }

    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        let message = self.metadata.message();
        let signature = self.sign(&message)?;
        debug!(message = %message, scheme = ?self.scheme, "signed resource message");
        let token = match self.scheme {
            SigningScheme::SignedMessage => AccessToken::new(
                format!("{}:rsapss {}", message, signature),
                None,
                SIGNED_MESSAGE_HEADER,
                NO_SCHEME,
            ),
            SigningScheme::SharedKey => AccessToken::new(
                format!("{}:{}", message, signature),
                None,
                AUTHORIZATION_HEADER,
                SHARED_KEY_SCHEME,
            ),
        };
        Ok(token)
    }
}
