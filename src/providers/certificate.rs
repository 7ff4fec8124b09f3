use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{BrokerError, BrokerResult};
use crate::providers::aad::AadClient;
use crate::token::AccessToken;

/// Lifetime of a client assertion.
const ASSERTION_LIFETIME_SECS: i64 = 600;

#[derive(Debug, Serialize)]
struct AssertionClaims {
    aud: String,
    exp: i64,
    iat: i64,
    iss: String,
    jti: String,
    nbf: i64,
    sub: String,
}

/// Client-credentials flow authenticated by an X.509 certificate and its RSA key.
#[derive(Clone)]
pub struct CertificateProvider {
    aad: AadClient,
    tenant_id: String,
    client_id: String,
    resource: String,
    key: EncodingKey,
    /// base64url SHA-256 of the certificate DER
    thumbprint: String,
}

impl fmt::Debug for CertificateProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateProvider")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("resource", &self.resource)
            .field("thumbprint", &self.thumbprint)
            .finish()
    }
}

impl CertificateProvider {
    pub fn new(
        aad: AadClient,
        tenant_id: &str,
        client_id: &str,
        resource: &str,
        certificate_pem: &str,
        private_key_pem: &str,
    ) -> BrokerResult<Self> {
        let missing: Vec<&str> = [
            ("tenant id", tenant_id),
            ("client id", client_id),
            ("resource", resource),
            ("certificate", certificate_pem),
            ("private key", private_key_pem),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
        if !missing.is_empty() {
            return Err(BrokerError::config(format!(
                "certificate provider is missing: {}",
                missing.join(", ")
            )));
        }

        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| BrokerError::config(format!("failed to parse certificate private key: {}", e)))?;
        let thumbprint = certificate_thumbprint(certificate_pem)?;
        Ok(Self {
            aad,
            tenant_id: tenant_id.to_owned(),
            client_id: client_id.to_owned(),
            resource: resource.to_owned(),
            key,
            thumbprint,
        })
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Signed client assertion addressed to the tenant's token endpoint.
    pub fn client_assertion(&self) -> BrokerResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t_s256 = Some(self.thumbprint.clone());

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: self.aad.token_endpoint(&self.tenant_id),
            exp: now + ASSERTION_LIFETIME_SECS,
            iat: now,
            iss: self.client_id.clone(),
            jti: Uuid::new_v4().to_string(),
            nbf: now,
            sub: self.client_id.clone(),
        };
        encode(&header, &claims, &self.key)
            .map_err(|e| BrokerError::config(format!("failed to sign client assertion: {}", e)))
    }

    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        let assertion = self.client_assertion()?;
        self.aad
            .client_assertion_token(&self.tenant_id, &self.client_id, &assertion, &self.resource)
            .await?
            .into_access_token()
    }
}

/// SHA-256 thumbprint of the first certificate in `pem_content`.
pub fn certificate_thumbprint(pem_content: &str) -> BrokerResult<String> {
    let entries = pem::parse_many(pem_content)
        .map_err(|e| BrokerError::config(format!("failed to parse certificate PEM: {}", e)))?;
    let certificate = entries
        .iter()
        .find(|entry| entry.tag() == "CERTIFICATE")
        .ok_or_else(|| BrokerError::config("no certificate found in PEM"))?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(certificate.contents())))
}
