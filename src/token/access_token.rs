use chrono::{DateTime, Utc};
use http::{HeaderName, HeaderValue};

use crate::error::{BrokerError, BrokerResult};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const SIGNED_MESSAGE_HEADER: &str = "signedMessage";
pub const BEARER_SCHEME: &str = "Bearer ";
pub const SHARED_KEY_SCHEME: &str = "SharedKey ";
pub const NO_SCHEME: &str = "";

/// Bearer credential plus the header it has to be attached with.
///
/// Immutable: every `get_token` call hands out a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
    header_name: String,
    auth_scheme: String,
}

impl AccessToken {
    pub fn new(
        token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        header_name: impl Into<String>,
        auth_scheme: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            expires_at,
            header_name: header_name.into(),
            auth_scheme: auth_scheme.into(),
        }
    }

    /// `Authorization: Bearer <token>`
    pub fn bearer(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self::new(token, expires_at, AUTHORIZATION_HEADER, BEARER_SCHEME)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `None` for credentials without a lifetime (signed message, null auth).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn auth_scheme(&self) -> &str {
        &self.auth_scheme
    }

    /// Scheme and token concatenated, ready for the header value.
    pub fn header_value(&self) -> String {
        format!("{}{}", self.auth_scheme, self.token)
    }

    pub fn to_header(&self) -> BrokerResult<(HeaderName, HeaderValue)> {
        let name = HeaderName::try_from(self.header_name.as_str())
            .map_err(|e| BrokerError::config(format!("invalid header name '{}': {}", self.header_name, e)))?;
        let mut value = HeaderValue::try_from(self.header_value())
            .map_err(|e| BrokerError::parse(format!("token is not a valid header value: {}", e)))?;
        value.set_sensitive(true);
        Ok((name, value))
    }

    /// Attach the credential to an outgoing request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> BrokerResult<reqwest::RequestBuilder> {
        let (name, value) = self.to_header()?;
        Ok(request.header(name, value))
    }

    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|exp| (exp - Utc::now()).num_seconds())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &format_args!("<{} bytes>", self.token.len()))
            .field("expires_at", &self.expires_at)
            .field("header_name", &self.header_name)
            .field("auth_scheme", &self.auth_scheme)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_value_has_scheme_prefix() {
        let token = AccessToken::bearer("abc", None);
        assert_eq!(token.header_name(), "Authorization");
        assert_eq!(token.header_value(), "Bearer abc");

        let (name, value) = token.to_header().unwrap();
        assert_eq!(name.as_str(), "authorization");
        assert!(value.is_sensitive());
    }

    #[test]
    fn debug_output_hides_token() {
        let token = AccessToken::bearer("super-secret", None);
        let printed = format!("{:?}", token);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("12 bytes"));
    }
}
