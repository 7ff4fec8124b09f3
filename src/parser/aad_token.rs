use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{BrokerError, BrokerResult};
use crate::parser::expires_on::parse_expires_on;
use crate::token::AccessToken;

/// OAuth2 token as returned by AAD (v1 and v2), IMDS and NMI.
///
/// v1 endpoints send the numeric fields as strings, v2 as numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AadToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_in: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_on: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub not_before: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub token_type: String,
}

impl AadToken {
    /// Absolute expiry: `expires_on` (epoch seconds or timestamp) first, `expires_in` second.
    pub fn expires_at(&self) -> BrokerResult<Option<DateTime<Utc>>> {
        if !self.expires_on.is_empty() {
            if let Ok(epoch) = self.expires_on.parse::<i64>() {
                return Utc
                    .timestamp_opt(epoch, 0)
                    .single()
                    .map(Some)
                    .ok_or_else(|| BrokerError::parse(format!("expires_on {} out of range", epoch)));
            }
            let seconds = parse_expires_on(&self.expires_on)?;
            return expires_after(seconds).map(Some);
        }
        if !self.expires_in.is_empty() {
            let seconds = self
                .expires_in
                .parse::<i64>()
                .map_err(|e| BrokerError::parse(format!("invalid expires_in '{}': {}", self.expires_in, e)))?;
            return expires_after(seconds).map(Some);
        }
        Ok(None)
    }

    /// Wrap the token as a bearer credential without any further exchange.
    pub fn into_access_token(self) -> BrokerResult<AccessToken> {
        if self.access_token.is_empty() {
            return Err(BrokerError::response("token response did not contain an access_token"));
        }
        let expires_at = self.expires_at()?;
        Ok(AccessToken::bearer(self.access_token, expires_at))
    }
}

/// `now + seconds`; lifetimes beyond chrono's range are a parse error, not a panic.
fn expires_after(seconds: i64) -> BrokerResult<DateTime<Utc>> {
    TimeDelta::try_seconds(seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| BrokerError::parse(format!("token lifetime of {} seconds is out of range", seconds)))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {}", other))),
    }
}
