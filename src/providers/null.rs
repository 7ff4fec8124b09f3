use crate::error::BrokerResult;
use crate::token::access_token::{AUTHORIZATION_HEADER, NO_SCHEME};
use crate::token::AccessToken;

/// Used when the data plane is configured without an auth header.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProvider;

impl NullProvider {
    pub async fn get_token(&self) -> BrokerResult<AccessToken> {
        Ok(AccessToken::new("", None, AUTHORIZATION_HEADER, NO_SCHEME))
    }
}
