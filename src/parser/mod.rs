//! Parsing of token payloads returned by identity endpoints.
//!
//! - `expires_on` — `expires_on` fields given either as seconds or as a timestamp
//! - `federated` — projected service-account token bundles (workload identity)
//! - `aad_token` — OAuth2 token responses from AAD, IMDS and NMI

pub mod aad_token;
pub mod expires_on;
pub mod federated;

pub use aad_token::AadToken;
pub use expires_on::parse_expires_on;
pub use federated::{parse_federated_token_bundle, TOKEN_EXCHANGE_AUDIENCE};
