//! # Azure Token Broker Library
//!
//! Issues, caches and renews the bearer credentials cluster components use to
//! call Azure control-plane and data-plane APIs.
//!
//! Modules:
//! - `config` — YAML settings, auth configuration and environment lookup
//! - `providers` — one token provider per identity mechanism, plus the factory
//! - `identity` — token exchange through `AzureClusterIdentityRequest` objects
//! - `resilience` — bounded-duration retry
//! - `parser` — expiry fields, federated token bundles and AAD token responses

pub mod config;
pub mod error;
pub mod helpers;
pub mod identity;
pub mod observability;
pub mod parser;
pub mod providers;
pub mod resilience;
pub mod server;
pub mod token;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::config::settings::BrokerConfig;
pub use crate::error::{BrokerError, BrokerResult};
pub use crate::providers::{ProviderFactory, TokenProvider};
pub use crate::token::AccessToken;
