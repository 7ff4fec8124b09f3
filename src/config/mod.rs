pub mod auth;
pub mod environment;
pub mod proc_loader;
pub mod settings;

pub use auth::{AuthConfig, AuthMechanism};
pub use environment::{AgentEnvironment, EnvLookup, MapEnv, ProcessEnv};
pub use settings::{BrokerConfig, ProviderConfig, ProviderOverride};
