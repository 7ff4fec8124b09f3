pub mod common;

mod provider_factory;
