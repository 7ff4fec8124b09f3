use std::{fs, path::Path};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, error};

use crate::config::settings::{BrokerConfig, LogFormat, LoggingConfig};

/// Load and validate config from YAML file
pub fn file_to_config(path: &Path) -> Result<BrokerConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let expanded = expand_env_vars(&content)?;
    parse_config(&expanded)
}

pub fn parse_config(content: &str) -> Result<BrokerConfig> {
    let mut config: BrokerConfig = serde_yaml::from_str(content).inspect_err(|e| {
        error!("parse config error: {}", e);
    })?;

    // Apply defaults
    if config.settings.logging.is_none() {
        config.settings.logging = Some(LoggingConfig::new("info".to_owned(), LogFormat::from_env()));
    }

    debug!("validation config ...");
    if let Some(auth) = &config.auth {
        auth.validate().context("invalid auth section")?;
    }
    if config.settings.exchange.poll_interval_seconds == 0 {
        anyhow::bail!("settings.exchange.poll_interval_seconds must be greater than zero");
    }
    if config.settings.refresh.min_interval_seconds == 0 {
        anyhow::bail!("settings.refresh.min_interval_seconds must be greater than zero");
    }
    Ok(config)
}

/// Replace `${VAR}` and `${VAR:default}` with process environment values.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}

pub fn run(config_path: &str) -> Result<BrokerConfig> {
    file_to_config(Path::new(config_path)).context("Invalid config format")
}
