use clap::ValueEnum;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::settings::{BrokerConfig, LogFormat, LoggingConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogLevel::TRACE => "TRACE",
            LogLevel::DEBUG => "DEBUG",
            LogLevel::INFO => "INFO",
            LogLevel::WARN => "WARN",
            LogLevel::ERROR => "ERROR",
        }
    }
}

/// Effective logging config: CLI level over configured level, `DEBUG_LOGGING` forcing debug.
pub fn resolve(config: &BrokerConfig, arg_log_level: Option<LogLevel>, debug_logging: bool) -> LoggingConfig {
    let configured = config
        .settings
        .logging
        .clone()
        .unwrap_or_else(|| LoggingConfig::new("info".to_owned(), LogFormat::Compact));

    let level = match arg_log_level {
        Some(level) => level.as_str().to_owned(),
        None if debug_logging => "debug".to_owned(),
        None => configured.level,
    };
    LoggingConfig::new(level, configured.format)
}

pub fn run(config: &BrokerConfig, arg_log_level: Option<LogLevel>, debug_logging: bool) {
    init_logging(&resolve(config, arg_log_level, debug_logging));
}

/// Initialize tracing with the desired config.
pub fn init_logging(cfg: &LoggingConfig) {
    let env_filter = EnvFilter::try_new(&cfg.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Base layer: filter + writer
    let registry = tracing_subscriber::registry().with(env_filter);

    // Choose format layer
    match cfg.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .flatten_event(true)
                .with_ansi(false); // CRI parsers dislike ANSI color codes

            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(true);

            let _ = registry.with(layer).try_init();
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::SettingsConfig;

    fn config_with(level: &str) -> BrokerConfig {
        BrokerConfig {
            settings: SettingsConfig {
                logging: Some(LoggingConfig::new(level.to_owned(), LogFormat::Json)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn cli_level_wins() {
        let resolved = resolve(&config_with("warn"), Some(LogLevel::TRACE), true);
        assert_eq!(resolved.level, "TRACE");
        assert_eq!(resolved.format, LogFormat::Json);
    }

    #[test]
    fn debug_logging_overrides_configured_level() {
        assert_eq!(resolve(&config_with("warn"), None, true).level, "debug");
        assert_eq!(resolve(&config_with("warn"), None, false).level, "warn");
    }

    #[test]
    fn defaults_without_logging_section() {
        let resolved = resolve(&BrokerConfig::default(), None, false);
        assert_eq!(resolved.level, "info");
        assert_eq!(resolved.format, LogFormat::Compact);
    }
}
