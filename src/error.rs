use thiserror::Error;

/// Errors surfaced by token providers and the identity request exchange.
///
/// `Config` and `Parse` are never retried; `Transient` and `Response` are.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Invalid or missing required configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network / API failure talking to AAD, IMDS, NMI or Kubernetes.
    #[error("transient error: {0}")]
    Transient(String),

    /// A bounded wait elapsed without a result.
    #[error("timed out after {elapsed_secs}s: {message}")]
    Timeout { elapsed_secs: u64, message: String },

    /// Malformed token, timestamp or JSON payload.
    #[error("parse error: {0}")]
    Parse(String),

    /// The remote endpoint answered, but without the values we need.
    #[error("unexpected response: {0}")]
    Response(String),
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    pub fn config(msg: impl Into<String>) -> Self {
        BrokerError::Config(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        BrokerError::Transient(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        BrokerError::Parse(msg.into())
    }

    pub fn response(msg: impl Into<String>) -> Self {
        BrokerError::Response(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Transient(_) | BrokerError::Response(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::Config(_) => "config",
            BrokerError::Transient(_) => "transient",
            BrokerError::Timeout { .. } => "timeout",
            BrokerError::Parse(_) => "parse",
            BrokerError::Response(_) => "response",
        }
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        BrokerError::Transient(err.to_string())
    }
}

impl From<kube::Error> for BrokerError {
    fn from(err: kube::Error) -> Self {
        BrokerError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::BrokerError;

    #[test]
    fn only_transient_and_response_errors_are_retryable() {
        assert!(BrokerError::transient("io").is_retryable());
        assert!(BrokerError::response("empty").is_retryable());
        assert!(!BrokerError::config("missing").is_retryable());
        assert!(!BrokerError::parse("bad").is_retryable());
        assert!(!BrokerError::Timeout { elapsed_secs: 1, message: "x".into() }.is_retryable());
    }
}
