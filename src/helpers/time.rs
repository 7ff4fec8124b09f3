use chrono::{DateTime, Utc};
use tokio::time::Duration;

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

/// How long to wait before asking for the next token.
///
/// Tokens without expiry are re-requested every `idle_period`; otherwise the wait ends
/// `margin` before expiry. Never shorter than `min_interval`, so an already expired
/// token does not turn the caller into a busy loop.
pub fn next_refresh_in(
    expires_at: Option<DateTime<Utc>>,
    margin: Duration,
    idle_period: Duration,
    min_interval: Duration,
) -> Duration {
    let wait = match expires_at {
        None => idle_period,
        Some(expires_at) => {
            let margin_secs = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
            let secs = expires_at.timestamp().saturating_sub(now_i64()).saturating_sub(margin_secs);
            Duration::from_secs(u64::try_from(secs).unwrap_or(0))
        }
    };
    wait.max(min_interval)
}
