use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, watch};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

use crate::error::{BrokerError, BrokerResult};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);
/// Exit code used when an irrecoverable bootstrap dependency never became available.
pub const FATAL_EXIT_CODE: i32 = 11;

/// What happens when the overall deadline passes without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTimeout {
    /// Hand a `BrokerError::Timeout` back to the caller.
    Error,
    /// Terminate the process.
    Fatal,
}

/// Keep retrying an operation at a fixed interval until it succeeds or the deadline passes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Duration,
    pub on_timeout: OnTimeout,
}

impl RetryPolicy {
    pub fn new(interval: Duration, deadline: Duration, on_timeout: OnTimeout) -> Self {
        Self { interval, deadline, on_timeout }
    }

    /// Run `operation` on a background task, racing it against the deadline.
    ///
    /// Non-retryable errors end the loop immediately. On timeout the worker is told to
    /// stop; a result it produces afterwards is dropped.
    pub async fn run_with_retry<F, Fut, T>(&self, mut operation: F) -> BrokerResult<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = BrokerResult<T>> + Send,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<BrokerResult<T>>();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let last_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let interval = self.interval;
        let worker_last_error = last_error.clone();
        tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                if *stop_rx.borrow() {
                    return;
                }
                attempt += 1;
                match operation().await {
                    Ok(value) => {
                        // receiver is gone once the deadline has passed
                        let _ = result_tx.send(Ok(value));
                        return;
                    }
                    Err(e) if !e.is_retryable() => {
                        debug!(attempt, error = %e, "non-retryable error, giving up");
                        let _ = result_tx.send(Err(e));
                        return;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "attempt failed, retrying in {:?}", interval);
                        if let Ok(mut last) = worker_last_error.lock() {
                            *last = Some(e.to_string());
                        }
                    }
                }
                tokio::select! {
                    _ = stop_rx.changed() => {
                        debug!(attempt, "retry loop stopped");
                        return;
                    }
                    _ = sleep(interval) => {}
                }
            }
        });

        match timeout(self.deadline, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrokerError::transient("retry worker exited without a result")),
            Err(_) => {
                let _ = stop_tx.send(true);
                let last = last_error
                    .lock()
                    .ok()
                    .and_then(|last| last.clone())
                    .unwrap_or_else(|| "no attempt completed".to_owned());
                let message = format!("retry for given duration didn't get any results, last error: {}", last);
                error!(deadline = ?self.deadline, "{}", message);
                Err(BrokerError::Timeout {
                    elapsed_secs: self.deadline.as_secs(),
                    message,
                })
            }
        }
    }

    /// Like [`run_with_retry`](Self::run_with_retry), but honours [`OnTimeout::Fatal`]
    /// by exiting the process.
    pub async fn run_or_exit<F, Fut, T>(&self, operation: F) -> BrokerResult<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = BrokerResult<T>> + Send,
        T: Send + 'static,
    {
        let result = self.run_with_retry(operation).await;
        if let (Err(e @ BrokerError::Timeout { .. }), OnTimeout::Fatal) = (&result, self.on_timeout) {
            error!(error = %e, "irrecoverable bootstrap dependency unavailable, exiting");
            std::process::exit(FATAL_EXIT_CODE);
        }
        result
    }
}
