pub mod retry;

pub use retry::{OnTimeout, RetryPolicy};
