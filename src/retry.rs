//! Retry logic with exponential backoff
//!
//! Two layers use this module: the flashcard generator retries provider calls
//! a few seconds apart, and the task runner re-invokes a whole batch minutes
//! apart. Both share the delay formula in [`backoff_delay`].
//!
//! # Example
//!
//! ```no_run
//! use opendeck_pipeline::retry::{IsRetryable, with_retry};
//! use opendeck_pipeline::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::generator_default();
//! with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{BatchError, Error, GenerationError, StorageError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the failing party, if it said so
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Batch-level classification: what may heal if the whole batch runs again
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // The store being unreachable is the canonical batch-level fault
            Error::Database(_) | Error::Sqlx(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Storage(StorageError::Io { .. }) => true,
            Error::Storage(StorageError::NotFound { .. }) => false,
            Error::Batch(BatchError::AttemptTimedOut { .. }) => true,
            Error::Batch(_) => false,
            // Generation errors are settled per document, never by re-running the batch
            Error::Generation(_) => false,
            Error::Extraction(_) => false,
            Error::Transition(_) => false,
            Error::Config { .. } => false,
            Error::NotFound(_) => false,
            Error::ShuttingDown => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Generator-level classification
///
/// Model output is non-deterministic, so a malformed answer is worth asking
/// for again just like an outage or a rate limit.
impl IsRetryable for GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::ProviderUnavailable(_) => true,
            GenerationError::RateLimited { .. } => true,
            GenerationError::MalformedResponse(_) => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Delay to wait after the given failed attempt (1-based), without jitter
///
/// `initial_delay * backoff_multiplier^(attempt - 1)`, capped at `max_delay`.
/// With the batch defaults this yields 60s after attempt 1 and 120s after attempt 2.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(secs.max(0.0))
}

/// Delay to actually sleep after the given failed attempt, jitter applied if enabled
pub fn retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let delay = backoff_delay(config, attempt);
    if config.jitter { add_jitter(delay) } else { delay }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs at most `config.max_attempts` times. Non-retryable
/// errors are returned immediately; the last error is returned once the
/// attempts are used up.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_if(config, E::is_retryable, operation).await
}

/// Like [`with_retry`], with an explicit retry predicate
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if should_retry(&e) && attempt < max_attempts => {
                let mut delay = retry_delay(config, attempt);
                if let Some(hint) = e.retry_after() {
                    delay = delay.max(hint);
                }

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if should_retry(&e) {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
