//! Exponential backoff with jitter for external HTTP calls (search
//! providers, LLM/embedding endpoints). Only errors classified as
//! retryable are retried; everything else (and attempts exhausted)
//! surfaces immediately.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use rand::Rng;

use crate::error::TransientExternalError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    /// `base=0.4s`, 3 attempts, matching the default external-API
    /// retry/backoff config.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 400,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.5,
        }
    }
}

impl RetryConfig {
    pub fn from_seconds(backoff_seconds: f64, max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: (backoff_seconds * 1000.0) as u64,
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("permanent error: {0}")]
    Permanent(E),
    #[error("max attempts ({0}) exceeded")]
    MaxAttemptsExceeded(usize),
}

/// Classifies whether an error should be retried. Implemented for
/// [`TransientExternalError`]; callers wrap provider-specific errors in
/// that type at the client boundary.
pub trait RetryClassifiable {
    fn is_retryable(&self) -> bool;
}

impl RetryClassifiable for TransientExternalError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Retries `operation` with exponential backoff, honoring
/// [`RetryClassifiable::is_retryable`]. Errors reported by the closure
/// that aren't retryable short-circuit immediately; a retryable error
/// that survives `max_attempts` retries surfaces as
/// `MaxAttemptsExceeded`.
pub async fn execute_with_backoff<F, Fut, T, E>(operation: F, config: &RetryConfig) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut + Send,
    Fut: std::future::Future<Output = Result<T, E>> + Send,
    E: std::error::Error + RetryClassifiable + Send + Sync + 'static,
{
    let max_attempts = config.max_attempts;
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.initial_backoff_ms))
        .with_max_delay(Duration::from_millis(config.max_backoff_ms))
        .with_factor(config.backoff_multiplier as f32)
        .with_max_times(max_attempts);

    let result = operation.retry(backoff).when(|err: &E| err.is_retryable()).await;

    match result {
        Ok(value) => Ok(value),
        Err(err) if !err.is_retryable() => Err(RetryError::Permanent(err)),
        Err(_err) => Err(RetryError::MaxAttemptsExceeded(max_attempts)),
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    let mut rng = rand::rng();
    let jitter = rng.random_range(-jitter_factor..=jitter_factor);
    let jittered_ms = (duration.as_millis() as f64 * (1.0 + jitter)).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}

/// Synchronous counterpart, for call sites without an async runtime
/// (e.g. checkpoint-store writes on a blocking pool thread).
pub fn execute_with_backoff_sync<F, T, E>(mut operation: F, config: &RetryConfig) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: std::error::Error + RetryClassifiable,
{
    let mut attempts = 0;
    let mut backoff_ms = config.initial_backoff_ms;

    loop {
        attempts += 1;
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(RetryError::Permanent(err));
                }
                if attempts > config.max_attempts {
                    return Err(RetryError::MaxAttemptsExceeded(config.max_attempts));
                }
                let backoff = Duration::from_millis(backoff_ms.min(config.max_backoff_ms));
                std::thread::sleep(apply_jitter(backoff, config.jitter_factor));
                backoff_ms = (backoff_ms as f64 * config.backoff_multiplier) as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("test error: {0}")]
    struct TestError(String, bool);

    impl RetryClassifiable for TestError {
        fn is_retryable(&self) -> bool {
            self.1
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result = execute_with_backoff(
            move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<i32, TestError>(1)
                }
            },
            &RetryConfig::default(),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result = execute_with_backoff(
            move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, TestError>(TestError("bad input".to_string(), false))
                }
            },
            &RetryConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds_on_transient_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let config = RetryConfig {
            initial_backoff_ms: 5,
            ..RetryConfig::default()
        };
        let result = execute_with_backoff(
            move || {
                let calls = calls_clone.clone();
                async move {
                    let current = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if current < 2 {
                        Err(TestError("timeout".to_string(), true))
                    } else {
                        Ok(42)
                    }
                }
            },
            &config,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sync_retries_exhaust_and_report_attempts() {
        let calls = AtomicUsize::new(0);
        let config = RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 1,
            ..RetryConfig::default()
        };
        let result = execute_with_backoff_sync(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, TestError>(TestError("timeout".to_string(), true))
            },
            &config,
        );
        assert!(matches!(result, Err(RetryError::MaxAttemptsExceeded(2))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
