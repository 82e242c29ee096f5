//! Retry helper for backend round trips
//!
//! Wraps an async operation with exponential backoff on transient
//! `SyncError`s. Non-transient errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::errors::{RetryConfig, SyncResult};

/// Retry an operation with configurable retry logic
///
/// The operation is attempted once plus up to `config.max_attempts` retries.
/// Delays double from `initial_delay` and are capped at `max_delay`.
pub async fn retry_task<F, Fut, T>(config: &RetryConfig, mut operation: F) -> SyncResult<T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = SyncResult<T>> + Send,
    T: Send,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_transient() {
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    tracing::error!(
                        attempts = attempt + 1,
                        error = %e,
                        "Max retry attempts exceeded"
                    );
                    return Err(e);
                }

                let delay: Duration = config.delay_for_attempt(attempt);
                attempt += 1;

                tracing::warn!(
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient error, retrying after delay"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{RejectionKind, SyncError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_task(&fast_config(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SyncError::ConnectionFailed("flaky".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_rejections() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: SyncResult<()> = retry_task(&fast_config(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::rejected(RejectionKind::InvalidRequest, "bad"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: SyncResult<()> = retry_task(&fast_config(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::ConnectionFailed("down".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::ConnectionFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
