use crate::config::StoreRetryConfig;
use crate::error::{AppError, Result};
use backon::{ExponentialBuilder, Retryable};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::future::Future;
use std::time::Duration;

#[derive(Clone, Debug)]
struct Metrics {
    retries_total: Counter<u64>,
    exhausted_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("threadline-server");
        Self {
            retries_total: meter
                .u64_counter("store_retries_total")
                .with_description("Transient store failures that were retried")
                .build(),
            exhausted_total: meter
                .u64_counter("store_retries_exhausted_total")
                .with_description("Store operations that kept failing after all retries")
                .build(),
        }
    }
}

/// Bounded exponential retry for write-path store calls. Only transient errors are
/// retried; once attempts run out the caller sees `ServiceUnavailable`.
#[derive(Clone, Debug)]
pub struct StoreRetry {
    backoff: ExponentialBuilder,
    metrics: Metrics,
}

impl StoreRetry {
    #[must_use]
    pub fn new(config: &StoreRetryConfig) -> Self {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(config.min_delay_ms))
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_max_times(config.max_attempts);
        Self { backoff, metrics: Metrics::new() }
    }

    /// Runs `operation`, retrying transient failures.
    ///
    /// # Errors
    /// Returns `AppError::ServiceUnavailable` when retries are exhausted, or the
    /// operation's own error when it is not transient.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = f
            .retry(&self.backoff)
            .when(AppError::is_transient)
            .notify(|e, delay| {
                tracing::warn!(error = %e, operation, retry_in = ?delay, "Transient store failure, retrying");
                self.metrics.retries_total.add(1, &[KeyValue::new("operation", operation)]);
            })
            .await;

        match result {
            Err(e) if e.is_transient() => {
                tracing::error!(error = %e, operation, "Store retries exhausted");
                self.metrics.exhausted_total.add(1, &[KeyValue::new("operation", operation)]);
                Err(AppError::ServiceUnavailable)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> StoreRetry {
        StoreRetry::new(&StoreRetryConfig { max_attempts: 2, min_delay_ms: 1, max_delay_ms: 2 })
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let value = fast()
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AppError::TransientStore("blip".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .expect("second attempt succeeds");
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_service_unavailable() {
        let calls = AtomicUsize::new(0);
        let err = fast()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::TransientStore("down".into()))
            })
            .await
            .expect_err("never succeeds");
        assert!(matches!(err, AppError::ServiceUnavailable));
        // First attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let err = fast()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::AccessDenied)
            })
            .await
            .expect_err("denied");
        assert!(matches!(err, AppError::AccessDenied));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
