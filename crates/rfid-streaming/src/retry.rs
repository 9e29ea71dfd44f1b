//! Retry with exponential backoff for control-plane calls.
//!
//! Retries only errors that report [`StreamingError::is_transient`]:
//! transport failures and 5xx answers. Client errors, deserialization
//! failures and credential errors are returned immediately. Appends never
//! go through here; a failed append is surfaced to the driver as-is.

use std::future::Future;
use std::time::Duration;

use crate::error::StreamingError;

/// Maximum number of retry attempts after the initial request.
pub(crate) const MAX_RETRIES: u32 = 3;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// Run `f` until it succeeds, fails permanently, or retries run out.
pub(crate) async fn retry_transient<T, F, Fut>(operation: &str, f: F) -> Result<T, StreamingError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StreamingError>>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    "transient failure, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    f().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn unavailable() -> StreamingError {
        StreamingError::ExchangeRejected {
            status: 503,
            body: "unavailable".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_all_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = retry_transient("test", || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = retry_transient("test", || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StreamingError::ExchangeRejected {
                    status: 401,
                    body: "bad jwt".into(),
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(StreamingError::ExchangeRejected { status: 401, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_transient("test", || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(unavailable())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
