//! Rate-limit retry discipline for platform calls.
//!
//! Slack answers throttled calls with a suggested wait. Such calls are
//! reissued after that wait, indefinitely; every other failure is returned
//! to the caller on the spot.

use std::future::Future;
use std::time::Duration;

use conflux_core::{ApiError, ApiResult};
use tracing::{debug, warn};

/// How a failed platform call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the call may be reissued unchanged.
    pub retryable: bool,
    /// How long to wait before reissuing it.
    pub wait: Duration,
}

impl RateLimitDecision {
    const FATAL: Self = Self {
        retryable: false,
        wait: Duration::ZERO,
    };
}

/// Classifies a platform error.
pub fn classify(err: &ApiError) -> RateLimitDecision {
    match err {
        ApiError::RateLimited { retry_after } => RateLimitDecision {
            retryable: true,
            wait: *retry_after,
        },
        _ => RateLimitDecision::FATAL,
    }
}

/// Runs `call` until it succeeds or fails with a non-rate-limit error.
///
/// There is no attempt cap and no deadline: a persistently throttled call
/// keeps retrying until the process shuts down.
pub async fn retry_rate_limited<T, F, Fut>(op: &str, mut call: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let decision = classify(&err);
                if !decision.retryable {
                    debug!(op, attempt, error = %err, "Platform call failed");
                    return Err(err);
                }
                warn!(
                    op,
                    attempt,
                    wait_ms = decision.wait.as_millis() as u64,
                    "Rate limited, retrying"
                );
                tokio::time::sleep(decision.wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_classify() {
        let limited = ApiError::RateLimited {
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(
            classify(&limited),
            RateLimitDecision {
                retryable: true,
                wait: Duration::from_secs(3)
            }
        );
        assert!(!classify(&ApiError::platform("channel_not_found")).retryable);
        assert!(!classify(&ApiError::NotConnected).retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exactly_twice_with_summed_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = retry_rate_limited("chat.postMessage", || {
            let calls = Arc::clone(&calls);
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(ApiError::RateLimited {
                        retry_after: Duration::from_secs(2),
                    }),
                    1 => Err(ApiError::RateLimited {
                        retry_after: Duration::from_secs(3),
                    }),
                    _ => Ok("1234.5678".to_string()),
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "1234.5678");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_millis(5100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: ApiResult<()> = retry_rate_limited("chat.delete", || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::platform("message_not_found"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), Some("message_not_found"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
