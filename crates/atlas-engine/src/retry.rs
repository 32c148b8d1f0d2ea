//! # Retry Controller
//!
//! A reusable retry decorator for contention failures.
//!
//! ## What Gets Retried
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Retry Decision                                   │
//! │                                                                         │
//! │  attempt() ──► Ok ─────────────────────────────► return value          │
//! │      │                                                                  │
//! │      └── Err(e)                                                         │
//! │            │                                                            │
//! │            ├── e.is_transient() == false ──────► return e immediately  │
//! │            │    (validation, insufficient stock, not found, ...)       │
//! │            │                                                            │
//! │            └── e.is_transient() == true                                 │
//! │                  │                                                      │
//! │                  ├── budget left ──► sleep(backoff) ──► attempt again  │
//! │                  │                                                      │
//! │                  └── budget spent ──► ExhaustedRetries { last }        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The attempt closure must re-run the WHOLE operation from validation:
//! every attempt fully rolls back its partial effects before this
//! controller sees the error, so re-running is always safe.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Retry budget and backoff shape for contention failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// How many times a failed attempt is re-run (not counting the
    /// first attempt).
    /// Default: 3
    pub max_retries: u32,

    /// Delay before the first retry; doubles each retry.
    /// Default: 50ms
    pub base_delay: Duration,

    /// Upper bound on any single backoff delay.
    /// Default: 2 seconds
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and default delays.
    pub fn new(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Sets the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// The backoff delay before retry number `retry` (0-based):
    /// `min(base × 2^retry, max)` plus up to 50% uniform jitter,
    /// still capped at max.
    ///
    /// Jitter spreads out retries of transactions that failed on the
    /// same contended row at the same moment.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX));
        let capped = exp.min(self.max_delay);

        let jitter_budget = capped.as_millis() as u64 / 2;
        let jitter = if jitter_budget == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_budget)
        };

        (capped + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3)
    }
}

/// Runs `attempt` until it succeeds, fails permanently, or spends the
/// retry budget on contention.
///
/// Generic over the operation so the coordinator, compensation engine,
/// and inventory adjustments all share one retry path.
pub async fn run_with_retries<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut retries = 0u32;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if retries >= policy.max_retries {
                    return Err(EngineError::exhausted(retries + 1, err));
                }

                let delay = policy.backoff_delay(retries);
                warn!(
                    retry = retries + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "contention, backing off before retry"
                );

                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContentionError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn contention() -> EngineError {
        EngineError::Contention(ContentionError::LockTimeout {
            product_id: "p1".to_string(),
            waited_ms: 10,
        })
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(4))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(3)
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(350));

        // Jitter makes exact values nondeterministic; bounds are not.
        for retry in 0..6 {
            let deterministic = Duration::from_millis(100)
                .saturating_mul(1 << retry)
                .min(Duration::from_millis(350));
            let delay = policy.backoff_delay(retry);
            assert!(delay >= deterministic.min(Duration::from_millis(350)));
            assert!(delay <= Duration::from_millis(350));
        }

        // Un-jittered floors: 100, 200, 350, 350, ...
        assert!(policy.backoff_delay(0) >= Duration::from_millis(100));
        assert!(policy.backoff_delay(1) >= Duration::from_millis(200));
        assert!(policy.backoff_delay(2) >= Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_no_overflow_on_large_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1000).max(policy.max_delay), policy.max_delay);
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let calls = AtomicU32::new(0);
        let result = run_with_retries(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = run_with_retries(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(contention())
                } else {
                    Ok("committed")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "committed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let calls = AtomicU32::new(0);
        let err = run_with_retries::<(), _, _>(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(EngineError::InsufficientStock {
                    product_id: "p1".to_string(),
                    available: 0,
                    requested: 1,
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::InsufficientStock { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_deterministic() {
        let calls = AtomicU32::new(0);
        let err = run_with_retries::<(), _, _>(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(contention()) }
        })
        .await
        .unwrap_err();

        // 1 initial attempt + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            EngineError::ExhaustedRetries { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(source, ContentionError::LockTimeout { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
