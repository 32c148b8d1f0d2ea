//! # Engine Configuration
//!
//! Tunables for the order transaction engine, builder-style with
//! sensible defaults.

use std::time::Duration;

use atlas_core::TaxRate;

use crate::retry::RetryPolicy;

/// Engine configuration.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use atlas_core::TaxRate;
/// use atlas_engine::config::EngineConfig;
///
/// let config = EngineConfig::new(TaxRate::from_bps(1800))
///     .lock_wait(Duration::from_secs(2));
/// assert_eq!(config.tax_rate.bps(), 1800);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tax rate applied to every order (on the discounted subtotal).
    pub tax_rate: TaxRate,

    /// How long a single product row-lock acquisition may wait before
    /// it fails as contention.
    /// Default: 5 seconds
    pub lock_wait: Duration,

    /// Retry budget and backoff for contention failures.
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Creates a configuration with the given tax rate and default
    /// locking/retry settings.
    pub fn new(tax_rate: TaxRate) -> Self {
        EngineConfig {
            tax_rate,
            lock_wait: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the row-lock wait timeout.
    pub fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new(TaxRate::zero())
    }
}
