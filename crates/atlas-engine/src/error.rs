//! # Engine Error Types
//!
//! The closed error taxonomy of the order transaction engine.
//!
//! ## Transient vs Permanent
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Error Classification                               │
//! │                                                                         │
//! │  TRANSIENT (retry may help)          PERMANENT (retry will not help)   │
//! │  ──────────────────────────          ──────────────────────────────    │
//! │  Contention::LockTimeout             Validation                         │
//! │  Contention::StoreBusy               CustomerNotFound                   │
//! │                                      ProductNotFound                    │
//! │                                      InsufficientStock                  │
//! │                                      OrderNotFound                      │
//! │                                      AlreadyReversed                    │
//! │                                      Persistence                        │
//! │                                      ExhaustedRetries (terminal)        │
//! │                                                                         │
//! │  The retry controller keys on is_transient(). Callers key on it too:   │
//! │  transient = resubmit, permanent = tell the user.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure inside a single attempt rolls back that attempt's
//! partial effects before the error leaves the engine; no variant here
//! implies observable partial state.

use thiserror::Error;

use atlas_core::{OrderStatus, ValidationError};
use atlas_db::DbError;

// =============================================================================
// Contention
// =============================================================================

/// A concurrency conflict between two transactions touching the same rows.
///
/// Deadlock has no variant of its own: product row locks are always taken
/// in ascending product-id order, which makes lock cycles impossible by
/// construction, and SQLite reports writer conflicts as busy rather than
/// as a detected deadlock.
#[derive(Debug, Clone, Error)]
pub enum ContentionError {
    /// The product row lock could not be acquired within the bounded wait.
    #[error("lock wait timed out for product {product_id} after {waited_ms}ms")]
    LockTimeout { product_id: String, waited_ms: u64 },

    /// The underlying store refused a write because a concurrent
    /// transaction holds the write lock.
    #[error("store busy: {0}")]
    StoreBusy(String),
}

// =============================================================================
// Engine Error
// =============================================================================

/// Order transaction engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any I/O.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Customer reference does not exist or is inactive.
    #[error("customer not found or inactive: {0}")]
    CustomerNotFound(String),

    /// Product reference does not exist or is inactive.
    #[error("product not found or inactive: {0}")]
    ProductNotFound(String),

    /// A reservation could not be satisfied. Retrying will not create
    /// stock, so this is permanent.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// A concurrency conflict. The retry controller re-runs the whole
    /// attempt.
    #[error("contention: {0}")]
    Contention(#[from] ContentionError),

    /// The retry budget was spent on contention. Wraps the last
    /// contention error seen.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: ContentionError,
    },

    /// No order with that id.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// The order is not in `completed` status, so it cannot be reversed
    /// (again).
    #[error("order {order_id} is {status:?}, cannot reverse")]
    AlreadyReversed {
        order_id: String,
        status: OrderStatus,
    },

    /// A failure during the atomic write phase. The transaction was
    /// rolled back before this error propagated.
    #[error("persistence failure: {0}")]
    Persistence(#[source] DbError),
}

impl EngineError {
    /// Whether a retry of the whole attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Contention(_))
    }

    /// Builds the terminal error after the retry budget is spent.
    pub(crate) fn exhausted(attempts: u32, last: EngineError) -> EngineError {
        match last {
            EngineError::Contention(source) => EngineError::ExhaustedRetries { attempts, source },
            // Only contention is retried, so only contention can exhaust.
            other => other,
        }
    }
}

/// Store errors split into the contention class and everything else.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Busy(msg) => EngineError::Contention(ContentionError::StoreBusy(msg)),
            other => EngineError::Persistence(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================
