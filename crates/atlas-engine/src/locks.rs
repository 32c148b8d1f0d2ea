//! # Product Row Locks
//!
//! Process-wide, per-product exclusive locks with bounded wait.
//!
//! ## Lock Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Why Ordered Acquisition                            │
//! │                                                                         │
//! │  Two orders touching products {A, B}:                                  │
//! │                                                                         │
//! │  UNORDERED (deadlock possible)       ORDERED (deadlock impossible)     │
//! │  ───────────────────────────         ────────────────────────────      │
//! │  T1: lock A ──► wait B               T1: lock A ──► lock B             │
//! │  T2: lock B ──► wait A  ✗ cycle      T2: wait A ──► lock B  ✓          │
//! │                                                                         │
//! │  acquire_ordered() sorts product ids ascending before taking any       │
//! │  lock, so every transaction climbs the same ladder and cycles          │
//! │  cannot form.                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every acquisition carries a bounded wait; exceeding it is a
//! [`ContentionError::LockTimeout`], which the retry controller treats
//! as transient.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::trace;

use crate::error::ContentionError;

/// The per-product lock table.
///
/// Lock entries are created on first touch and live for the lifetime of
/// the table. One entry per product ever sold concurrently is a few
/// dozen bytes; eviction is not worth the race conditions it invites.
#[derive(Debug)]
pub struct ProductLocks {
    wait_timeout: Duration,
    table: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// An exclusive hold on one product row. Released on drop.
#[derive(Debug)]
pub struct RowGuard {
    product_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl RowGuard {
    /// The product this guard holds.
    pub fn product_id(&self) -> &str {
        &self.product_id
    }
}

impl ProductLocks {
    /// Creates a lock table with the given bounded wait per acquisition.
    pub fn new(wait_timeout: Duration) -> Self {
        ProductLocks {
            wait_timeout,
            table: StdMutex::new(HashMap::new()),
        }
    }

    /// Returns the shared handle for a product, creating it on first use.
    fn handle(&self, product_id: &str) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().expect("lock table poisoned");
        table
            .entry(product_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the exclusive lock for one product, waiting at most the
    /// configured timeout.
    pub async fn acquire(&self, product_id: &str) -> Result<RowGuard, ContentionError> {
        let handle = self.handle(product_id);
        let started = Instant::now();

        match timeout(self.wait_timeout, handle.lock_owned()).await {
            Ok(guard) => {
                trace!(product_id = %product_id, "row lock acquired");
                Ok(RowGuard {
                    product_id: product_id.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => Err(ContentionError::LockTimeout {
                product_id: product_id.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Acquires locks for a set of products in ascending product-id
    /// order. Duplicates are collapsed.
    ///
    /// On timeout, guards already taken are dropped (released) before
    /// the error returns, so a failed acquisition never leaves a
    /// partial hold behind.
    pub async fn acquire_ordered(
        &self,
        product_ids: &[String],
    ) -> Result<Vec<RowGuard>, ContentionError> {
        let mut ids: Vec<&String> = product_ids.iter().collect();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await?);
        }
        Ok(guards)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
