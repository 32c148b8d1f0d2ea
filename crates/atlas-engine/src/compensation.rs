//! # Compensation Engine
//!
//! Reverses a committed order: restores stock, writes compensating
//! ledger entries, rolls the customer aggregate back, and flips the
//! order to `refunded` - all as one atomic unit. A partial reversal is
//! never observable.
//!
//! ## Double-Reversal Safety
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two callers race to reverse the same order:                           │
//! │                                                                         │
//! │  T1: status check: completed ✓     T2: status check: completed ✓       │
//! │  T1: locks, BEGIN                  T2: waits on row locks              │
//! │  T1: flip completed→refunded ✓                                         │
//! │  T1: restore stock, ledger, spend                                      │
//! │  T1: COMMIT                        T2: locks, BEGIN                    │
//! │                                    T2: flip completed→refunded ✗       │
//! │                                        (0 rows: AlreadyReversed)       │
//! │                                                                         │
//! │  The conditional UPDATE inside the transaction is the arbiter; the     │
//! │  early status check is only a fast path.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use atlas_core::validation::validate_id;
use atlas_core::{LedgerEntry, LedgerEventType, Money, OrderStatus};
use atlas_db::repository::ledger::generate_entry_id;
use atlas_db::{CustomerRepository, LedgerRepository, OrderRepository};

use crate::coordinator::OrderEngine;
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryManager;
use crate::retry::run_with_retries;

/// What the caller gets back from a completed reversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalReceipt {
    pub order_id: String,
    /// The total amount removed from the customer's cumulative spend.
    pub restored_total: Money,
    pub line_count: usize,
}

impl OrderEngine {
    /// Reverses a committed order (return/refund).
    ///
    /// Idempotent in effect: a second call against an already-refunded
    /// order fails fast with [`EngineError::AlreadyReversed`] rather
    /// than double-reversing. Contention failures are retried; the
    /// precondition failures never are.
    #[instrument(skip(self))]
    pub async fn reverse_order(&self, order_id: &str, reason: &str) -> EngineResult<ReversalReceipt> {
        run_with_retries(&self.config.retry, || {
            self.reverse_order_once(order_id, reason)
        })
        .await
    }

    /// One full reversal attempt.
    async fn reverse_order_once(
        &self,
        order_id: &str,
        reason: &str,
    ) -> EngineResult<ReversalReceipt> {
        validate_id("order_id", order_id)?;

        let db = self.database();

        let order = db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        // Fast path: anything but completed is not reversible.
        if order.status != OrderStatus::Completed {
            return Err(EngineError::AlreadyReversed {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }

        let lines = db.orders().get_lines(order_id).await?;

        // Same lock discipline as order creation: ascending product ids.
        let product_ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
        let _guards = self.locks().acquire_ordered(&product_ids).await?;

        let mut tx = db.pool().begin().await.map_err(atlas_db::DbError::from)?;

        // The arbiter: exactly one reversal wins the status flip.
        let flipped = OrderRepository::mark_refunded(&mut tx, order_id).await?;
        if !flipped {
            return Err(EngineError::AlreadyReversed {
                order_id: order_id.to_string(),
                status: OrderStatus::Refunded,
            });
        }

        let now = Utc::now();
        for line in &lines {
            InventoryManager::release_on(&mut tx, &line.product_id, line.quantity).await?;

            let entry = LedgerEntry {
                id: generate_entry_id(),
                product_id: line.product_id.clone(),
                quantity_delta: line.quantity,
                event_type: LedgerEventType::Return,
                order_id: Some(order_id.to_string()),
                note: Some(reason.to_string()),
                recorded_at: now,
            };
            LedgerRepository::append(&mut tx, &entry).await?;
        }

        // Aggregate reversal; the last purchase date is left alone.
        CustomerRepository::apply_spend_delta(&mut tx, &order.customer_id, -order.total_cents, None)
            .await?;

        tx.commit().await.map_err(atlas_db::DbError::from)?;

        info!(
            order_id = %order_id,
            customer_id = %order.customer_id,
            lines = lines.len(),
            restored_cents = order.total_cents,
            reason = %reason,
            "order reversed"
        );

        Ok(ReversalReceipt {
            order_id: order_id.to_string(),
            restored_total: order.total(),
            line_count: lines.len(),
        })
    }
}
