//! # Inventory Reservation Manager
//!
//! The only gate through which stock changes: reservations (sales),
//! releases (reversals), and administrative adjustments all pass through
//! here, under the product row-lock discipline.
//!
//! ## Never Oversell
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reservation Under The Row Lock                       │
//! │                                                                         │
//! │  acquire(product row lock)          ← serializes concurrent sellers    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read product (price + stock)       ← price snapshot taken HERE,       │
//! │       │                               under the same lock as the       │
//! │       ▼                               stock check                       │
//! │  stock < qty ? ──► InsufficientStock                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE stock = stock - qty                                            │
//! │  WHERE stock - qty >= 0             ← guarded; refusal = no write      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two concurrent reservations against the same product are strictly
//! serialized by the lock, never interleaved; stock never goes negative.

use chrono::Utc;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info};

use atlas_core::validation::{validate_adjustment_delta, validate_id, validate_quantity};
use atlas_core::{LedgerEntry, LedgerEventType, Money};
use atlas_db::repository::ledger::generate_entry_id;
use atlas_db::{Database, LedgerRepository, ProductRepository};

use crate::error::{EngineError, EngineResult};
use crate::locks::ProductLocks;

/// A successful reservation: the quantity taken and the unit price
/// frozen at reservation time.
#[derive(Debug, Clone)]
pub struct ReservedLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Inventory reservation manager.
///
/// Cheap to clone; shares the database handle and lock table.
#[derive(Debug, Clone)]
pub struct InventoryManager {
    db: Database,
    locks: Arc<ProductLocks>,
}

impl InventoryManager {
    /// Creates an inventory manager over the given database and lock
    /// table.
    pub fn new(db: Database, locks: Arc<ProductLocks>) -> Self {
        InventoryManager { db, locks }
    }

    /// Reserves `quantity` units of a product on a transaction
    /// connection.
    ///
    /// ## Preconditions
    /// The caller holds the product's row lock and `quantity` is
    /// validated positive. Runs inside the coordinator's transaction so
    /// an aborted attempt rolls the decrement back.
    ///
    /// ## Returns
    /// The pre-reservation price snapshot for the order line.
    pub(crate) async fn reserve_on(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> EngineResult<ReservedLine> {
        let product = ProductRepository::get_by_id_on(conn, product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| EngineError::ProductNotFound(product_id.to_string()))?;

        if product.stock < quantity {
            return Err(EngineError::InsufficientStock {
                product_id: product_id.to_string(),
                available: product.stock,
                requested: quantity,
            });
        }

        let applied = ProductRepository::apply_stock_delta(conn, product_id, -quantity).await?;
        if !applied {
            // The guard refused even though the read said otherwise.
            // Unreachable while the row lock is held; still never oversell.
            return Err(EngineError::InsufficientStock {
                product_id: product_id.to_string(),
                available: product.stock,
                requested: quantity,
            });
        }

        debug!(product_id = %product_id, quantity = %quantity, "stock reserved");

        Ok(ReservedLine {
            product_id: product.id.clone(),
            quantity,
            unit_price: product.price(),
        })
    }

    /// Returns `quantity` units of a product to stock on a transaction
    /// connection. Used by the compensation engine.
    ///
    /// ## Preconditions
    /// The caller holds the product's row lock.
    pub(crate) async fn release_on(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> EngineResult<()> {
        let applied = ProductRepository::apply_stock_delta(conn, product_id, quantity).await?;
        if !applied {
            return Err(EngineError::ProductNotFound(product_id.to_string()));
        }

        debug!(product_id = %product_id, quantity = %quantity, "stock released");
        Ok(())
    }

    /// Applies a direct administrative stock adjustment, bypassing the
    /// order flow but sharing the same lock discipline.
    ///
    /// The delta and its ledger entry commit atomically.
    ///
    /// ## Returns
    /// The new stock level.
    pub async fn adjust(&self, product_id: &str, delta: i64, reason: &str) -> EngineResult<i64> {
        validate_id("product_id", product_id)?;
        validate_adjustment_delta(delta)?;

        self.apply_with_ledger(product_id, delta, LedgerEventType::Adjustment, reason)
            .await
    }

    /// Records stock received from a supplier: a positive delta with a
    /// `purchase` ledger entry.
    ///
    /// ## Returns
    /// The new stock level.
    pub async fn receive_stock(
        &self,
        product_id: &str,
        quantity: i64,
        reason: &str,
    ) -> EngineResult<i64> {
        validate_id("product_id", product_id)?;
        validate_quantity(quantity)?;

        self.apply_with_ledger(product_id, quantity, LedgerEventType::Purchase, reason)
            .await
    }

    /// Lock, apply the delta, append the ledger entry, commit.
    async fn apply_with_ledger(
        &self,
        product_id: &str,
        delta: i64,
        event_type: LedgerEventType,
        reason: &str,
    ) -> EngineResult<i64> {
        let _guard = self.locks.acquire(product_id).await?;

        let mut tx = self.db.pool().begin().await.map_err(atlas_db::DbError::from)?;

        let product = ProductRepository::get_by_id_on(&mut tx, product_id)
            .await?
            .ok_or_else(|| EngineError::ProductNotFound(product_id.to_string()))?;

        let applied = ProductRepository::apply_stock_delta(&mut tx, product_id, delta).await?;
        if !applied {
            // Only a removal can trip the guard
            return Err(EngineError::InsufficientStock {
                product_id: product_id.to_string(),
                available: product.stock,
                requested: -delta,
            });
        }

        let entry = LedgerEntry {
            id: generate_entry_id(),
            product_id: product_id.to_string(),
            quantity_delta: delta,
            event_type,
            order_id: None,
            note: Some(reason.to_string()),
            recorded_at: Utc::now(),
        };
        LedgerRepository::append(&mut tx, &entry).await?;

        tx.commit().await.map_err(atlas_db::DbError::from)?;

        let new_stock = product.stock + delta;
        info!(
            product_id = %product_id,
            delta = %delta,
            new_stock = %new_stock,
            event = ?event_type,
            "inventory adjusted"
        );

        Ok(new_stock)
    }
}
