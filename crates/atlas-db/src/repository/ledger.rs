//! # Inventory Ledger Repository
//!
//! Append-only store of stock movements.
//!
//! ## Append-Only Means Append-Only
//! This repository exposes INSERT and SELECT. There is no update, no
//! delete, and nothing elsewhere in the workspace issues either against
//! `inventory_ledger`. A failed append aborts the enclosing transaction:
//! the ledger is part of the consistency boundary, not best-effort
//! logging.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use atlas_core::LedgerEntry;

const LEDGER_COLUMNS: &str =
    "id, product_id, quantity_delta, event_type, order_id, note, recorded_at";

/// Repository for the inventory ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Appends one immutable entry on a transaction connection.
    pub async fn append(conn: &mut SqliteConnection, entry: &LedgerEntry) -> DbResult<()> {
        debug!(
            product_id = %entry.product_id,
            delta = %entry.quantity_delta,
            event = ?entry.event_type,
            "Appending ledger entry"
        );

        sqlx::query(
            r#"
            INSERT INTO inventory_ledger (
                id, product_id, quantity_delta, event_type, order_id, note, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(entry.quantity_delta)
        .bind(entry.event_type)
        .bind(&entry.order_id)
        .bind(&entry.note)
        .bind(entry.recorded_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// All entries for a product, in recorded (commit) order.
    pub async fn entries_for_product(&self, product_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM inventory_ledger \
             WHERE product_id = ?1 ORDER BY recorded_at, id"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// All entries caused by an order.
    pub async fn entries_for_order(&self, order_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM inventory_ledger \
             WHERE order_id = ?1 ORDER BY recorded_at, id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Net stock movement for a product across the whole ledger.
    ///
    /// ## Usage
    /// Reconciliation: for any product, `initial stock + net delta`
    /// must equal current stock.
    pub async fn net_delta_for_product(&self, product_id: &str) -> DbResult<i64> {
        let net: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(quantity_delta) FROM inventory_ledger WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(net.unwrap_or(0))
    }

    /// Counts all ledger entries (for diagnostics and tests).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_ledger")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new ledger entry ID.
pub fn generate_entry_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::generate_product_id;
    use atlas_core::{LedgerEventType, Product};
    use chrono::Utc;

    async fn seeded_product(db: &Database) -> String {
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: "TV-55".to_string(),
            name: "55in TV".to_string(),
            price_cents: 8_500_000,
            cost_cents: None,
            stock: 10,
            reorder_level: 2,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        product.id
    }

    fn entry(product_id: &str, delta: i64, event_type: LedgerEventType) -> LedgerEntry {
        LedgerEntry {
            id: generate_entry_id(),
            product_id: product_id.to_string(),
            quantity_delta: delta,
            event_type,
            order_id: None,
            note: Some("test".to_string()),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_net_delta() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product_id = seeded_product(&db).await;
        let repo = db.ledger();

        {
            let mut conn = db.pool().acquire().await.unwrap();
            LedgerRepository::append(&mut conn, &entry(&product_id, -3, LedgerEventType::Sale))
                .await
                .unwrap();
            LedgerRepository::append(&mut conn, &entry(&product_id, 3, LedgerEventType::Return))
                .await
                .unwrap();
            LedgerRepository::append(&mut conn, &entry(&product_id, 5, LedgerEventType::Purchase))
                .await
                .unwrap();
        }

        assert_eq!(repo.net_delta_for_product(&product_id).await.unwrap(), 5);
        assert_eq!(repo.count().await.unwrap(), 3);

        let entries = repo.entries_for_product(&product_id).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event_type, LedgerEventType::Sale);
    }

    #[tokio::test]
    async fn test_zero_delta_rejected_by_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product_id = seeded_product(&db).await;

        let mut conn = db.pool().acquire().await.unwrap();
        let result = LedgerRepository::append(
            &mut conn,
            &entry(&product_id, 0, LedgerEventType::Adjustment),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_product_rejected_by_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let result =
            LedgerRepository::append(&mut conn, &entry("missing", -1, LedgerEventType::Sale)).await;
        assert!(result.is_err());
    }
}
