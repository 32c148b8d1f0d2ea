//! # Order Repository
//!
//! Database operations for order headers and lines.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. COMMIT (coordinator, one transaction)                              │
//! │     └── insert_order() → Order { status: Completed }                   │
//! │     └── insert_line() per line                                         │
//! │     └── (ledger entries + customer aggregate in same transaction)      │
//! │                                                                         │
//! │  2. (OPTIONAL) REVERSE (compensation engine, one transaction)          │
//! │     └── mark_refunded() → Order { status: Refunded }                   │
//! │         Conditional on status = 'completed'; zero rows affected        │
//! │         means someone else reversed it first.                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no draft mutation path: an order row only ever appears in its
//! final, fully-priced form.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use atlas_core::{Order, OrderLine};

const ORDER_COLUMNS: &str =
    "id, customer_id, employee_id, payment_method, subtotal_cents, discount_cents, \
     tax_cents, total_cents, status, created_at, completed_at, refunded_at";

const LINE_COLUMNS: &str =
    "id, order_id, product_id, quantity, unit_price_cents, discount_bps, \
     line_total_cents, created_at";

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets all lines for an order, in insertion order.
    pub async fn get_lines(&self, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ?1 ORDER BY created_at, id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Inserts an order header on a transaction connection.
    pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, total = %order.total_cents, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, employee_id, payment_method,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                status, created_at, completed_at, refunded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(&order.employee_id)
        .bind(order.payment_method)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(order.status)
        .bind(order.created_at)
        .bind(order.completed_at)
        .bind(order.refunded_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Inserts an order line on a transaction connection.
    pub async fn insert_line(conn: &mut SqliteConnection, line: &OrderLine) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_lines (
                id, order_id, product_id, quantity,
                unit_price_cents, discount_bps, line_total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&line.id)
        .bind(&line.order_id)
        .bind(&line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(line.discount_bps)
        .bind(line.line_total_cents)
        .bind(line.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Flips a completed order to refunded.
    ///
    /// ## Returns
    /// * `Ok(true)` - this call performed the transition
    /// * `Ok(false)` - the order was not in `completed` status (already
    ///   reversed by a concurrent caller, or never committed)
    ///
    /// The conditional WHERE clause is what makes double-reversal safe:
    /// of two racing reversals, exactly one sees a row flip.
    pub async fn mark_refunded(conn: &mut SqliteConnection, order_id: &str) -> DbResult<bool> {
        debug!(order_id = %order_id, "Marking order refunded");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'refunded', refunded_at = ?2
            WHERE id = ?1 AND status = 'completed'
            "#,
        )
        .bind(order_id)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts order headers (for diagnostics and tests).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts order lines (for diagnostics and tests).
    pub async fn line_count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_lines")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new order ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new order line ID.
pub fn generate_line_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::customer::{generate_customer_id, CustomerRepository};
    use atlas_core::{Customer, OrderStatus, PaymentMethod};

    async fn seeded_customer(db: &Database) -> String {
        let now = Utc::now();
        let customer = Customer {
            id: generate_customer_id(),
            name: "Asha".to_string(),
            tier_id: None,
            total_spent_cents: 0,
            last_purchase_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        CustomerRepository::new(db.pool().clone())
            .insert(&customer)
            .await
            .unwrap();
        customer.id
    }

    fn sample_order(customer_id: &str) -> Order {
        let now = Utc::now();
        Order {
            id: generate_order_id(),
            customer_id: customer_id.to_string(),
            employee_id: Uuid::new_v4().to_string(),
            payment_method: PaymentMethod::Card,
            subtotal_cents: 8_500_000,
            discount_cents: 850_000,
            tax_cents: 1_377_000,
            total_cents: 9_027_000,
            status: OrderStatus::Completed,
            created_at: now,
            completed_at: Some(now),
            refunded_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer_id = seeded_customer(&db).await;
        let repo = db.orders();

        let order = sample_order(&customer_id);
        {
            let mut conn = db.pool().acquire().await.unwrap();
            OrderRepository::insert_order(&mut conn, &order).await.unwrap();
        }

        let loaded = repo.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Completed);
        assert_eq!(loaded.total_cents, 9_027_000);
        assert_eq!(loaded.payment_method, PaymentMethod::Card);
    }

    #[tokio::test]
    async fn test_mark_refunded_is_conditional() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer_id = seeded_customer(&db).await;
        let repo = db.orders();

        let order = sample_order(&customer_id);
        {
            let mut conn = db.pool().acquire().await.unwrap();
            OrderRepository::insert_order(&mut conn, &order).await.unwrap();

            // First flip succeeds
            assert!(OrderRepository::mark_refunded(&mut conn, &order.id)
                .await
                .unwrap());
        }

        let loaded = repo.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Refunded);
        assert!(loaded.refunded_at.is_some());

        let mut conn = db.pool().acquire().await.unwrap();

        // Second flip refuses
        assert!(!OrderRepository::mark_refunded(&mut conn, &order.id)
            .await
            .unwrap());

        // Unknown order also refuses
        assert!(!OrderRepository::mark_refunded(&mut conn, "missing")
            .await
            .unwrap());
    }
}
