//! # Customer Repository
//!
//! Database operations for customers and customer tiers.
//!
//! ## The Spend Aggregate Is Owned
//! `customers.total_spent_cents` has exactly one writer in this codebase:
//! [`CustomerRepository::apply_spend_delta`], called by the transaction
//! coordinator (on commit) and the compensation engine (on reversal),
//! always inside their transactions. No other code path may touch it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use atlas_core::{Customer, CustomerTier};

const CUSTOMER_COLUMNS: &str =
    "id, name, tier_id, total_spent_cents, last_purchase_date, is_active, \
     created_at, updated_at";

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Resolves the tier of a customer, if they have one.
    ///
    /// ## Usage
    /// The coordinator calls this during validation to obtain the tier
    /// discount. A customer with no tier gets no discount.
    pub async fn tier_of(&self, customer_id: &str) -> DbResult<Option<CustomerTier>> {
        let tier = sqlx::query_as::<_, CustomerTier>(
            r#"
            SELECT t.id, t.name, t.min_spent_cents, t.discount_bps, t.created_at
            FROM customer_tiers t
            INNER JOIN customers c ON c.tier_id = t.id
            WHERE c.id = ?1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tier)
    }

    /// Inserts a new customer.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, tier_id, total_spent_cents, last_purchase_date,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.tier_id)
        .bind(customer.total_spent_cents)
        .bind(customer.last_purchase_date)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a customer tier.
    pub async fn insert_tier(&self, tier: &CustomerTier) -> DbResult<()> {
        debug!(name = %tier.name, discount_bps = %tier.discount_bps, "Inserting tier");

        sqlx::query(
            r#"
            INSERT INTO customer_tiers (id, name, min_spent_cents, discount_bps, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&tier.id)
        .bind(&tier.name)
        .bind(tier.min_spent_cents)
        .bind(tier.discount_bps)
        .bind(tier.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Applies a signed delta to the customer's cumulative spend.
    ///
    /// ## Arguments
    /// * `delta_cents` - positive on commit, negative on reversal
    /// * `purchased_at` - when set, also stamps `last_purchase_date`
    ///   (the commit path passes the order time; the reversal path
    ///   passes None and leaves the date alone)
    ///
    /// Transaction-scoped: runs on the coordinator's connection so the
    /// aggregate moves atomically with the order and ledger writes.
    pub async fn apply_spend_delta(
        conn: &mut SqliteConnection,
        customer_id: &str,
        delta_cents: i64,
        purchased_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        debug!(customer_id = %customer_id, delta = %delta_cents, "Applying spend delta");

        let now = Utc::now();

        let result = match purchased_at {
            Some(at) => {
                sqlx::query(
                    r#"
                    UPDATE customers
                    SET total_spent_cents = total_spent_cents + ?2,
                        last_purchase_date = ?3,
                        updated_at = ?4
                    WHERE id = ?1
                    "#,
                )
                .bind(customer_id)
                .bind(delta_cents)
                .bind(at)
                .bind(now)
                .execute(conn)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE customers
                    SET total_spent_cents = total_spent_cents + ?2,
                        updated_at = ?3
                    WHERE id = ?1
                    "#,
                )
                .bind(customer_id)
                .bind(delta_cents)
                .bind(now)
                .execute(conn)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", customer_id));
        }

        Ok(())
    }

    /// Lists active customers (for diagnostics and seeding).
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE is_active = 1 ORDER BY name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }
}

/// Helper to generate a new customer ID.
pub fn generate_customer_id() -> String {
    Uuid::new_v4().to_string()
}

/// Helper to generate a new tier ID.
pub fn generate_tier_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn sample_tier(name: &str, discount_bps: u32) -> CustomerTier {
        CustomerTier {
            id: generate_tier_id(),
            name: name.to_string(),
            min_spent_cents: 0,
            discount_bps,
            created_at: Utc::now(),
        }
    }

    fn sample_customer(name: &str, tier_id: Option<String>) -> Customer {
        let now = Utc::now();
        Customer {
            id: generate_customer_id(),
            name: name.to_string(),
            tier_id,
            total_spent_cents: 0,
            last_purchase_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_tier_resolution() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        let tier = sample_tier("Gold", 1000);
        repo.insert_tier(&tier).await.unwrap();

        let customer = sample_customer("Asha", Some(tier.id.clone()));
        repo.insert(&customer).await.unwrap();

        let resolved = repo.tier_of(&customer.id).await.unwrap().unwrap();
        assert_eq!(resolved.name, "Gold");
        assert_eq!(resolved.discount_bps, 1000);
    }

    #[tokio::test]
    async fn test_customer_without_tier() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        let customer = sample_customer("Walk-in", None);
        repo.insert(&customer).await.unwrap();

        assert!(repo.tier_of(&customer.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spend_delta_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        let customer = sample_customer("Asha", None);
        repo.insert(&customer).await.unwrap();

        let purchased = Utc::now();

        // Checked out per step: the in-memory pool holds one connection
        {
            let mut conn = db.pool().acquire().await.unwrap();
            CustomerRepository::apply_spend_delta(
                &mut conn,
                &customer.id,
                9_027_000,
                Some(purchased),
            )
            .await
            .unwrap();
        }

        let loaded = repo.get_by_id(&customer.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_spent_cents, 9_027_000);
        assert!(loaded.last_purchase_date.is_some());

        // Reversal: spend goes back down, last purchase date stays
        {
            let mut conn = db.pool().acquire().await.unwrap();
            CustomerRepository::apply_spend_delta(&mut conn, &customer.id, -9_027_000, None)
                .await
                .unwrap();
        }

        let loaded = repo.get_by_id(&customer.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_spent_cents, 0);
        assert!(loaded.last_purchase_date.is_some());
    }

    #[tokio::test]
    async fn test_spend_delta_unknown_customer() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = CustomerRepository::apply_spend_delta(&mut conn, "missing", 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
