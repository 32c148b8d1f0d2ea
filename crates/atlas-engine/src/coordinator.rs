//! # Transaction Coordinator
//!
//! Orchestrates an order as one unit: validate → reserve → persist →
//! commit, with every side effect in one place.
//!
//! ## Attempt Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     One Create-Order Attempt                            │
//! │                                                                         │
//! │  VALIDATING                                                             │
//! │  ├── shape: ids well-formed, quantities in range, lines non-empty      │
//! │  ├── customer exists and is active; tier discount resolved             │
//! │  └── duplicate product lines merged (one lock, one reservation each)   │
//! │       │                                                                 │
//! │  RESERVING                                                              │
//! │  ├── product row locks taken in ascending product-id order             │
//! │  ├── BEGIN transaction                                                  │
//! │  └── per line: reserve stock, freeze unit price                        │
//! │       │         any failure → rollback, locks drop, error out          │
//! │  PERSISTING                                                             │
//! │  ├── order header (status: completed) + order lines                    │
//! │  ├── one ledger entry per line (event: sale, delta: -qty)              │
//! │  └── customer aggregate: total_spent += total, last_purchase = now     │
//! │       │                                                                 │
//! │  COMMITTED                                                              │
//! │  └── COMMIT; effects become visible to other transactions              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The public `create_order` wraps the attempt in the retry controller:
//! contention failures re-run the whole attempt from validation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use atlas_core::validation::{validate_id, validate_order_line_count, validate_quantity};
use atlas_core::{
    price_order, LedgerEntry, LedgerEventType, LineInput, Order, OrderLine, OrderStatus,
    PaymentMethod, PriceBreakdown,
};
use atlas_db::repository::ledger::generate_entry_id;
use atlas_db::repository::order::{generate_line_id, generate_order_id};
use atlas_db::{Database, CustomerRepository, LedgerRepository, OrderRepository};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::inventory::{InventoryManager, ReservedLine};
use crate::locks::ProductLocks;
use crate::retry::run_with_retries;

// =============================================================================
// Requests & Receipts
// =============================================================================

/// One requested line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// A request to create an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    /// Who rang up the sale. Informational.
    pub employee_id: String,
    pub payment_method: PaymentMethod,
    pub lines: Vec<OrderLineRequest>,
}

/// What the caller gets back from a committed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub breakdown: PriceBreakdown,
    pub line_count: usize,
}

// =============================================================================
// Order Engine
// =============================================================================

/// The order transaction engine.
///
/// Cheap to clone; all clones share one lock table and one pool, which
/// is what makes the locking discipline process-wide.
#[derive(Debug, Clone)]
pub struct OrderEngine {
    pub(crate) db: Database,
    pub(crate) locks: Arc<ProductLocks>,
    pub(crate) inventory: InventoryManager,
    pub(crate) config: EngineConfig,
}

impl OrderEngine {
    /// Creates an engine over the given database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let locks = Arc::new(ProductLocks::new(config.lock_wait));
        let inventory = InventoryManager::new(db.clone(), locks.clone());
        OrderEngine {
            db,
            locks,
            inventory,
            config,
        }
    }

    /// The shared product lock table.
    ///
    /// Exposed so ad hoc administrative flows can coordinate with the
    /// engine instead of racing it.
    pub fn locks(&self) -> Arc<ProductLocks> {
        self.locks.clone()
    }

    /// The inventory manager.
    pub fn inventory(&self) -> &InventoryManager {
        &self.inventory
    }

    /// The database handle this engine runs against.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates an order: prices the lines with the customer's tier
    /// discount, reserves stock, and commits header, lines, ledger
    /// entries, and the customer aggregate as one unit.
    ///
    /// Contention failures are retried with backoff; all other failures
    /// surface immediately. Not idempotent: every successful call
    /// creates a new order.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(&self, request: &CreateOrderRequest) -> EngineResult<OrderReceipt> {
        run_with_retries(&self.config.retry, || self.create_order_once(request)).await
    }

    /// One full attempt. Any failure rolls back every effect of this
    /// attempt before the error is returned.
    async fn create_order_once(&self, request: &CreateOrderRequest) -> EngineResult<OrderReceipt> {
        // -- Validating ------------------------------------------------------
        validate_id("customer_id", &request.customer_id)?;
        validate_id("employee_id", &request.employee_id)?;
        validate_order_line_count(request.lines.len())?;
        for line in &request.lines {
            validate_id("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
        }

        // Merge duplicate products; BTreeMap gives ascending product-id
        // iteration, which is the required lock order.
        let mut merged: BTreeMap<&str, i64> = BTreeMap::new();
        for line in &request.lines {
            *merged.entry(line.product_id.as_str()).or_insert(0) += line.quantity;
        }
        for (_, qty) in merged.iter() {
            validate_quantity(*qty)?;
        }

        let customer = self
            .db
            .customers()
            .get_by_id(&request.customer_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| EngineError::CustomerNotFound(request.customer_id.clone()))?;

        let discount = self
            .db
            .customers()
            .tier_of(&customer.id)
            .await?
            .map(|tier| tier.discount())
            .unwrap_or_default();

        // -- Reserving -------------------------------------------------------
        let product_ids: Vec<String> = merged.keys().map(|id| id.to_string()).collect();
        let _guards = self.locks.acquire_ordered(&product_ids).await?;

        let mut tx = self.db.pool().begin().await.map_err(atlas_db::DbError::from)?;

        let mut reserved: Vec<ReservedLine> = Vec::with_capacity(merged.len());
        for (product_id, quantity) in merged.iter() {
            let line = InventoryManager::reserve_on(&mut tx, product_id, *quantity).await?;
            reserved.push(line);
        }

        // -- Pricing (pure) --------------------------------------------------
        let inputs: Vec<LineInput> = reserved
            .iter()
            .map(|r| LineInput::new(r.quantity, r.unit_price))
            .collect();
        let breakdown = price_order(&inputs, discount, self.config.tax_rate);

        // -- Persisting ------------------------------------------------------
        let now = Utc::now();
        let order_id = generate_order_id();

        let order = Order {
            id: order_id.clone(),
            customer_id: customer.id.clone(),
            employee_id: request.employee_id.clone(),
            payment_method: request.payment_method,
            subtotal_cents: breakdown.subtotal.cents(),
            discount_cents: breakdown.discount.cents(),
            tax_cents: breakdown.tax.cents(),
            total_cents: breakdown.total.cents(),
            status: OrderStatus::Completed,
            created_at: now,
            completed_at: Some(now),
            refunded_at: None,
        };
        OrderRepository::insert_order(&mut tx, &order).await?;

        for line in &reserved {
            let order_line = OrderLine {
                id: generate_line_id(),
                order_id: order_id.clone(),
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                discount_bps: discount.bps(),
                line_total_cents: line.unit_price.multiply_quantity(line.quantity).cents(),
                created_at: now,
            };
            OrderRepository::insert_line(&mut tx, &order_line).await?;

            let entry = LedgerEntry {
                id: generate_entry_id(),
                product_id: line.product_id.clone(),
                quantity_delta: -line.quantity,
                event_type: LedgerEventType::Sale,
                order_id: Some(order_id.clone()),
                note: None,
                recorded_at: now,
            };
            LedgerRepository::append(&mut tx, &entry).await?;
        }

        CustomerRepository::apply_spend_delta(
            &mut tx,
            &customer.id,
            breakdown.total.cents(),
            Some(now),
        )
        .await?;

        // -- Committed -------------------------------------------------------
        tx.commit().await.map_err(atlas_db::DbError::from)?;

        info!(
            order_id = %order_id,
            customer_id = %customer.id,
            lines = reserved.len(),
            total_cents = breakdown.total.cents(),
            "order committed"
        );

        Ok(OrderReceipt {
            order_id,
            breakdown,
            line_count: reserved.len(),
        })
    }

    /// Applies a direct administrative stock adjustment (shares the
    /// reservation manager's lock discipline, retried on contention).
    ///
    /// ## Returns
    /// The new stock level.
    pub async fn adjust_inventory(
        &self,
        product_id: &str,
        delta: i64,
        reason: &str,
    ) -> EngineResult<i64> {
        run_with_retries(&self.config.retry, || {
            self.inventory.adjust(product_id, delta, reason)
        })
        .await
    }

    /// Records stock received from a supplier.
    ///
    /// ## Returns
    /// The new stock level.
    pub async fn receive_stock(
        &self,
        product_id: &str,
        quantity: i64,
        reason: &str,
    ) -> EngineResult<i64> {
        run_with_retries(&self.config.retry, || {
            self.inventory.receive_stock(product_id, quantity, reason)
        })
        .await
    }

    /// Loads a committed order and its lines.
    pub async fn order_with_lines(
        &self,
        order_id: &str,
    ) -> EngineResult<(Order, Vec<OrderLine>)> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
        let lines = self.db.orders().get_lines(order_id).await?;
        Ok((order, lines))
    }
}
