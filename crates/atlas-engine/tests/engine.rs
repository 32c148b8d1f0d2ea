//! End-to-end tests for the order transaction engine against a real
//! SQLite database (temp file, multi-connection pool, WAL).

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use atlas_core::{Customer, CustomerTier, OrderStatus, PaymentMethod, Product, TaxRate};
use atlas_db::{Database, DbConfig};
use atlas_engine::{
    CreateOrderRequest, EngineConfig, EngineError, OrderEngine, OrderLineRequest, RetryPolicy,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Engine over a fresh temp-file database: 18% tax, generous lock wait
/// so many contenders can serialize without spurious timeouts.
async fn setup() -> (OrderEngine, Database) {
    init_tracing();

    let db = Database::new(DbConfig::temp()).await.unwrap();
    let config = EngineConfig::new(TaxRate::from_bps(1800))
        .lock_wait(Duration::from_secs(2))
        .retry(
            RetryPolicy::new(3)
                .base_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(100)),
        );
    let engine = OrderEngine::new(db.clone(), config);
    (engine, db)
}

/// Engine tuned for forcing lock timeouts quickly: short lock wait,
/// short backoff. Used by the contention-simulation tests.
async fn contended_setup() -> (OrderEngine, Database) {
    init_tracing();

    let db = Database::new(DbConfig::temp()).await.unwrap();
    let config = EngineConfig::new(TaxRate::from_bps(1800))
        .lock_wait(Duration::from_millis(50))
        .retry(
            RetryPolicy::new(3)
                .base_delay(Duration::from_millis(5))
                .max_delay(Duration::from_millis(40)),
        );
    let engine = OrderEngine::new(db.clone(), config);
    (engine, db)
}

async fn seed_tier(db: &Database, name: &str, discount_bps: u32) -> String {
    let tier = CustomerTier {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        min_spent_cents: 0,
        discount_bps,
        created_at: Utc::now(),
    };
    db.customers().insert_tier(&tier).await.unwrap();
    tier.id
}

async fn seed_customer(db: &Database, tier_id: Option<String>) -> String {
    let now = Utc::now();
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        name: "Asha Verma".to_string(),
        tier_id,
        total_spent_cents: 0,
        last_purchase_date: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.customers().insert(&customer).await.unwrap();
    customer.id
}

async fn seed_product(db: &Database, sku: &str, price_cents: i64, stock: i64) -> String {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        sku: sku.to_string(),
        name: format!("Product {sku}"),
        price_cents,
        cost_cents: Some(price_cents * 7 / 10),
        stock,
        reorder_level: 2,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.products().insert(&product).await.unwrap();
    product.id
}

fn one_line_request(customer_id: &str, product_id: &str, quantity: i64) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: customer_id.to_string(),
        employee_id: Uuid::new_v4().to_string(),
        payment_method: PaymentMethod::Card,
        lines: vec![OrderLineRequest {
            product_id: product_id.to_string(),
            quantity,
        }],
    }
}

// =============================================================================
// Pricing & commit
// =============================================================================

/// The reference scenario: tier discount 10%, tax 18%, one line
/// qty 1 @ 85000.00 → subtotal 85000.00, discount 8500.00, tax 13770.00,
/// total 90270.00.
#[tokio::test]
async fn test_create_order_reference_pricing() {
    let (engine, db) = setup().await;

    let tier_id = seed_tier(&db, "Gold", 1000).await;
    let customer_id = seed_customer(&db, Some(tier_id)).await;
    let product_id = seed_product(&db, "TV-55", 8_500_000, 10).await;

    let receipt = engine
        .create_order(&one_line_request(&customer_id, &product_id, 1))
        .await
        .unwrap();

    assert_eq!(receipt.line_count, 1);
    assert_eq!(receipt.breakdown.subtotal.cents(), 8_500_000);
    assert_eq!(receipt.breakdown.discount.cents(), 850_000);
    assert_eq!(receipt.breakdown.tax.cents(), 1_377_000);
    assert_eq!(receipt.breakdown.total.cents(), 9_027_000);

    // Header persisted as completed, totals consistent
    let (order, lines) = engine.order_with_lines(&receipt.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(
        order.total_cents,
        order.subtotal_cents - order.discount_cents + order.tax_cents
    );
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 1);
    assert_eq!(lines[0].unit_price_cents, 8_500_000);
    assert_eq!(lines[0].discount_bps, 1000);

    // Stock decremented, exactly one sale ledger entry for the order
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 9);
    let entries = db.ledger().entries_for_order(&receipt.order_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity_delta, -1);

    // Customer aggregate moved by exactly the total
    let customer = db.customers().get_by_id(&customer_id).await.unwrap().unwrap();
    assert_eq!(customer.total_spent_cents, 9_027_000);
    assert!(customer.last_purchase_date.is_some());
}

#[tokio::test]
async fn test_create_order_without_tier_gets_no_discount() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "ACC-01", 100_000, 5).await;

    let receipt = engine
        .create_order(&one_line_request(&customer_id, &product_id, 2))
        .await
        .unwrap();

    assert_eq!(receipt.breakdown.subtotal.cents(), 200_000);
    assert_eq!(receipt.breakdown.discount.cents(), 0);
    assert_eq!(receipt.breakdown.tax.cents(), 36_000);
    assert_eq!(receipt.breakdown.total.cents(), 236_000);
}

#[tokio::test]
async fn test_multi_line_order_sums_to_subtotal() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let tv = seed_product(&db, "TV-43", 4_500_000, 3).await;
    let cable = seed_product(&db, "ACC-HDMI", 49_900, 20).await;

    let request = CreateOrderRequest {
        customer_id: customer_id.clone(),
        employee_id: Uuid::new_v4().to_string(),
        payment_method: PaymentMethod::Cash,
        lines: vec![
            OrderLineRequest {
                product_id: tv.clone(),
                quantity: 1,
            },
            OrderLineRequest {
                product_id: cable.clone(),
                quantity: 2,
            },
        ],
    };

    let receipt = engine.create_order(&request).await.unwrap();
    let (order, lines) = engine.order_with_lines(&receipt.order_id).await.unwrap();

    assert_eq!(lines.len(), 2);
    let line_sum: i64 = lines.iter().map(|l| l.line_total_cents).sum();
    assert_eq!(line_sum, order.subtotal_cents);
    assert_eq!(order.subtotal_cents, 4_500_000 + 2 * 49_900);

    // One sale ledger entry per line
    let entries = db.ledger().entries_for_order(&receipt.order_id).await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_duplicate_product_lines_are_merged() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "MOB-A1", 1_999_900, 10).await;

    let request = CreateOrderRequest {
        customer_id: customer_id.clone(),
        employee_id: Uuid::new_v4().to_string(),
        payment_method: PaymentMethod::Card,
        lines: vec![
            OrderLineRequest {
                product_id: product_id.clone(),
                quantity: 1,
            },
            OrderLineRequest {
                product_id: product_id.clone(),
                quantity: 2,
            },
        ],
    };

    let receipt = engine.create_order(&request).await.unwrap();
    let (_, lines) = engine.order_with_lines(&receipt.order_id).await.unwrap();

    // One merged line of quantity 3, one ledger entry of -3
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 7);

    let entries = db.ledger().entries_for_order(&receipt.order_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity_delta, -3);
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn test_insufficient_stock_surfaces_immediately() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "APP-AC", 3_500_000, 2).await;

    let err = engine
        .create_order(&one_line_request(&customer_id, &product_id, 5))
        .await
        .unwrap_err();

    match err {
        EngineError::InsufficientStock {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, 2);
            assert_eq!(requested, 5);
        }
        other => panic!("unexpected: {other:?}"),
    }

    // Nothing written, nothing reserved
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 2);
    assert_eq!(db.orders().count().await.unwrap(), 0);
    assert_eq!(db.ledger().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_line_rolls_back_prior_reservations() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    // Whichever of the two ids sorts first, the attempt must leave both
    // stocks untouched.
    let plenty = seed_product(&db, "AUD-SB", 1_500_000, 10).await;
    let empty = seed_product(&db, "AUD-EB", 500_000, 0).await;

    let request = CreateOrderRequest {
        customer_id: customer_id.clone(),
        employee_id: Uuid::new_v4().to_string(),
        payment_method: PaymentMethod::Card,
        lines: vec![
            OrderLineRequest {
                product_id: plenty.clone(),
                quantity: 2,
            },
            OrderLineRequest {
                product_id: empty.clone(),
                quantity: 1,
            },
        ],
    };

    let err = engine.create_order(&request).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));

    // The reservable line was rolled back with the attempt
    assert_eq!(db.products().stock_of(&plenty).await.unwrap(), 10);
    assert_eq!(db.products().stock_of(&empty).await.unwrap(), 0);
    assert_eq!(db.orders().count().await.unwrap(), 0);
    assert_eq!(db.orders().line_count().await.unwrap(), 0);
    assert_eq!(db.ledger().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_validation_failures_write_nothing() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "TV-32", 1_500_000, 5).await;

    // Non-positive quantity
    let err = engine
        .create_order(&one_line_request(&customer_id, &product_id, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // Empty line set
    let err = engine
        .create_order(&CreateOrderRequest {
            customer_id: customer_id.clone(),
            employee_id: Uuid::new_v4().to_string(),
            payment_method: PaymentMethod::Cash,
            lines: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // Unknown customer (well-formed id)
    let err = engine
        .create_order(&one_line_request(
            &Uuid::new_v4().to_string(),
            &product_id,
            1,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CustomerNotFound(_)));

    // Unknown product (well-formed id)
    let err = engine
        .create_order(&one_line_request(
            &customer_id,
            &Uuid::new_v4().to_string(),
            1,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProductNotFound(_)));

    assert_eq!(db.orders().count().await.unwrap(), 0);
    assert_eq!(db.ledger().count().await.unwrap(), 0);
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 5);
}

#[tokio::test]
async fn test_inactive_product_not_sellable() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "OLD-SKU", 99_900, 5).await;
    db.products().soft_delete(&product_id).await.unwrap();

    let err = engine
        .create_order(&one_line_request(&customer_id, &product_id, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProductNotFound(_)));
}

// =============================================================================
// Concurrency
// =============================================================================

/// N concurrent single-unit orders against stock S commit exactly
/// min(N, S) of them; the rest fail with InsufficientStock; final stock
/// is S - min(N, S).
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_oversell_under_concurrency() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "MOB-X", 2_500_000, 5).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let request = one_line_request(&customer_id, &product_id, 1);
        handles.push(tokio::spawn(
            async move { engine.create_order(&request).await },
        ));
    }

    let mut successes = 0;
    let mut stockouts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EngineError::InsufficientStock { .. }) => stockouts += 1,
            Err(other) => panic!("unexpected: {other:?}"),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(stockouts, 3);
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 0);
    assert_eq!(db.orders().count().await.unwrap(), 5);
    assert_eq!(db.ledger().count().await.unwrap(), 5);
    assert_eq!(db.ledger().net_delta_for_product(&product_id).await.unwrap(), -5);
}

/// Orders over disjoint product sets do not contend.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_orders_commit_concurrently() {
    let (engine, db) = setup().await;

    let customer_a = seed_customer(&db, None).await;
    let customer_b = seed_customer(&db, None).await;
    let product_a = seed_product(&db, "TV-A", 1_000_000, 4).await;
    let product_b = seed_product(&db, "TV-B", 2_000_000, 4).await;

    let engine_a = engine.clone();
    let request_a = one_line_request(&customer_a, &product_a, 2);
    let task_a = tokio::spawn(async move { engine_a.create_order(&request_a).await });

    let engine_b = engine.clone();
    let request_b = one_line_request(&customer_b, &product_b, 3);
    let task_b = tokio::spawn(async move { engine_b.create_order(&request_b).await });

    task_a.await.unwrap().unwrap();
    task_b.await.unwrap().unwrap();

    assert_eq!(db.products().stock_of(&product_a).await.unwrap(), 2);
    assert_eq!(db.products().stock_of(&product_b).await.unwrap(), 1);
    assert_eq!(db.orders().count().await.unwrap(), 2);
}

/// With a product row lock held for longer than the whole retry budget,
/// create_order reports ExhaustedRetries and leaves no partial rows.
#[tokio::test]
async fn test_retry_exhaustion_leaves_no_partial_state() {
    let (engine, db) = contended_setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "APP-WM", 3_000_000, 5).await;

    // Simulated contention: hold the row lock across all attempts
    let _held = engine.locks().acquire(&product_id).await.unwrap();

    let err = engine
        .create_order(&one_line_request(&customer_id, &product_id, 1))
        .await
        .unwrap_err();

    match err {
        EngineError::ExhaustedRetries { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("unexpected: {other:?}"),
    }

    // No order, line, or ledger rows; stock and aggregate untouched
    assert_eq!(db.orders().count().await.unwrap(), 0);
    assert_eq!(db.orders().line_count().await.unwrap(), 0);
    assert_eq!(db.ledger().count().await.unwrap(), 0);
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 5);
    let customer = db.customers().get_by_id(&customer_id).await.unwrap().unwrap();
    assert_eq!(customer.total_spent_cents, 0);
}

/// Once the holder lets go, a retried attempt gets through.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_succeeds_after_contention_clears() {
    let (engine, db) = contended_setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "AUD-AV", 4_000_000, 5).await;

    let held = engine.locks().acquire(&product_id).await.unwrap();

    let worker = engine.clone();
    let request = one_line_request(&customer_id, &product_id, 1);
    let task = tokio::spawn(async move { worker.create_order(&request).await });

    // Let the first attempt time out, then release
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(held);

    let receipt = task.await.unwrap().unwrap();
    assert_eq!(receipt.breakdown.subtotal.cents(), 4_000_000);
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 4);
}

// =============================================================================
// Compensation
// =============================================================================

/// CreateOrder followed by ReverseOrder restores stock and the
/// customer aggregate exactly.
#[tokio::test]
async fn test_reversal_round_trip() {
    let (engine, db) = setup().await;

    let tier_id = seed_tier(&db, "Gold", 1000).await;
    let customer_id = seed_customer(&db, Some(tier_id)).await;
    let product_id = seed_product(&db, "TV-55", 8_500_000, 10).await;

    let receipt = engine
        .create_order(&one_line_request(&customer_id, &product_id, 2))
        .await
        .unwrap();
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 8);

    let reversal = engine
        .reverse_order(&receipt.order_id, "customer returned items")
        .await
        .unwrap();
    assert_eq!(reversal.line_count, 1);
    assert_eq!(reversal.restored_total.cents(), receipt.breakdown.total.cents());

    // Stock and spend are back to pre-order values
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 10);
    let customer = db.customers().get_by_id(&customer_id).await.unwrap().unwrap();
    assert_eq!(customer.total_spent_cents, 0);

    // Order is refunded; ledger carries one compensating +2 per -2
    let (order, _) = engine.order_with_lines(&receipt.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert!(order.refunded_at.is_some());

    let entries = db.ledger().entries_for_order(&receipt.order_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    let mut deltas: Vec<i64> = entries.iter().map(|e| e.quantity_delta).collect();
    deltas.sort();
    assert_eq!(deltas, vec![-2, 2]);
    assert_eq!(db.ledger().net_delta_for_product(&product_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_double_reversal_rejected() {
    let (engine, db) = setup().await;

    let customer_id = seed_customer(&db, None).await;
    let product_id = seed_product(&db, "MOB-T8", 1_200_000, 6).await;

    let receipt = engine
        .create_order(&one_line_request(&customer_id, &product_id, 3))
        .await
        .unwrap();

    engine
        .reverse_order(&receipt.order_id, "damaged in transit")
        .await
        .unwrap();

    let err = engine
        .reverse_order(&receipt.order_id, "duplicate request")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyReversed { .. }));

    // Restored exactly once
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 6);
    let entries = db.ledger().entries_for_order(&receipt.order_id).await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_reverse_unknown_order() {
    let (engine, _db) = setup().await;

    let err = engine
        .reverse_order(&Uuid::new_v4().to_string(), "no such order")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::OrderNotFound(_)));
}

// =============================================================================
// Inventory administration
// =============================================================================

#[tokio::test]
async fn test_adjust_inventory_writes_ledger() {
    let (engine, db) = setup().await;

    let product_id = seed_product(&db, "ACC-PB", 299_900, 10).await;

    let new_stock = engine
        .adjust_inventory(&product_id, -4, "stocktake correction")
        .await
        .unwrap();
    assert_eq!(new_stock, 6);
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 6);

    let entries = db.ledger().entries_for_product(&product_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity_delta, -4);
    assert_eq!(entries[0].note.as_deref(), Some("stocktake correction"));
}

#[tokio::test]
async fn test_adjust_inventory_cannot_go_negative() {
    let (engine, db) = setup().await;

    let product_id = seed_product(&db, "ACC-RC", 49_900, 3).await;

    let err = engine
        .adjust_inventory(&product_id, -5, "bad count")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));

    // Refused atomically: no stock change, no ledger entry
    assert_eq!(db.products().stock_of(&product_id).await.unwrap(), 3);
    assert_eq!(db.ledger().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_receive_stock_records_purchase() {
    let (engine, db) = setup().await;

    let product_id = seed_product(&db, "TV-65", 12_500_000, 1).await;

    let new_stock = engine
        .receive_stock(&product_id, 9, "PO-2031 delivery")
        .await
        .unwrap();
    assert_eq!(new_stock, 10);

    let entries = db.ledger().entries_for_product(&product_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity_delta, 9);

    // Zero and negative deltas are caller bugs
    let err = engine.adjust_inventory(&product_id, 0, "noop").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
