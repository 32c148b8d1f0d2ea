//! # atlas-engine: The Order Transaction Engine
//!
//! Creates a sale, reserves inventory, computes tiered pricing, and later
//! compensates (returns/refunds) that sale, while multiple concurrent
//! actors operate on the same product or customer rows.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Atlas Retail Architecture                          │
//! │                                                                         │
//! │  Caller (POS terminal, service endpoint, admin tool)                   │
//! │       │                                                                 │
//! │       │  create_order / reverse_order / adjust_inventory               │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ atlas-engine (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────────── retry controller ────────────────────┐ │   │
//! │  │   │                                                          │ │   │
//! │  │   │  ┌──────────────┐   ┌─────────────┐   ┌──────────────┐  │ │   │
//! │  │   │  │ coordinator  │──►│  inventory  │──►│ product row  │  │ │   │
//! │  │   │  │ (one atomic  │   │ reservation │   │ locks        │  │ │   │
//! │  │   │  │  attempt)    │   │ manager     │   │ (ascending)  │  │ │   │
//! │  │   │  └──────────────┘   └─────────────┘   └──────────────┘  │ │   │
//! │  │   │  ┌──────────────┐                                        │ │   │
//! │  │   │  │ compensation │  reversal = mirror of commit           │ │   │
//! │  │   │  └──────────────┘                                        │ │   │
//! │  │   └──────────────────────────────────────────────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  atlas-db (repositories, one SQLite transaction per attempt)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Never oversell**: stock checks and decrements happen under an
//!   exclusive per-product lock; `Product.stock >= 0` always.
//! - **All-or-nothing**: an attempt's order header, lines, ledger
//!   entries, stock movements, and customer aggregate land in one
//!   transaction; a failed attempt leaves nothing behind.
//! - **Deadlock-free locking**: row locks are taken in ascending
//!   product-id order, so lock cycles cannot form.
//! - **Typed failure classes**: transient contention (worth retrying)
//!   is distinct from permanent failures (not worth retrying); the
//!   retry controller enforces the distinction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use atlas_core::TaxRate;
//! use atlas_db::{Database, DbConfig};
//! use atlas_engine::{CreateOrderRequest, EngineConfig, OrderEngine, OrderLineRequest};
//!
//! let db = Database::new(DbConfig::new("./atlas.db")).await?;
//! let engine = OrderEngine::new(db, EngineConfig::new(TaxRate::from_bps(1800)));
//!
//! let receipt = engine
//!     .create_order(&CreateOrderRequest {
//!         customer_id,
//!         employee_id,
//!         payment_method: atlas_core::PaymentMethod::Card,
//!         lines: vec![OrderLineRequest { product_id, quantity: 1 }],
//!     })
//!     .await?;
//!
//! engine.reverse_order(&receipt.order_id, "customer returned item").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod inventory;
pub mod locks;
pub mod retry;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use compensation::ReversalReceipt;
pub use config::EngineConfig;
pub use coordinator::{CreateOrderRequest, OrderEngine, OrderLineRequest, OrderReceipt};
pub use error::{ContentionError, EngineError, EngineResult};
pub use inventory::InventoryManager;
pub use locks::ProductLocks;
pub use retry::RetryPolicy;
