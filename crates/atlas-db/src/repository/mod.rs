//! # Repository Module
//!
//! Database repository implementations for Atlas Retail.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Engine operation                                                      │
//! │       │                                                                 │
//! │       │  db.products().get_by_id(id)                                   │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  ProductRepository                                                     │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── insert(&self, product)                                            │
//! │  └── apply_stock_delta(conn, id, delta)   ← transaction-scoped        │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods that must participate in the coordinator's atomic write phase
//! take a `&mut SqliteConnection` so they can run inside one transaction;
//! plain reads go through the pool.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Product reads and guarded stock writes
//! - [`customer::CustomerRepository`] - Customers, tiers, spend aggregate
//! - [`order::OrderRepository`] - Order headers, lines, status transitions
//! - [`ledger::LedgerRepository`] - Append-only inventory ledger

pub mod customer;
pub mod ledger;
pub mod order;
pub mod product;
