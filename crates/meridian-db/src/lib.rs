//! # meridian-db: Persistence Layer for the Meridian Order Engine
//!
//! SQLite storage for the order graph, built on sqlx. The composition
//! and pricing logic lives in `meridian-core`; this crate only moves
//! validated domain values in and out of rows.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Meridian Persistence Flow                           │
//! │                                                                         │
//! │  meridian-core::compose() ──► OrderCopy                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    meridian-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ CatalogRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo      │    │ 001_init.sql │  │   │
//! │  │   │ WAL, FKs on   │    │                │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database ──► OrderRepository::load_graph() ──► InMemoryStore   │
//! │  (the same snapshot type core tests use, so composition behaves        │
//! │   identically with and without a database)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Validation At The Boundary
//!
//! Rows are rehydrated through the core constructors
//! (`Pricing::from_parts`, `ServiceCharge::from_persisted`), so a row
//! edited outside the application surfaces as [`DbError::Domain`] on
//! load instead of corrupting a priced order.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (catalog, order)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/meridian.db")).await?;
//!
//! db.catalog().upsert_product(&espresso).await?;
//!
//! let copy = compose(&order, &draft, &store, &config)?;
//! db.orders().save_composed(&copy).await?;
//!
//! let (order, store) = db.orders().load_graph(&order_id).await?.unwrap();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::order::OrderRepository;
