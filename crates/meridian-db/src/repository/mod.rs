//! # Repository Module
//!
//! Database repository implementations for the Meridian order engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Callers never see SQL. They see two narrow surfaces:                   │
//! │                                                                         │
//! │  db.catalog()                     db.orders()                           │
//! │       │                                │                                │
//! │       ▼                                ▼                                │
//! │  CatalogRepository                OrderRepository                       │
//! │  ├── upsert_product               ├── save_composed   (one transaction) │
//! │  ├── upsert_deductible            ├── load_graph      (→ InMemoryStore) │
//! │  ├── upsert_service_charge        └── get_order                         │
//! │  ├── upsert_modifier                                                    │
//! │  └── upsert_customer                                                    │
//! │       │                                │                                │
//! │       ▼                                ▼                                │
//! │                      SQLite Database                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Products, deductibles, service
//!   charges, modifiers, customers
//! - [`order::OrderRepository`] - Atomic order persistence and graph
//!   hydration

pub mod catalog;
pub mod order;
