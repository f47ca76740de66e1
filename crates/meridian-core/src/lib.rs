//! # Meridian Core
//!
//! Pure order composition and pricing logic. No I/O, no database, no
//! network: every entry point is a function of its inputs, injected
//! stores included.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          meridian-core                                  │
//! │                                                                         │
//! │   raw drafts (input)      persisted graph (store)                       │
//! │          │                        │                                     │
//! │          └────────┬───────────────┘                                     │
//! │                   ▼                                                     │
//! │          compose() ── reconciliation builders                           │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │              OrderCopy ── the fully composed in-memory view             │
//! │               │      │                                                  │
//! │               ▼      ▼                                                  │
//! │       total_cost()   (wire serialization lives in meridian-gateway)    │
//! │                                                                         │
//! │   Supporting models: money, deductible, service_charge, fulfillment     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Persistence (`meridian-db`) and the external request builder
//! (`meridian-gateway`) sit on top of this crate and depend on it, never
//! the other way around.

pub mod compose;
pub mod deductible;
pub mod error;
pub mod fulfillment;
pub mod input;
pub mod money;
pub mod pricing;
pub mod service_charge;
pub mod store;
pub mod types;

pub use compose::{compose, LineCopy, OrderCopy};
pub use deductible::{
    AttachedDeductible, Deductible, DeductibleKind, Pricing, Scope, TaxMode,
};
pub use error::{CoreError, CoreResult};
pub use fulfillment::{
    Fulfillment, FulfillmentDetails, FulfillmentKind, FulfillmentState, Recipient,
};
pub use input::{DeductibleDraft, LineDraft, OrderDraft, ServiceChargeDraft};
pub use money::{CurrencyCode, Money, Percentage};
pub use pricing::total_cost;
pub use service_charge::{
    AttachedServiceCharge, CalculationPhase, ServiceCharge, TreatmentType,
};
pub use store::{CompositionStore, InMemoryStore};
pub use types::{
    AttachmentTarget, EngineConfig, Modifier, Order, OrderLine, OrderState, Product,
};
