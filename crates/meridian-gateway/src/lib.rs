//! # Meridian Gateway
//!
//! Serialization of a composed order into the external payment
//! processor's request shape.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   OrderCopy (meridian-core)                                             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   RequestBuilder::new(currency).build(&copy)                            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   CreateOrderRequest { order, idempotencyKey }  ── serde → JSON         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The network call itself is out of scope: callers serialize the
//! request and submit it with whatever HTTP client and deadline policy
//! they run.

pub mod builder;
pub mod request;

pub use builder::RequestBuilder;
pub use request::{CreateOrderRequest, OrderWire};
