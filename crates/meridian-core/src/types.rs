//! # Domain Types
//!
//! Core domain types for the order composition engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Order       │   │   OrderLine     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name           │   │  reference_id   │   │  (order,product)│       │
//! │  │  unit_price?    │   │  location_id    │   │  quantity > 0   │       │
//! │  │  catalog_ref    │   │  state          │   │  price snapshot │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Deductibles and service charges live in their own modules; they       │
//! │  attach to an Order or an OrderLine via `AttachmentTarget`.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has a UUID v4 `id` used for relations. OrderLine
//! additionally has a natural key: the (order, product) pair. Re-adding
//! the same product to the same order updates the existing line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::{CurrencyCode, Money};

// =============================================================================
// Product
// =============================================================================

/// A product that can be placed on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown on line items and receipts.
    pub name: String,

    /// Unit price in minor units. `None` means variable pricing: the
    /// price must be supplied on the line draft at composition time.
    pub unit_price: Option<Money>,

    /// Free-form note carried onto line items.
    pub note: Option<String>,

    /// Reference into the external catalog (the processor's variation id).
    pub catalog_ref: Option<String>,

    /// When the product was created.
    pub created_at: DateTime<Utc>,

    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new product with a generated id and current timestamps.
    pub fn new(name: impl Into<String>, unit_price: Option<Money>) -> Self {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            unit_price,
            note: None,
            catalog_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks whether the product requires a per-line price override.
    #[inline]
    pub fn is_variable_priced(&self) -> bool {
        self.unit_price.is_none()
    }
}

// =============================================================================
// Order
// =============================================================================

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Order is being assembled.
    #[default]
    Open,
    /// Order was submitted to the payment processor.
    Submitted,
    /// Order was completed (payment recorded).
    Completed,
    /// Order was cancelled.
    Canceled,
}

/// An order being assembled, priced, and submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Caller-supplied reference forwarded to the payment processor.
    pub reference_id: Option<String>,

    /// Processor location the order belongs to.
    pub location_id: Option<String>,

    /// Lifecycle state.
    pub state: OrderState,

    /// When the order was created.
    pub created_at: DateTime<Utc>,

    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new open order with a generated id.
    pub fn new() -> Self {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4().to_string(),
            reference_id: None,
            location_id: None,
            state: OrderState::Open,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the processor reference id.
    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}

impl Default for Order {
    fn default() -> Self {
        Order::new()
    }
}

// =============================================================================
// Order Line
// =============================================================================

/// A line on an order: the association between an Order and a Product.
///
/// ## Identity
/// The natural key is (order_id, product_id). Reconciliation finds an
/// existing line by that pair before constructing a new one, so re-adding
/// a product never duplicates the line.
///
/// ## Snapshot Pattern
/// `unit_price` is frozen at composition time. If the product price
/// changes later, already-composed lines keep the price they were built
/// with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning order.
    pub order_id: String,

    /// Product on this line.
    pub product_id: String,

    /// Quantity, always > 0 (enforced at reconciliation).
    pub quantity: i64,

    /// Unit price snapshot in minor units.
    pub unit_price: Money,

    /// Line-level note.
    pub note: Option<String>,

    /// Correlation UID linking this line to the external request.
    pub correlation_uid: String,
}

impl OrderLine {
    /// Creates a new line with generated id and correlation UID.
    pub fn new(order_id: &str, product_id: &str, quantity: i64, unit_price: Money) -> Self {
        OrderLine {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            product_id: product_id.to_string(),
            quantity,
            unit_price,
            note: None,
            correlation_uid: Uuid::new_v4().to_string(),
        }
    }
}

// =============================================================================
// Modifier
// =============================================================================

/// A priced add-on attached to an order line (e.g. "extra shot").
///
/// Its price joins the line gross at `quantity ×` multiplicity. Modifiers
/// are catalog entities reused across orders, like deductibles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modifier {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Price delta per unit, in minor units.
    pub price: Money,
}

impl Modifier {
    /// Creates a new modifier with a generated id.
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Modifier {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            price,
        }
    }
}

// =============================================================================
// Attachment Target
// =============================================================================

/// The parent a deductible or service charge is attached to.
///
/// ## Why A Tagged Variant?
/// The persisted join rows are polymorphic (one table serves both order-
/// and line-level attachments). In memory that polymorphism is a tagged
/// variant, never a type-string/id pair resolved by reflection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum AttachmentTarget {
    /// Attached at order level.
    Order(String),
    /// Attached at line level.
    Line(String),
}

impl AttachmentTarget {
    /// Returns the persisted discriminator string.
    pub fn kind_str(&self) -> &'static str {
        match self {
            AttachmentTarget::Order(_) => "order",
            AttachmentTarget::Line(_) => "line",
        }
    }

    /// Returns the target entity id.
    pub fn target_id(&self) -> &str {
        match self {
            AttachmentTarget::Order(id) | AttachmentTarget::Line(id) => id,
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Explicit configuration passed into the composition and pricing entry
/// points.
///
/// ## Why A Struct?
/// The legacy system resolved "which concrete type represents an Order"
/// and its limits through process-wide registries. Here every tunable is
/// a field handed to the entry point, so two configurations can coexist
/// in one process and tests never mutate globals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Currency every Money value on the order is denominated in.
    pub currency: CurrencyCode,

    /// Maximum quantity on a single line.
    pub max_line_quantity: i64,

    /// Maximum number of lines per order.
    pub max_order_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            currency: CurrencyCode::new("USD"),
            max_line_quantity: 999,
            max_order_lines: 100,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_variable_pricing() {
        let fixed = Product::new("Espresso", Some(Money::from_cents(300)));
        assert!(!fixed.is_variable_priced());

        let variable = Product::new("Market Fish", None);
        assert!(variable.is_variable_priced());
    }

    #[test]
    fn test_order_line_generates_correlation_uid() {
        let line = OrderLine::new("o1", "p1", 2, Money::from_cents(500));
        assert!(!line.correlation_uid.is_empty());

        let other = OrderLine::new("o1", "p1", 2, Money::from_cents(500));
        assert_ne!(line.correlation_uid, other.correlation_uid);
    }

    #[test]
    fn test_attachment_target_discriminator() {
        let order = AttachmentTarget::Order("o1".to_string());
        assert_eq!(order.kind_str(), "order");
        assert_eq!(order.target_id(), "o1");

        let line = AttachmentTarget::Line("l1".to_string());
        assert_eq!(line.kind_str(), "line");
        assert_eq!(line.target_id(), "l1");
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.currency.as_str(), "USD");
        assert_eq!(config.max_line_quantity, 999);
        assert_eq!(config.max_order_lines, 100);
    }
}
