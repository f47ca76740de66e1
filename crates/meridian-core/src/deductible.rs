//! # Deductible Model
//!
//! A deductible is a Discount or a Tax attachable to an Order or a Line.
//!
//! ## The XOR Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every deductible prices as EXACTLY ONE of:                             │
//! │                                                                         │
//! │    Fixed(Money)           e.g. 5.00 off                                │
//! │    Percentage(bps)        e.g. 8.25% of the base                        │
//! │                                                                         │
//! │  The legacy system checked "amount XOR percentage" with runtime         │
//! │  assertions scattered across builders. Here the invariant is a sum      │
//! │  type: `Pricing` is constructed once at the boundary and an             │
//! │  inconsistent in-memory state cannot exist.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Scope (order-level vs line-level) is a property of the *attachment*,
//! not of the deductible definition: the same discount row can be
//! attached at order scope on one order and at line scope on another.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Percentage};

// =============================================================================
// Pricing
// =============================================================================

/// How a deductible or service charge computes its amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pricing {
    /// A fixed amount in minor units.
    Fixed(Money),
    /// A percentage of the applicable base.
    Percentage(Percentage),
}

impl Pricing {
    /// Constructs pricing from the loosely-typed (amount, percentage)
    /// pair found in raw input records.
    ///
    /// ## Failure Modes
    /// - Neither present → `MissingAttribute` naming `field`
    /// - Both present → `ConflictingAttributes`
    ///
    /// This is the single boundary where the XOR invariant is enforced;
    /// past this point the sum type carries the proof.
    pub fn from_parts(
        amount_cents: Option<i64>,
        percentage_bps: Option<u32>,
        field: &str,
    ) -> CoreResult<Self> {
        match (amount_cents, percentage_bps) {
            (Some(_), Some(_)) => Err(CoreError::conflicting("amount", "percentage")),
            (Some(cents), None) => Ok(Pricing::Fixed(Money::from_cents(cents))),
            (None, Some(bps)) => Ok(Pricing::Percentage(Percentage::from_bps(bps))),
            (None, None) => Err(CoreError::missing(field)),
        }
    }

    /// Returns the fixed amount, if this pricing is fixed.
    pub fn fixed_amount(&self) -> Option<Money> {
        match self {
            Pricing::Fixed(amount) => Some(*amount),
            Pricing::Percentage(_) => None,
        }
    }

    /// Returns the percentage, if this pricing is percentage-based.
    pub fn percentage(&self) -> Option<Percentage> {
        match self {
            Pricing::Fixed(_) => None,
            Pricing::Percentage(rate) => Some(*rate),
        }
    }

    /// Computes the deduction/charge amount against a base.
    ///
    /// Fixed pricing ignores the base; percentage pricing applies
    /// banker's rounding once via `Money::percent_of`.
    pub fn amount_against(&self, base: Money) -> Money {
        match self {
            Pricing::Fixed(amount) => *amount,
            Pricing::Percentage(rate) => base.percent_of(*rate),
        }
    }
}

// =============================================================================
// Kinds & Scope
// =============================================================================

/// Whether an attached tax is added on top of the price or already
/// embedded in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    /// Added to the total at pricing time.
    #[default]
    Additive,
    /// Embedded in the listed price; contributes no additional amount.
    Inclusive,
}

/// Discriminates the two deductible flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DeductibleKind {
    /// Reduces the total.
    Discount,
    /// Increases (additive) or annotates (inclusive) the total.
    Tax { mode: TaxMode },
}

impl DeductibleKind {
    /// Checks whether this is the tax flavor.
    pub fn is_tax(&self) -> bool {
        matches!(self, DeductibleKind::Tax { .. })
    }
}

/// Where a deductible or service charge applies.
///
/// Set when attached, not intrinsic to the definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Applies once against the whole order.
    Order,
    /// Applies against a single line.
    Line,
}

// =============================================================================
// Deductible
// =============================================================================

/// A Discount or Tax definition, created once and reused across orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deductible {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name forwarded to the payment processor.
    pub name: String,

    /// Fixed amount or percentage (exactly one, by construction).
    pub pricing: Pricing,

    /// Discount or Tax (with additive/inclusive mode).
    pub kind: DeductibleKind,
}

impl Deductible {
    /// Creates a new discount definition.
    pub fn discount(name: impl Into<String>, pricing: Pricing) -> Self {
        Deductible {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            pricing,
            kind: DeductibleKind::Discount,
        }
    }

    /// Creates a new tax definition.
    pub fn tax(name: impl Into<String>, pricing: Pricing, mode: TaxMode) -> Self {
        Deductible {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            pricing,
            kind: DeductibleKind::Tax { mode },
        }
    }
}

// =============================================================================
// Attachment
// =============================================================================

/// A deductible attached to a parent at a scope.
///
/// `pivot_id` is the identity of the persisted join row, present only
/// when the attachment was loaded from storage. Reconciliation uses it to
/// fetch the already-attached instance instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedDeductible {
    /// The deductible definition.
    pub deductible: Deductible,

    /// Order-level or line-level.
    pub scope: Scope,

    /// Persisted join-row id, if any.
    pub pivot_id: Option<String>,
}

impl AttachedDeductible {
    /// Wraps a deductible with a scope (unsaved attachment).
    pub fn new(deductible: Deductible, scope: Scope) -> Self {
        AttachedDeductible {
            deductible,
            scope,
            pivot_id: None,
        }
    }
}

/// Pushes an attachment onto a parent's list, deduplicating by
/// deductible identity.
///
/// ## Invariant
/// Attaching the same deductible identity to the same parent twice never
/// changes the parent's attachment count. Only the *attachment* is
/// deduplicated - a new unsaved deductible entity built from a raw
/// record always has a fresh id and therefore always attaches.
pub fn attach_deductible(list: &mut Vec<AttachedDeductible>, attachment: AttachedDeductible) {
    let already = list
        .iter()
        .any(|existing| existing.deductible.id == attachment.deductible.id);
    if !already {
        list.push(attachment);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_from_parts_xor() {
        // Exactly one of amount/percentage must be set
        assert!(matches!(
            Pricing::from_parts(Some(500), None, "discount"),
            Ok(Pricing::Fixed(_))
        ));
        assert!(matches!(
            Pricing::from_parts(None, Some(1000), "discount"),
            Ok(Pricing::Percentage(_))
        ));

        assert_eq!(
            Pricing::from_parts(None, None, "discount"),
            Err(CoreError::missing("discount"))
        );
        assert_eq!(
            Pricing::from_parts(Some(500), Some(1000), "discount"),
            Err(CoreError::conflicting("amount", "percentage"))
        );
    }

    #[test]
    fn test_pricing_amount_against() {
        let fixed = Pricing::Fixed(Money::from_cents(500));
        assert_eq!(fixed.amount_against(Money::from_cents(99_999)).cents(), 500);

        let pct = Pricing::Percentage(Percentage::from_bps(1000));
        assert_eq!(pct.amount_against(Money::from_cents(55_000)).cents(), 5_500);
    }

    #[test]
    fn test_attach_is_idempotent_per_identity() {
        let discount = Deductible::discount("Member", Pricing::Fixed(Money::from_cents(500)));
        let mut list = Vec::new();

        attach_deductible(&mut list, AttachedDeductible::new(discount.clone(), Scope::Order));
        attach_deductible(&mut list, AttachedDeductible::new(discount, Scope::Order));

        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_attach_distinct_identities_both_land() {
        // Two raw-record deductibles with identical fields still attach
        // twice: dedup is by identity, never by field equality.
        let a = Deductible::discount("Coupon", Pricing::Fixed(Money::from_cents(100)));
        let b = Deductible::discount("Coupon", Pricing::Fixed(Money::from_cents(100)));
        assert_ne!(a.id, b.id);

        let mut list = Vec::new();
        attach_deductible(&mut list, AttachedDeductible::new(a, Scope::Line));
        attach_deductible(&mut list, AttachedDeductible::new(b, Scope::Line));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_tax_kind() {
        let tax = Deductible::tax(
            "VAT",
            Pricing::Percentage(Percentage::from_bps(2100)),
            TaxMode::Inclusive,
        );
        assert!(tax.kind.is_tax());
        assert_eq!(tax.kind, DeductibleKind::Tax { mode: TaxMode::Inclusive });

        let discount = Deductible::discount("Promo", Pricing::Fixed(Money::from_cents(50)));
        assert!(!discount.kind.is_tax());
    }
}
