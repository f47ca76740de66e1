//! # Raw Input Records
//!
//! Loosely-typed draft records consumed from the surrounding application.
//!
//! ## Two Shapes Of Input
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A draft field set can describe:                                        │
//! │                                                                         │
//! │  1. A REFERENCE to a persisted entity                                  │
//! │     { id } or { id, pivot_id }  → reconciliation loads it              │
//! │                                                                         │
//! │  2. A NEW unsaved entity                                               │
//! │     { name, amount | percentage, ... } → reconciliation constructs it  │
//! │                                                                         │
//! │  Every Option here is deliberately loose: validation happens in the    │
//! │  reconciliation builders, which turn these into typed domain values    │
//! │  or fail with MissingAttribute / ConflictingAttributes.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Deserialize;

use crate::deductible::TaxMode;
use crate::fulfillment::FulfillmentState;
use crate::service_charge::{CalculationPhase, TreatmentType};

// =============================================================================
// Order & Line Drafts
// =============================================================================

/// Raw description of an order build pass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderDraft {
    pub reference_id: Option<String>,
    pub location_id: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineDraft>,
    #[serde(default)]
    pub discounts: Vec<DeductibleDraft>,
    #[serde(default)]
    pub taxes: Vec<DeductibleDraft>,
    #[serde(default)]
    pub service_charges: Vec<ServiceChargeDraft>,
    pub fulfillment: Option<FulfillmentDraft>,
}

/// Raw description of a product placed on the order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineDraft {
    /// Product reference, always required.
    pub product_id: String,
    /// Quantity, required and > 0.
    pub quantity: Option<i64>,
    /// Price override in minor units; required for variable-priced
    /// products, otherwise the product's own price wins.
    pub unit_price_cents: Option<i64>,
    pub note: Option<String>,
    #[serde(default)]
    pub discounts: Vec<DeductibleDraft>,
    #[serde(default)]
    pub taxes: Vec<DeductibleDraft>,
    #[serde(default)]
    pub service_charges: Vec<ServiceChargeDraft>,
    #[serde(default)]
    pub modifier_ids: Vec<String>,
}

impl LineDraft {
    /// Convenience constructor for the common (product, quantity) case.
    pub fn of(product_id: impl Into<String>, quantity: i64) -> Self {
        LineDraft {
            product_id: product_id.into(),
            quantity: Some(quantity),
            ..Default::default()
        }
    }
}

// =============================================================================
// Deductible Draft
// =============================================================================

/// Raw description of a discount or tax.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeductibleDraft {
    /// Identity of a persisted deductible, if referencing one.
    pub id: Option<String>,
    /// Identity of a persisted attachment join row. When present
    /// together with `id`, reconciliation loads the already-attached
    /// instance instead of duplicating it.
    pub pivot_id: Option<String>,
    pub name: Option<String>,
    /// Fixed amount in minor units (mutually exclusive with percentage).
    pub amount_cents: Option<i64>,
    /// Percentage in basis points (mutually exclusive with amount).
    pub percentage_bps: Option<u32>,
    /// Additive vs inclusive, for tax drafts. Defaults to additive.
    pub tax_mode: Option<TaxMode>,
}

impl DeductibleDraft {
    /// A reference to a persisted deductible.
    pub fn existing(id: impl Into<String>) -> Self {
        DeductibleDraft {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// A new fixed-amount deductible.
    pub fn fixed(name: impl Into<String>, amount_cents: i64) -> Self {
        DeductibleDraft {
            name: Some(name.into()),
            amount_cents: Some(amount_cents),
            ..Default::default()
        }
    }

    /// A new percentage deductible.
    pub fn percentage(name: impl Into<String>, bps: u32) -> Self {
        DeductibleDraft {
            name: Some(name.into()),
            percentage_bps: Some(bps),
            ..Default::default()
        }
    }

    /// Sets the tax mode (for tax drafts).
    pub fn with_tax_mode(mut self, mode: TaxMode) -> Self {
        self.tax_mode = Some(mode);
        self
    }
}

// =============================================================================
// Service Charge Draft
// =============================================================================

/// Raw description of a service charge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceChargeDraft {
    /// Identity of a persisted service charge, if referencing one.
    pub id: Option<String>,
    pub name: Option<String>,
    pub amount_cents: Option<i64>,
    pub percentage_bps: Option<u32>,
    /// Required for new charges.
    pub calculation_phase: Option<CalculationPhase>,
    /// Defaults to `Apportioned`.
    pub treatment_type: Option<TreatmentType>,
    /// Defaults to false.
    pub taxable: Option<bool>,
}

impl ServiceChargeDraft {
    /// A reference to a persisted service charge.
    pub fn existing(id: impl Into<String>) -> Self {
        ServiceChargeDraft {
            id: Some(id.into()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Fulfillment Drafts
// =============================================================================

/// Raw description of a fulfillment.
///
/// `kind` is a loose string ("pickup"/"shipment"/"delivery"); exactly one
/// of the detail payloads must be present and must match it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FulfillmentDraft {
    #[serde(rename = "type")]
    pub kind: String,
    pub state: Option<FulfillmentState>,
    pub pickup_details: Option<PickupDetailsDraft>,
    pub shipment_details: Option<ShipmentDetailsDraft>,
    pub delivery_details: Option<DeliveryDetailsDraft>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickupDetailsDraft {
    pub recipient: Option<RecipientDraft>,
    pub pickup_at: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentDetailsDraft {
    pub recipient: Option<RecipientDraft>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryDetailsDraft {
    pub recipient: Option<RecipientDraft>,
    pub deliver_at: Option<String>,
    pub courier_note: Option<String>,
}

/// Raw recipient: either a customer reference or individual contact
/// fields, never both absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientDraft {
    pub customer_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<AddressDraft>,
}

impl RecipientDraft {
    /// A reference to an existing customer identity.
    pub fn customer(id: impl Into<String>) -> Self {
        RecipientDraft {
            customer_id: Some(id.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressDraft {
    pub line_1: Option<String>,
    pub line_2: Option<String>,
    pub locality: Option<String>,
    pub administrative_district: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_draft_deserializes_with_defaults() {
        let draft: OrderDraft = serde_json::from_str(
            r#"{
                "lines": [
                    { "product_id": "p1", "quantity": 2 }
                ],
                "discounts": [
                    { "name": "Promo", "amount_cents": 500 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(draft.lines.len(), 1);
        assert_eq!(draft.lines[0].quantity, Some(2));
        assert!(draft.lines[0].discounts.is_empty());
        assert_eq!(draft.discounts[0].amount_cents, Some(500));
        assert!(draft.taxes.is_empty());
        assert!(draft.fulfillment.is_none());
    }

    #[test]
    fn test_fulfillment_draft_type_field() {
        let draft: FulfillmentDraft = serde_json::from_str(
            r#"{
                "type": "pickup",
                "pickup_details": { "pickup_at": "17:00" }
            }"#,
        )
        .unwrap();

        assert_eq!(draft.kind, "pickup");
        assert!(draft.pickup_details.is_some());
        assert!(draft.delivery_details.is_none());
    }
}
