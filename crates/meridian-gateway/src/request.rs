//! # Wire Request Shapes
//!
//! The exact JSON the payment processor accepts. Field names are
//! camelCase on the wire; enum-like fields are SCREAMING_SNAKE strings
//! because the receiving system treats them as opaque tokens, not as
//! anything this crate should round-trip.
//!
//! Empty arrays and absent options are omitted from the serialized
//! payload: the processor rejects explicit nulls on several of these
//! fields.

use serde::Serialize;

// =============================================================================
// Money & References
// =============================================================================

/// Money as the processor expects it: integer minor units plus the
/// currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoneyWire {
    pub amount: i64,
    pub currency: String,
}

/// An opaque correlation reference from a line item back to an
/// order-level discount/tax object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRef {
    pub uid: String,
}

// =============================================================================
// Line Items
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemWire {
    /// String-encoded integer, per the protocol.
    pub quantity: String,
    pub base_price_money: MoneyWire,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applied_discounts: Vec<AppliedRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applied_taxes: Vec<AppliedRef>,
}

// =============================================================================
// Deductibles & Service Charges
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountWire {
    pub uid: String,
    pub name: String,
    /// `ORDER` or `LINE_ITEM`.
    pub scope: String,
    /// `FIXED_AMOUNT` or `FIXED_PERCENTAGE`.
    #[serde(rename = "type")]
    pub discount_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_money: Option<MoneyWire>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxWire {
    pub uid: String,
    pub name: String,
    /// `ADDITIVE` or `INCLUSIVE`.
    #[serde(rename = "type")]
    pub tax_type: String,
    /// Taxes are always percentage-priced on the wire.
    pub percentage: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceChargeWire {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_money: Option<MoneyWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<String>,
    pub calculation_phase: String,
    pub treatment_type: String,
    pub taxable: bool,
}

// =============================================================================
// Fulfillments
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressWire {
    pub address_line_1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub locality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub administrative_district_level_1: Option<String>,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientWire {
    pub display_name: String,
    pub email_address: String,
    pub phone_number: String,
    pub address: AddressWire,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupDetailsWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<RecipientWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDetailsWire {
    pub recipient: RecipientWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetailsWire {
    pub recipient: RecipientWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliver_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentWire {
    /// `PICKUP`, `SHIPMENT` or `DELIVERY`.
    #[serde(rename = "type")]
    pub fulfillment_type: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_details: Option<PickupDetailsWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_details: Option<ShipmentDetailsWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_details: Option<DeliveryDetailsWire>,
}

// =============================================================================
// Top-Level Request
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    pub line_items: Vec<LineItemWire>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discounts: Vec<DiscountWire>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taxes: Vec<TaxWire>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service_charges: Vec<ServiceChargeWire>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fulfillments: Vec<FulfillmentWire>,
}

/// The submitted envelope. `idempotency_key` is a fresh random token per
/// request so retried submissions are not double-applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order: OrderWire,
    pub idempotency_key: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_serializes_camel_case_and_omits_empties() {
        let line = LineItemWire {
            quantity: "2".to_string(),
            base_price_money: MoneyWire {
                amount: 300,
                currency: "USD".to_string(),
            },
            name: "Espresso".to_string(),
            variation_name: None,
            note: None,
            applied_discounts: vec![AppliedRef {
                uid: "d-1".to_string(),
            }],
            applied_taxes: Vec::new(),
        };

        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["basePriceMoney"]["amount"], 300);
        assert_eq!(json["appliedDiscounts"][0]["uid"], "d-1");
        assert!(json.get("appliedTaxes").is_none());
        assert!(json.get("variationName").is_none());
    }

    #[test]
    fn test_discount_type_field_renames() {
        let discount = DiscountWire {
            uid: "u1".to_string(),
            name: "Promo".to_string(),
            scope: "ORDER".to_string(),
            discount_type: "FIXED_PERCENTAGE".to_string(),
            percentage: Some("10".to_string()),
            amount_money: None,
        };
        let json = serde_json::to_value(&discount).unwrap();
        assert_eq!(json["type"], "FIXED_PERCENTAGE");
        assert!(json.get("amountMoney").is_none());
    }
}
