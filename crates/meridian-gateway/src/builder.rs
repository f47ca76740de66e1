//! # External Order Request Builder
//!
//! Serializes a composed [`OrderCopy`] into the processor's wire shape.
//!
//! ## The UID Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The protocol splits every deductible in two:                           │
//! │                                                                         │
//! │    order.discounts: [{ uid: "a3f...", name, type, ... }]   definition  │
//! │    lineItems[0].appliedDiscounts: [{ uid: "a3f..." }]      reference   │
//! │                                                                         │
//! │  A line-scoped discount therefore appears in the ORDER-level array     │
//! │  with scope LINE_ITEM, and the line references it by uid. UIDs are     │
//! │  generated once per deductible INSTANCE and reused: the same discount  │
//! │  on two lines yields one definition and two references.                │
//! │                                                                         │
//! │  The ledger lives on the builder, and the builder is consumed by       │
//! │  build(): one instance per request, never shared across calls.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use meridian_core::compose::{LineCopy, OrderCopy};
use meridian_core::deductible::{AttachedDeductible, Deductible, DeductibleKind, Pricing, TaxMode};
use meridian_core::error::{CoreError, CoreResult};
use meridian_core::fulfillment::{
    Address, Fulfillment, FulfillmentDetails, FulfillmentState, Recipient,
};
use meridian_core::money::{CurrencyCode, Money};
use meridian_core::service_charge::{AttachedServiceCharge, CalculationPhase, TreatmentType};
use meridian_core::types::EngineConfig;

use crate::request::{
    AddressWire, AppliedRef, CreateOrderRequest, DeliveryDetailsWire, DiscountWire,
    FulfillmentWire, LineItemWire, MoneyWire, OrderWire, PickupDetailsWire, RecipientWire,
    ServiceChargeWire, ShipmentDetailsWire, TaxWire,
};

// =============================================================================
// Builder
// =============================================================================

/// One-shot builder for a single external order request.
///
/// `build` consumes the builder, so the per-call UID ledger can never
/// leak across requests. Concurrent submissions each construct their own.
#[derive(Debug)]
pub struct RequestBuilder {
    currency: CurrencyCode,
    discount_uids: HashMap<String, String>,
    tax_uids: HashMap<String, String>,
    discounts: Vec<DiscountWire>,
    taxes: Vec<TaxWire>,
}

impl RequestBuilder {
    /// Creates a fresh builder for one request.
    pub fn new(currency: CurrencyCode) -> Self {
        RequestBuilder {
            currency,
            discount_uids: HashMap::new(),
            tax_uids: HashMap::new(),
            discounts: Vec::new(),
            taxes: Vec::new(),
        }
    }

    /// Creates a builder denominated in the engine's configured currency.
    pub fn from_config(config: &EngineConfig) -> Self {
        RequestBuilder::new(config.currency.clone())
    }

    /// Builds the complete request envelope, idempotency key included.
    ///
    /// ## Errors
    /// - `MissingAttribute("quantity")` for a non-positive line quantity
    /// - `MissingAttribute("percentage")` for a tax without a percentage
    ///   (the protocol has no fixed-amount tax shape)
    /// - `MissingAttribute("recipient")` per the fulfillment rules
    pub fn build(mut self, copy: &OrderCopy) -> CoreResult<CreateOrderRequest> {
        let mut line_items = Vec::with_capacity(copy.lines.len());
        for line_copy in &copy.lines {
            line_items.push(self.build_line_item(line_copy)?);
        }

        // Order-level deductibles join the same ledger after the
        // line-scoped ones, reusing any uid already issued.
        for attached in &copy.discounts {
            self.ledger_discount(attached, "ORDER")?;
        }
        for attached in &copy.taxes {
            self.ledger_tax(attached, "ORDER")?;
        }

        let mut service_charges: Vec<ServiceChargeWire> = Vec::new();
        for line_copy in &copy.lines {
            for attached in &line_copy.service_charges {
                service_charges.push(self.build_service_charge(attached));
            }
        }
        for attached in &copy.service_charges {
            service_charges.push(self.build_service_charge(attached));
        }

        let fulfillments = match &copy.fulfillment {
            Some(fulfillment) => vec![build_fulfillment(fulfillment)],
            None => Vec::new(),
        };

        debug!(
            order_id = %copy.order.id,
            lines = line_items.len(),
            discounts = self.discounts.len(),
            taxes = self.taxes.len(),
            "built external order request"
        );

        Ok(CreateOrderRequest {
            order: OrderWire {
                reference_id: copy.order.reference_id.clone(),
                location_id: copy.order.location_id.clone(),
                line_items,
                discounts: self.discounts,
                taxes: self.taxes,
                service_charges,
                fulfillments,
            },
            idempotency_key: Uuid::new_v4().to_string(),
        })
    }

    fn build_line_item(&mut self, line_copy: &LineCopy) -> CoreResult<LineItemWire> {
        if line_copy.line.quantity <= 0 {
            return Err(CoreError::missing("quantity"));
        }

        let mut applied_discounts = Vec::with_capacity(line_copy.discounts.len());
        for attached in &line_copy.discounts {
            let uid = self.ledger_discount(attached, "LINE_ITEM")?;
            applied_discounts.push(AppliedRef { uid });
        }
        let mut applied_taxes = Vec::with_capacity(line_copy.taxes.len());
        for attached in &line_copy.taxes {
            let uid = self.ledger_tax(attached, "LINE_ITEM")?;
            applied_taxes.push(AppliedRef { uid });
        }

        Ok(LineItemWire {
            quantity: line_copy.line.quantity.to_string(),
            base_price_money: self.money_wire(line_copy.line.unit_price),
            name: line_copy.product.name.clone(),
            variation_name: line_copy.product.catalog_ref.clone(),
            note: line_copy.line.note.clone(),
            applied_discounts,
            applied_taxes,
        })
    }

    /// Returns the instance's uid, emitting the order-level definition on
    /// first sight.
    fn ledger_discount(
        &mut self,
        attached: &AttachedDeductible,
        scope: &str,
    ) -> CoreResult<String> {
        if let Some(uid) = self.discount_uids.get(&attached.deductible.id) {
            return Ok(uid.clone());
        }

        let uid = Uuid::new_v4().to_string();
        let (discount_type, percentage, amount_money) =
            self.split_pricing(&attached.deductible.pricing);
        self.discounts.push(DiscountWire {
            uid: uid.clone(),
            name: attached.deductible.name.clone(),
            scope: scope.to_string(),
            discount_type,
            percentage,
            amount_money,
        });
        self.discount_uids
            .insert(attached.deductible.id.clone(), uid.clone());
        Ok(uid)
    }

    fn ledger_tax(&mut self, attached: &AttachedDeductible, scope: &str) -> CoreResult<String> {
        if let Some(uid) = self.tax_uids.get(&attached.deductible.id) {
            return Ok(uid.clone());
        }

        let uid = Uuid::new_v4().to_string();
        self.taxes.push(TaxWire {
            uid: uid.clone(),
            name: attached.deductible.name.clone(),
            tax_type: tax_type_str(&attached.deductible)?.to_string(),
            percentage: attached
                .deductible
                .pricing
                .percentage()
                .ok_or_else(|| CoreError::missing("percentage"))?
                .to_percent_string(),
            scope: scope.to_string(),
        });
        self.tax_uids
            .insert(attached.deductible.id.clone(), uid.clone());
        Ok(uid)
    }

    fn build_service_charge(&self, attached: &AttachedServiceCharge) -> ServiceChargeWire {
        let (_, percentage, amount_money) = self.split_pricing(&attached.charge.pricing);
        ServiceChargeWire {
            name: attached.charge.name.clone(),
            amount_money,
            percentage,
            calculation_phase: phase_str(attached.charge.calculation_phase).to_string(),
            treatment_type: treatment_str(attached.charge.treatment_type).to_string(),
            taxable: attached.charge.taxable,
        }
    }

    fn split_pricing(&self, pricing: &Pricing) -> (String, Option<String>, Option<MoneyWire>) {
        match pricing {
            Pricing::Fixed(amount) => (
                "FIXED_AMOUNT".to_string(),
                None,
                Some(self.money_wire(*amount)),
            ),
            Pricing::Percentage(rate) => (
                "FIXED_PERCENTAGE".to_string(),
                Some(rate.to_percent_string()),
                None,
            ),
        }
    }

    fn money_wire(&self, amount: Money) -> MoneyWire {
        MoneyWire {
            amount: amount.cents(),
            currency: self.currency.as_str().to_string(),
        }
    }
}

// =============================================================================
// Token Mapping
// =============================================================================

fn tax_type_str(deductible: &Deductible) -> CoreResult<&'static str> {
    match deductible.kind {
        DeductibleKind::Tax { mode: TaxMode::Additive } => Ok("ADDITIVE"),
        DeductibleKind::Tax { mode: TaxMode::Inclusive } => Ok("INCLUSIVE"),
        DeductibleKind::Discount => Err(CoreError::invalid_order(format!(
            "discount {} emitted through the tax ledger",
            deductible.id
        ))),
    }
}

fn phase_str(phase: CalculationPhase) -> &'static str {
    match phase {
        CalculationPhase::Subtotal => "SUBTOTAL_PHASE",
        CalculationPhase::Total => "TOTAL_PHASE",
        CalculationPhase::ApportionedAmount => "APPORTIONED_AMOUNT_PHASE",
        CalculationPhase::ApportionedPercentage => "APPORTIONED_PERCENTAGE_PHASE",
    }
}

fn treatment_str(treatment: TreatmentType) -> &'static str {
    match treatment {
        TreatmentType::LineItem => "LINE_ITEM_TREATMENT",
        TreatmentType::Apportioned => "APPORTIONED_TREATMENT",
    }
}

fn state_str(state: FulfillmentState) -> &'static str {
    match state {
        FulfillmentState::Proposed => "PROPOSED",
        FulfillmentState::Reserved => "RESERVED",
        FulfillmentState::Prepared => "PREPARED",
        FulfillmentState::Completed => "COMPLETED",
        FulfillmentState::Canceled => "CANCELED",
    }
}

fn build_fulfillment(fulfillment: &Fulfillment) -> FulfillmentWire {
    let mut wire = FulfillmentWire {
        fulfillment_type: match &fulfillment.details {
            FulfillmentDetails::Pickup(_) => "PICKUP",
            FulfillmentDetails::Shipment(_) => "SHIPMENT",
            FulfillmentDetails::Delivery(_) => "DELIVERY",
        }
        .to_string(),
        state: state_str(fulfillment.state).to_string(),
        pickup_details: None,
        shipment_details: None,
        delivery_details: None,
    };

    match &fulfillment.details {
        FulfillmentDetails::Pickup(details) => {
            wire.pickup_details = Some(PickupDetailsWire {
                recipient: details.recipient.as_ref().map(recipient_wire),
                pickup_at: details.pickup_at.clone(),
                note: details.note.clone(),
            });
        }
        FulfillmentDetails::Shipment(details) => {
            wire.shipment_details = Some(ShipmentDetailsWire {
                recipient: recipient_wire(&details.recipient),
                carrier: details.carrier.clone(),
                tracking_number: details.tracking_number.clone(),
            });
        }
        FulfillmentDetails::Delivery(details) => {
            wire.delivery_details = Some(DeliveryDetailsWire {
                recipient: recipient_wire(&details.recipient),
                deliver_at: details.deliver_at.clone(),
                courier_note: details.courier_note.clone(),
            });
        }
    }

    wire
}

fn recipient_wire(recipient: &Recipient) -> RecipientWire {
    RecipientWire {
        display_name: recipient.display_name.clone(),
        email_address: recipient.email.clone(),
        phone_number: recipient.phone.clone(),
        address: address_wire(&recipient.address),
    }
}

fn address_wire(address: &Address) -> AddressWire {
    AddressWire {
        address_line_1: address.line_1.clone(),
        address_line_2: address.line_2.clone(),
        locality: address.locality.clone(),
        administrative_district_level_1: address.administrative_district.clone(),
        postal_code: address.postal_code.clone(),
        country: address.country.clone(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::deductible::Scope;
    use meridian_core::money::Percentage;
    use meridian_core::service_charge::ServiceCharge;
    use meridian_core::types::{Order, OrderLine, Product};

    fn currency() -> CurrencyCode {
        CurrencyCode::new("USD")
    }

    fn line_copy(quantity: i64, unit_cents: i64) -> LineCopy {
        let product = Product::new("Espresso", Some(Money::from_cents(unit_cents)));
        let line = OrderLine::new("o1", &product.id, quantity, Money::from_cents(unit_cents));
        LineCopy {
            product,
            line,
            discounts: Vec::new(),
            taxes: Vec::new(),
            service_charges: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    fn empty_copy() -> OrderCopy {
        OrderCopy {
            order: Order::new().with_reference("ref-42"),
            lines: Vec::new(),
            discounts: Vec::new(),
            taxes: Vec::new(),
            service_charges: Vec::new(),
            fulfillment: None,
        }
    }

    #[test]
    fn test_line_discount_shares_uid_with_order_level_definition() {
        let mut copy = empty_copy();
        let mut l = line_copy(2, 300);
        l.discounts.push(AttachedDeductible::new(
            Deductible::discount("Member", Pricing::Fixed(Money::from_cents(50))),
            Scope::Line,
        ));
        copy.lines.push(l);

        let request = RequestBuilder::new(currency()).build(&copy).unwrap();
        let order = request.order;

        assert_eq!(order.discounts.len(), 1);
        assert_eq!(order.discounts[0].scope, "LINE_ITEM");
        assert_eq!(order.discounts[0].discount_type, "FIXED_AMOUNT");
        // The line's applied reference carries the definition's uid
        assert_eq!(
            order.line_items[0].applied_discounts[0].uid,
            order.discounts[0].uid
        );
    }

    #[test]
    fn test_same_tax_on_two_lines_emits_one_definition() {
        let tax = Deductible::tax(
            "VAT",
            Pricing::Percentage(Percentage::from_bps(2100)),
            TaxMode::Additive,
        );

        let mut copy = empty_copy();
        for _ in 0..2 {
            let mut l = line_copy(1, 1000);
            l.taxes
                .push(AttachedDeductible::new(tax.clone(), Scope::Line));
            copy.lines.push(l);
        }

        let order = RequestBuilder::new(currency()).build(&copy).unwrap().order;
        assert_eq!(order.taxes.len(), 1);
        assert_eq!(order.taxes[0].percentage, "21");
        assert_eq!(
            order.line_items[0].applied_taxes[0].uid,
            order.line_items[1].applied_taxes[0].uid
        );
    }

    #[test]
    fn test_fixed_amount_tax_fails_at_wire_time() {
        let mut copy = empty_copy();
        copy.taxes.push(AttachedDeductible::new(
            Deductible::tax(
                "Flat levy",
                Pricing::Fixed(Money::from_cents(100)),
                TaxMode::Additive,
            ),
            Scope::Order,
        ));

        let err = RequestBuilder::new(currency()).build(&copy).unwrap_err();
        assert_eq!(err, CoreError::missing("percentage"));
    }

    #[test]
    fn test_non_positive_quantity_fails() {
        let mut copy = empty_copy();
        let mut l = line_copy(1, 300);
        l.line.quantity = 0;
        copy.lines.push(l);

        let err = RequestBuilder::new(currency()).build(&copy).unwrap_err();
        assert_eq!(err, CoreError::missing("quantity"));
    }

    #[test]
    fn test_service_charge_tokens() {
        let mut copy = empty_copy();
        copy.service_charges.push(
            AttachedServiceCharge::new(
                ServiceCharge::new(
                    "Gratuity",
                    Pricing::Percentage(Percentage::from_bps(1800)),
                    CalculationPhase::ApportionedPercentage,
                    TreatmentType::Apportioned,
                    true,
                )
                .unwrap(),
                Scope::Order,
            )
            .unwrap(),
        );

        let order = RequestBuilder::new(currency()).build(&copy).unwrap().order;
        let charge = &order.service_charges[0];
        assert_eq!(charge.calculation_phase, "APPORTIONED_PERCENTAGE_PHASE");
        assert_eq!(charge.treatment_type, "APPORTIONED_TREATMENT");
        assert_eq!(charge.percentage.as_deref(), Some("18"));
        assert!(charge.amount_money.is_none());
        assert!(charge.taxable);
    }

    #[test]
    fn test_idempotency_keys_are_fresh_per_build() {
        let copy = empty_copy();
        let first = RequestBuilder::new(currency()).build(&copy).unwrap();
        let second = RequestBuilder::new(currency()).build(&copy).unwrap();
        assert_ne!(first.idempotency_key, second.idempotency_key);
        assert!(!first.idempotency_key.is_empty());
    }

    #[test]
    fn test_builder_takes_currency_from_engine_config() {
        let mut config = EngineConfig::default();
        config.currency = CurrencyCode::new("eur");

        let mut copy = empty_copy();
        copy.lines.push(line_copy(1, 500));

        let order = RequestBuilder::from_config(&config).build(&copy).unwrap().order;
        assert_eq!(order.line_items[0].base_price_money.currency, "EUR");
    }

    #[test]
    fn test_quantity_and_price_encoding() {
        let mut copy = empty_copy();
        copy.lines.push(line_copy(5, 11_000));

        let order = RequestBuilder::new(currency()).build(&copy).unwrap().order;
        assert_eq!(order.line_items[0].quantity, "5");
        assert_eq!(order.line_items[0].base_price_money.amount, 11_000);
        assert_eq!(order.line_items[0].base_price_money.currency, "USD");
        assert_eq!(order.reference_id.as_deref(), Some("ref-42"));
    }
}
