//! # Order Composition
//!
//! Reconciliation builders: raw draft records + the persisted graph in,
//! a fully-typed in-memory order copy out.
//!
//! ## The Reconciliation Idea
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every draft record is reconciled against the store before it joins    │
//! │  the copy:                                                              │
//! │                                                                         │
//! │   { id, pivot_id }  →  load the already-attached instance              │
//! │   { id }            →  load the definition, wrap in a new attachment   │
//! │   { name, ... }     →  construct a fresh, unsaved entity               │
//! │                                                                         │
//! │  Lines reconcile by natural key: a draft line whose product already    │
//! │  sits on the order UPDATES that line instead of duplicating it.        │
//! │  Attachments deduplicate by entity identity, so composing the same     │
//! │  draft twice yields the same copy.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Composition never writes: the store is read-only here, and the copy is
//! handed to the pricing engine and the request builder as-is.

use crate::deductible::{
    attach_deductible, AttachedDeductible, Deductible, DeductibleKind, Pricing, Scope,
};
use crate::error::{CoreError, CoreResult};
use crate::fulfillment::{
    Address, DeliveryDetails, Fulfillment, FulfillmentDetails, FulfillmentKind, PickupDetails,
    Recipient, ShipmentDetails,
};
use crate::input::{
    AddressDraft, DeductibleDraft, FulfillmentDraft, LineDraft, OrderDraft, RecipientDraft,
    ServiceChargeDraft,
};
use crate::money::Money;
use crate::service_charge::{
    attach_service_charge, AttachedServiceCharge, ServiceCharge, TreatmentType,
};
use crate::store::CompositionStore;
use crate::types::{AttachmentTarget, EngineConfig, Modifier, Order, OrderLine, Product};

// =============================================================================
// Composed Copies
// =============================================================================

/// One composed line: the persisted/constructed line plus everything
/// attached to it.
#[derive(Debug, Clone)]
pub struct LineCopy {
    pub product: Product,
    pub line: OrderLine,
    pub discounts: Vec<AttachedDeductible>,
    pub taxes: Vec<AttachedDeductible>,
    pub service_charges: Vec<AttachedServiceCharge>,
    pub modifiers: Vec<Modifier>,
}

impl LineCopy {
    /// Line gross: quantity × unit price, plus each modifier at the same
    /// quantity multiplicity.
    pub fn gross(&self) -> Money {
        let base = self.line.unit_price.multiply_quantity(self.line.quantity);
        self.modifiers.iter().fold(base, |acc, modifier| {
            acc + modifier.price.multiply_quantity(self.line.quantity)
        })
    }
}

/// The fully-composed order: input to the pricing engine and the wire
/// request builder.
#[derive(Debug, Clone)]
pub struct OrderCopy {
    pub order: Order,
    pub lines: Vec<LineCopy>,
    pub discounts: Vec<AttachedDeductible>,
    pub taxes: Vec<AttachedDeductible>,
    pub service_charges: Vec<AttachedServiceCharge>,
    pub fulfillment: Option<Fulfillment>,
}

// =============================================================================
// Deductible Reconciliation
// =============================================================================

/// Which draft channel a deductible record arrived through.
///
/// A record in the `taxes` channel must reconcile to a tax, and vice
/// versa; a cross-channel reference is a caller bug surfaced as
/// `InvalidOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductibleChannel {
    Discount,
    Tax,
}

/// Reconciles one deductible draft into an attached instance at `scope`.
pub fn reconcile_deductible(
    draft: &DeductibleDraft,
    channel: DeductibleChannel,
    scope: Scope,
    store: &dyn CompositionStore,
) -> CoreResult<AttachedDeductible> {
    // { id, pivot_id }: the join row already exists, load it wholesale
    if let (Some(id), Some(pivot_id)) = (&draft.id, &draft.pivot_id) {
        let mut attached = store.deductible_attachment(pivot_id).ok_or_else(|| {
            CoreError::invalid_order(format!("unknown deductible attachment: {pivot_id}"))
        })?;
        if &attached.deductible.id != id {
            return Err(CoreError::invalid_order(format!(
                "attachment {pivot_id} does not belong to deductible {id}"
            )));
        }
        check_channel(&attached.deductible, channel)?;
        attached.scope = scope;
        return Ok(attached);
    }

    // { id }: a persisted definition, newly attached here
    if let Some(id) = &draft.id {
        let deductible = store
            .deductible(id)
            .ok_or_else(|| CoreError::invalid_order(format!("unknown deductible: {id}")))?;
        check_channel(&deductible, channel)?;
        return Ok(AttachedDeductible::new(deductible, scope));
    }

    // Raw record: construct a fresh, unsaved entity
    let field = match channel {
        DeductibleChannel::Discount => "discount",
        DeductibleChannel::Tax => "tax",
    };
    let pricing = Pricing::from_parts(draft.amount_cents, draft.percentage_bps, field)?;
    let name = draft
        .name
        .clone()
        .ok_or_else(|| CoreError::missing("name"))?;
    let deductible = match channel {
        DeductibleChannel::Discount => Deductible::discount(name, pricing),
        DeductibleChannel::Tax => {
            Deductible::tax(name, pricing, draft.tax_mode.unwrap_or_default())
        }
    };
    Ok(AttachedDeductible::new(deductible, scope))
}

fn check_channel(deductible: &Deductible, channel: DeductibleChannel) -> CoreResult<()> {
    let is_tax = deductible.kind.is_tax();
    let expected_tax = channel == DeductibleChannel::Tax;
    if is_tax != expected_tax {
        return Err(CoreError::invalid_order(format!(
            "deductible {} is a {}, referenced as a {}",
            deductible.id,
            if is_tax { "tax" } else { "discount" },
            if expected_tax { "tax" } else { "discount" },
        )));
    }
    Ok(())
}

// =============================================================================
// Service Charge Reconciliation
// =============================================================================

/// Reconciles one service charge draft into a definition (attachment and
/// scope checking happen at the call site).
pub fn reconcile_service_charge(
    draft: &ServiceChargeDraft,
    store: &dyn CompositionStore,
) -> CoreResult<ServiceCharge> {
    if let Some(id) = &draft.id {
        return store
            .service_charge(id)
            .ok_or_else(|| CoreError::invalid_order(format!("unknown service charge: {id}")));
    }

    let pricing = Pricing::from_parts(draft.amount_cents, draft.percentage_bps, "service_charge")?;
    let name = draft
        .name
        .clone()
        .ok_or_else(|| CoreError::missing("name"))?;
    let phase = draft
        .calculation_phase
        .ok_or_else(|| CoreError::missing("calculation_phase"))?;
    let treatment = draft.treatment_type.unwrap_or(TreatmentType::Apportioned);
    let taxable = draft.taxable.unwrap_or(false);

    ServiceCharge::new(name, pricing, phase, treatment, taxable)
}

// =============================================================================
// Line Reconciliation
// =============================================================================

/// Builds a brand-new line from a draft (the natural-key lookup already
/// found no existing line for this product).
pub fn reconcile_line(
    order: &Order,
    draft: &LineDraft,
    store: &dyn CompositionStore,
    config: &EngineConfig,
) -> CoreResult<LineCopy> {
    let product = store
        .product(&draft.product_id)
        .ok_or_else(|| CoreError::invalid_order(format!("unknown product: {}", draft.product_id)))?;

    let quantity = checked_quantity(draft.quantity, config)?;

    // Draft override wins; variable-priced products have nothing to fall
    // back on and must carry one.
    let unit_price = match (draft.unit_price_cents, product.unit_price) {
        (Some(cents), _) => Money::from_cents(cents),
        (None, Some(price)) => price,
        (None, None) => return Err(CoreError::missing("unit_price")),
    };

    let mut line = OrderLine::new(&order.id, &product.id, quantity, unit_price);
    line.note = draft.note.clone().or_else(|| product.note.clone());

    let modifiers = resolve_modifiers(&draft.modifier_ids, store)?;

    Ok(LineCopy {
        product,
        line,
        discounts: Vec::new(),
        taxes: Vec::new(),
        service_charges: Vec::new(),
        modifiers,
    })
}

fn checked_quantity(quantity: Option<i64>, config: &EngineConfig) -> CoreResult<i64> {
    // Absent and non-positive both read as "no usable quantity"
    let quantity = quantity.filter(|q| *q > 0);
    let quantity = quantity.ok_or_else(|| CoreError::missing("quantity"))?;
    if quantity > config.max_line_quantity {
        return Err(CoreError::invalid_order(format!(
            "line quantity {quantity} exceeds the maximum of {}",
            config.max_line_quantity
        )));
    }
    Ok(quantity)
}

fn resolve_modifiers(
    modifier_ids: &[String],
    store: &dyn CompositionStore,
) -> CoreResult<Vec<Modifier>> {
    let mut modifiers = Vec::with_capacity(modifier_ids.len());
    for id in modifier_ids {
        let modifier = store
            .modifier(id)
            .ok_or_else(|| CoreError::invalid_order(format!("unknown modifier: {id}")))?;
        if !modifiers.iter().any(|m: &Modifier| m.id == modifier.id) {
            modifiers.push(modifier);
        }
    }
    Ok(modifiers)
}

// =============================================================================
// Order Composition
// =============================================================================

/// Composes the full order copy: seed from the persisted graph, then fold
/// the draft in.
pub fn compose(
    order: &Order,
    draft: &OrderDraft,
    store: &dyn CompositionStore,
    config: &EngineConfig,
) -> CoreResult<OrderCopy> {
    let mut copy = seed_from_store(order, store)?;

    if let Some(reference_id) = &draft.reference_id {
        copy.order.reference_id = Some(reference_id.clone());
    }
    if let Some(location_id) = &draft.location_id {
        copy.order.location_id = Some(location_id.clone());
    }

    // --- lines ---
    for line_draft in &draft.lines {
        fold_line(&mut copy, line_draft, store, config)?;
    }
    if copy.lines.len() > config.max_order_lines {
        return Err(CoreError::invalid_order(format!(
            "order has {} lines, exceeding the maximum of {}",
            copy.lines.len(),
            config.max_order_lines
        )));
    }

    // --- order-level deductibles ---
    for deductible_draft in &draft.discounts {
        let attached = reconcile_deductible(
            deductible_draft,
            DeductibleChannel::Discount,
            Scope::Order,
            store,
        )?;
        attach_deductible(&mut copy.discounts, attached);
    }
    for deductible_draft in &draft.taxes {
        let attached =
            reconcile_deductible(deductible_draft, DeductibleChannel::Tax, Scope::Order, store)?;
        attach_deductible(&mut copy.taxes, attached);
    }

    // --- order-level service charges ---
    for charge_draft in &draft.service_charges {
        let charge = reconcile_service_charge(charge_draft, store)?;
        let attached = AttachedServiceCharge::new(charge, Scope::Order)?;
        attach_service_charge(&mut copy.service_charges, attached);
    }

    // --- fulfillment ---
    if let Some(fulfillment_draft) = &draft.fulfillment {
        if copy.fulfillment.is_some() {
            return Err(CoreError::invalid_order(
                "order already has a fulfillment; only one is supported",
            ));
        }
        copy.fulfillment = Some(reconcile_fulfillment(fulfillment_draft, store)?);
    }

    Ok(copy)
}

/// Hydrates the copy from what is already persisted for this order.
fn seed_from_store(order: &Order, store: &dyn CompositionStore) -> CoreResult<OrderCopy> {
    let mut lines = Vec::new();
    for line in store.order_lines(&order.id) {
        let product = store.product(&line.product_id).ok_or_else(|| {
            CoreError::invalid_order(format!(
                "line {} references unknown product {}",
                line.id, line.product_id
            ))
        })?;

        let target = AttachmentTarget::Line(line.id.clone());
        let (discounts, taxes) = partition_deductibles(store.attachments_for(&target));
        let service_charges = store.charges_for(&target);
        let modifiers = store.modifiers_for_line(&line.id);

        lines.push(LineCopy {
            product,
            line,
            discounts,
            taxes,
            service_charges,
            modifiers,
        });
    }

    let order_target = AttachmentTarget::Order(order.id.clone());
    let (discounts, taxes) = partition_deductibles(store.attachments_for(&order_target));
    let service_charges = store.charges_for(&order_target);
    let fulfillment = store.order_fulfillment(&order.id);

    Ok(OrderCopy {
        order: order.clone(),
        lines,
        discounts,
        taxes,
        service_charges,
        fulfillment,
    })
}

fn partition_deductibles(
    attached: Vec<AttachedDeductible>,
) -> (Vec<AttachedDeductible>, Vec<AttachedDeductible>) {
    attached
        .into_iter()
        .partition(|attachment| !attachment.deductible.kind.is_tax())
}

/// Folds one draft line into the copy: update by natural key, or build
/// and append. Line-scoped attachments reconcile either way.
fn fold_line(
    copy: &mut OrderCopy,
    draft: &LineDraft,
    store: &dyn CompositionStore,
    config: &EngineConfig,
) -> CoreResult<()> {
    let index = copy
        .lines
        .iter()
        .position(|line_copy| line_copy.line.product_id == draft.product_id);

    let index = match index {
        Some(index) => {
            let line_copy = &mut copy.lines[index];
            if draft.quantity.is_some() {
                line_copy.line.quantity = checked_quantity(draft.quantity, config)?;
            }
            if let Some(cents) = draft.unit_price_cents {
                line_copy.line.unit_price = Money::from_cents(cents);
            }
            if let Some(note) = &draft.note {
                line_copy.line.note = Some(note.clone());
            }
            for modifier in resolve_modifiers(&draft.modifier_ids, store)? {
                if !line_copy.modifiers.iter().any(|m| m.id == modifier.id) {
                    line_copy.modifiers.push(modifier);
                }
            }
            index
        }
        None => {
            copy.lines.push(reconcile_line(&copy.order, draft, store, config)?);
            copy.lines.len() - 1
        }
    };

    let line_copy = &mut copy.lines[index];
    for deductible_draft in &draft.discounts {
        let attached = reconcile_deductible(
            deductible_draft,
            DeductibleChannel::Discount,
            Scope::Line,
            store,
        )?;
        attach_deductible(&mut line_copy.discounts, attached);
    }
    for deductible_draft in &draft.taxes {
        let attached =
            reconcile_deductible(deductible_draft, DeductibleChannel::Tax, Scope::Line, store)?;
        attach_deductible(&mut line_copy.taxes, attached);
    }
    for charge_draft in &draft.service_charges {
        let charge = reconcile_service_charge(charge_draft, store)?;
        // Scope legality bites here: a Subtotal/Total charge at line
        // scope fails with InvalidScope.
        let attached = AttachedServiceCharge::new(charge, Scope::Line)?;
        attach_service_charge(&mut line_copy.service_charges, attached);
    }

    Ok(())
}

// =============================================================================
// Fulfillment Reconciliation
// =============================================================================

fn reconcile_fulfillment(
    draft: &FulfillmentDraft,
    store: &dyn CompositionStore,
) -> CoreResult<Fulfillment> {
    let kind = FulfillmentKind::parse(&draft.kind)?;

    // Exactly one payload, and it must belong to the declared kind.
    let payloads_present = [
        draft.pickup_details.is_some(),
        draft.shipment_details.is_some(),
        draft.delivery_details.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    if payloads_present != 1 {
        return Err(CoreError::invalid_order(format!(
            "fulfillment requires exactly one details payload, got {payloads_present}"
        )));
    }

    let details = match kind {
        FulfillmentKind::Pickup => {
            let payload = draft.pickup_details.as_ref().ok_or_else(|| {
                CoreError::invalid_order("pickup fulfillment without pickup_details")
            })?;
            // Pickup recipient is optional: the customer shows up
            let recipient = match &payload.recipient {
                Some(recipient_draft) => Some(resolve_recipient(recipient_draft, store)?),
                None => None,
            };
            FulfillmentDetails::Pickup(PickupDetails {
                recipient,
                pickup_at: payload.pickup_at.clone(),
                note: payload.note.clone(),
            })
        }
        FulfillmentKind::Shipment => {
            let payload = draft.shipment_details.as_ref().ok_or_else(|| {
                CoreError::invalid_order("shipment fulfillment without shipment_details")
            })?;
            let recipient_draft = payload
                .recipient
                .as_ref()
                .ok_or_else(|| CoreError::missing("recipient"))?;
            FulfillmentDetails::Shipment(ShipmentDetails {
                recipient: resolve_recipient(recipient_draft, store)?,
                carrier: payload.carrier.clone(),
                tracking_number: payload.tracking_number.clone(),
            })
        }
        FulfillmentKind::Delivery => {
            let payload = draft.delivery_details.as_ref().ok_or_else(|| {
                CoreError::invalid_order("delivery fulfillment without delivery_details")
            })?;
            let recipient_draft = payload
                .recipient
                .as_ref()
                .ok_or_else(|| CoreError::missing("recipient"))?;
            FulfillmentDetails::Delivery(DeliveryDetails {
                recipient: resolve_recipient(recipient_draft, store)?,
                deliver_at: payload.deliver_at.clone(),
                courier_note: payload.courier_note.clone(),
            })
        }
    };

    Fulfillment::new(kind, draft.state.unwrap_or_default(), details)
}

/// Resolves a recipient draft: customer reference, or a complete contact
/// field set. Partial contact data fails naming the first absent field.
fn resolve_recipient(
    draft: &RecipientDraft,
    store: &dyn CompositionStore,
) -> CoreResult<Recipient> {
    if let Some(customer_id) = &draft.customer_id {
        return store
            .customer_recipient(customer_id)
            .ok_or_else(|| CoreError::invalid_order(format!("unknown customer: {customer_id}")));
    }

    let display_name = draft
        .display_name
        .clone()
        .ok_or_else(|| CoreError::missing("recipient.display_name"))?;
    let email = draft
        .email
        .clone()
        .ok_or_else(|| CoreError::missing("recipient.email"))?;
    let phone = draft
        .phone
        .clone()
        .ok_or_else(|| CoreError::missing("recipient.phone"))?;
    let address_draft = draft
        .address
        .as_ref()
        .ok_or_else(|| CoreError::missing("recipient.address"))?;

    Ok(Recipient {
        display_name,
        email,
        phone,
        address: resolve_address(address_draft)?,
    })
}

fn resolve_address(draft: &AddressDraft) -> CoreResult<Address> {
    Ok(Address {
        line_1: draft
            .line_1
            .clone()
            .ok_or_else(|| CoreError::missing("recipient.address.line_1"))?,
        line_2: draft.line_2.clone(),
        locality: draft
            .locality
            .clone()
            .ok_or_else(|| CoreError::missing("recipient.address.locality"))?,
        administrative_district: draft.administrative_district.clone(),
        postal_code: draft
            .postal_code
            .clone()
            .ok_or_else(|| CoreError::missing("recipient.address.postal_code"))?,
        country: draft
            .country
            .clone()
            .ok_or_else(|| CoreError::missing("recipient.address.country"))?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{PickupDetailsDraft, ShipmentDetailsDraft};
    use crate::money::Percentage;
    use crate::service_charge::CalculationPhase;
    use crate::store::InMemoryStore;

    fn store_with_products() -> (InMemoryStore, Product, Product) {
        let mut store = InMemoryStore::new();
        let espresso = Product::new("Espresso", Some(Money::from_cents(300)));
        let market_fish = Product::new("Market Fish", None);
        store.insert_product(espresso.clone());
        store.insert_product(market_fish.clone());
        (store, espresso, market_fish)
    }

    #[test]
    fn test_new_line_from_draft() {
        let (store, espresso, _) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        let draft = OrderDraft {
            lines: vec![LineDraft::of(&espresso.id, 2)],
            ..Default::default()
        };

        let copy = compose(&order, &draft, &store, &config).unwrap();
        assert_eq!(copy.lines.len(), 1);
        assert_eq!(copy.lines[0].line.quantity, 2);
        assert_eq!(copy.lines[0].line.unit_price.cents(), 300);
        assert_eq!(copy.lines[0].gross().cents(), 600);
    }

    #[test]
    fn test_line_reconciles_by_natural_key() {
        let (mut store, espresso, _) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        // Persisted line with quantity 1
        store.insert_line(OrderLine::new(&order.id, &espresso.id, 1, Money::from_cents(300)));

        // Re-adding the same product updates the line, never duplicates it
        let draft = OrderDraft {
            lines: vec![LineDraft::of(&espresso.id, 5)],
            ..Default::default()
        };
        let copy = compose(&order, &draft, &store, &config).unwrap();
        assert_eq!(copy.lines.len(), 1);
        assert_eq!(copy.lines[0].line.quantity, 5);
    }

    #[test]
    fn test_variable_priced_product_requires_override() {
        let (store, _, market_fish) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        let draft = OrderDraft {
            lines: vec![LineDraft::of(&market_fish.id, 1)],
            ..Default::default()
        };
        let err = compose(&order, &draft, &store, &config).unwrap_err();
        assert_eq!(err, CoreError::missing("unit_price"));

        let mut with_price = LineDraft::of(&market_fish.id, 1);
        with_price.unit_price_cents = Some(1850);
        let draft = OrderDraft {
            lines: vec![with_price],
            ..Default::default()
        };
        let copy = compose(&order, &draft, &store, &config).unwrap();
        assert_eq!(copy.lines[0].line.unit_price.cents(), 1850);
    }

    #[test]
    fn test_unknown_product_rejected() {
        let (store, _, _) = store_with_products();
        let order = Order::new();
        let draft = OrderDraft {
            lines: vec![LineDraft::of("nope", 1)],
            ..Default::default()
        };
        let err = compose(&order, &draft, &store, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOrder { .. }));
    }

    #[test]
    fn test_quantity_validation() {
        let (store, espresso, _) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        let mut missing = LineDraft::of(&espresso.id, 1);
        missing.quantity = None;
        let err = compose(
            &order,
            &OrderDraft { lines: vec![missing], ..Default::default() },
            &store,
            &config,
        )
        .unwrap_err();
        assert_eq!(err, CoreError::missing("quantity"));

        // Zero and negative quantities fail the same way as an absent one
        let err = compose(
            &order,
            &OrderDraft { lines: vec![LineDraft::of(&espresso.id, 0)], ..Default::default() },
            &store,
            &config,
        )
        .unwrap_err();
        assert_eq!(err, CoreError::missing("quantity"));

        let err = compose(
            &order,
            &OrderDraft { lines: vec![LineDraft::of(&espresso.id, -3)], ..Default::default() },
            &store,
            &config,
        )
        .unwrap_err();
        assert_eq!(err, CoreError::missing("quantity"));

        let err = compose(
            &order,
            &OrderDraft { lines: vec![LineDraft::of(&espresso.id, 1000)], ..Default::default() },
            &store,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOrder { .. }));
    }

    #[test]
    fn test_compose_is_idempotent() {
        let (mut store, espresso, _) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        let discount =
            Deductible::discount("Member", Pricing::Percentage(Percentage::from_bps(1000)));
        let discount_id = discount.id.clone();
        store.insert_deductible(discount);

        let draft = OrderDraft {
            lines: vec![LineDraft::of(&espresso.id, 2)],
            discounts: vec![DeductibleDraft::existing(&discount_id)],
            ..Default::default()
        };

        let copy = compose(&order, &draft, &store, &config).unwrap();
        assert_eq!(copy.discounts.len(), 1);

        // Simulate persistence, then compose the same draft again: the
        // attachment deduplicates by identity.
        store.insert_line(copy.lines[0].line.clone());
        store.attach_deductible(
            AttachmentTarget::Order(order.id.clone()),
            &discount_id,
            Scope::Order,
        );

        let again = compose(&order, &draft, &store, &config).unwrap();
        assert_eq!(again.lines.len(), 1);
        assert_eq!(again.discounts.len(), 1);
    }

    #[test]
    fn test_pivot_reference_loads_attached_instance() {
        let (mut store, _, _) = store_with_products();
        let order = Order::new();

        let discount = Deductible::discount("Member", Pricing::Fixed(Money::from_cents(500)));
        let discount_id = discount.id.clone();
        store.insert_deductible(discount);
        let pivot_id = store.attach_deductible(
            AttachmentTarget::Order(order.id.clone()),
            &discount_id,
            Scope::Order,
        );

        let draft = DeductibleDraft {
            id: Some(discount_id.clone()),
            pivot_id: Some(pivot_id.clone()),
            ..Default::default()
        };
        let attached =
            reconcile_deductible(&draft, DeductibleChannel::Discount, Scope::Order, &store)
                .unwrap();
        assert_eq!(attached.pivot_id.as_deref(), Some(pivot_id.as_str()));
        assert_eq!(attached.deductible.id, discount_id);
    }

    #[test]
    fn test_cross_channel_reference_rejected() {
        let mut store = InMemoryStore::new();
        let tax = Deductible::tax(
            "VAT",
            Pricing::Percentage(Percentage::from_bps(2000)),
            Default::default(),
        );
        let tax_id = tax.id.clone();
        store.insert_deductible(tax);

        let err = reconcile_deductible(
            &DeductibleDraft::existing(&tax_id),
            DeductibleChannel::Discount,
            Scope::Order,
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOrder { .. }));
    }

    #[test]
    fn test_raw_deductible_requires_name_and_pricing() {
        let store = InMemoryStore::new();

        let err = reconcile_deductible(
            &DeductibleDraft::default(),
            DeductibleChannel::Discount,
            Scope::Order,
            &store,
        )
        .unwrap_err();
        assert_eq!(err, CoreError::missing("discount"));

        let nameless = DeductibleDraft {
            amount_cents: Some(500),
            ..Default::default()
        };
        let err =
            reconcile_deductible(&nameless, DeductibleChannel::Discount, Scope::Order, &store)
                .unwrap_err();
        assert_eq!(err, CoreError::missing("name"));
    }

    #[test]
    fn test_new_service_charge_requires_phase() {
        let store = InMemoryStore::new();
        let draft = ServiceChargeDraft {
            name: Some("Fee".to_string()),
            amount_cents: Some(300),
            ..Default::default()
        };
        let err = reconcile_service_charge(&draft, &store).unwrap_err();
        assert_eq!(err, CoreError::missing("calculation_phase"));
    }

    #[test]
    fn test_subtotal_charge_rejected_at_line_scope() {
        let (mut store, espresso, _) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        let charge = ServiceCharge::new(
            "Service",
            Pricing::Percentage(Percentage::from_bps(1000)),
            CalculationPhase::Subtotal,
            TreatmentType::Apportioned,
            false,
        )
        .unwrap();
        let charge_id = charge.id.clone();
        store.insert_service_charge(charge);

        let mut line = LineDraft::of(&espresso.id, 1);
        line.service_charges = vec![ServiceChargeDraft::existing(&charge_id)];
        let err = compose(
            &order,
            &OrderDraft { lines: vec![line], ..Default::default() },
            &store,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidScope { .. }));
    }

    #[test]
    fn test_line_gross_includes_modifiers() {
        let (mut store, espresso, _) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        let oat_milk = Modifier::new("Oat milk", Money::from_cents(50));
        let oat_milk_id = oat_milk.id.clone();
        store.insert_modifier(oat_milk);

        let mut line = LineDraft::of(&espresso.id, 3);
        line.modifier_ids = vec![oat_milk_id];
        let copy = compose(
            &order,
            &OrderDraft { lines: vec![line], ..Default::default() },
            &store,
            &config,
        )
        .unwrap();

        // 3 × (300 + 50)
        assert_eq!(copy.lines[0].gross().cents(), 1050);
    }

    #[test]
    fn test_second_fulfillment_rejected() {
        let (mut store, _, _) = store_with_products();
        let order = Order::new();
        let config = EngineConfig::default();

        store.set_fulfillment(
            order.id.clone(),
            Fulfillment::new(
                FulfillmentKind::Pickup,
                Default::default(),
                FulfillmentDetails::Pickup(PickupDetails {
                    recipient: None,
                    pickup_at: None,
                    note: None,
                }),
            )
            .unwrap(),
        );

        let draft = OrderDraft {
            fulfillment: Some(FulfillmentDraft {
                kind: "pickup".to_string(),
                pickup_details: Some(PickupDetailsDraft::default()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = compose(&order, &draft, &store, &config).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOrder { .. }));
    }

    #[test]
    fn test_shipment_requires_recipient() {
        let store = InMemoryStore::new();
        let order = Order::new();
        let config = EngineConfig::default();

        let draft = OrderDraft {
            fulfillment: Some(FulfillmentDraft {
                kind: "shipment".to_string(),
                shipment_details: Some(ShipmentDetailsDraft::default()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = compose(&order, &draft, &store, &config).unwrap_err();
        assert_eq!(err, CoreError::missing("recipient"));
    }

    #[test]
    fn test_recipient_resolves_from_customer_reference() {
        let mut store = InMemoryStore::new();
        let recipient = Recipient {
            display_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+1-555-0100".to_string(),
            address: Address {
                line_1: "1 Analytical Way".to_string(),
                line_2: None,
                locality: "London".to_string(),
                administrative_district: None,
                postal_code: "SW1A 1AA".to_string(),
                country: "GB".to_string(),
            },
        };
        store.insert_customer("cust-1", recipient.clone());

        let resolved = resolve_recipient(&RecipientDraft::customer("cust-1"), &store).unwrap();
        assert_eq!(resolved, recipient);

        let err = resolve_recipient(&RecipientDraft::customer("ghost"), &store).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOrder { .. }));

        // Partial contact data names the first missing field
        let partial = RecipientDraft {
            display_name: Some("Ada".to_string()),
            ..Default::default()
        };
        let err = resolve_recipient(&partial, &store).unwrap_err();
        assert_eq!(err, CoreError::missing("recipient.email"));
    }

    #[test]
    fn test_mismatched_payload_rejected() {
        let store = InMemoryStore::new();
        let draft = FulfillmentDraft {
            kind: "delivery".to_string(),
            pickup_details: Some(PickupDetailsDraft::default()),
            ..Default::default()
        };
        let err = reconcile_fulfillment(&draft, &store).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOrder { .. }));
    }
}
