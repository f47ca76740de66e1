//! # Composition Store
//!
//! The repository seam the reconciliation builders read through.
//!
//! ## Why A Trait?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The legacy system issued static find-or-create database calls from    │
//! │  inside its builders, making them untestable without a live schema.    │
//! │                                                                         │
//! │  Here every builder is a pure function of (input, store):              │
//! │                                                                         │
//! │    compose(order, draft, &store, &config) -> OrderCopy                 │
//! │                                                                         │
//! │  Core tests hand in an InMemoryStore. meridian-db loads a persisted    │
//! │  order graph into the SAME InMemoryStore type, so the composition      │
//! │  path is identical with and without a database.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store is read-only by design: builders never persist. Persisting a
//! composed copy is a separate, caller-driven step (`meridian-db`).

use std::collections::HashMap;

use uuid::Uuid;

use crate::deductible::{AttachedDeductible, Deductible, Scope};
use crate::fulfillment::{Fulfillment, Recipient};
use crate::service_charge::{AttachedServiceCharge, ServiceCharge};
use crate::types::{AttachmentTarget, Modifier, OrderLine, Product};

// =============================================================================
// Trait
// =============================================================================

/// Read access to the persisted order graph and catalog.
///
/// Lookups return owned clones: the composed copy must stay consistent
/// even if the underlying store changes after composition.
pub trait CompositionStore {
    /// Finds a product by identity.
    fn product(&self, id: &str) -> Option<Product>;

    /// Finds a deductible definition by identity.
    fn deductible(&self, id: &str) -> Option<Deductible>;

    /// Finds a service charge definition by identity.
    fn service_charge(&self, id: &str) -> Option<ServiceCharge>;

    /// Finds a modifier by identity.
    fn modifier(&self, id: &str) -> Option<Modifier>;

    /// Resolves a customer identity to recipient contact data.
    fn customer_recipient(&self, customer_id: &str) -> Option<Recipient>;

    /// Finds an order line by its natural key (order, product).
    fn order_line(&self, order_id: &str, product_id: &str) -> Option<OrderLine>;

    /// Lists all persisted lines for an order, in creation order.
    fn order_lines(&self, order_id: &str) -> Vec<OrderLine>;

    /// Loads an already-attached deductible instance via its pivot
    /// (join-row) identity.
    fn deductible_attachment(&self, pivot_id: &str) -> Option<AttachedDeductible>;

    /// Lists deductible attachments on a target.
    fn attachments_for(&self, target: &AttachmentTarget) -> Vec<AttachedDeductible>;

    /// Lists service-charge attachments on a target.
    fn charges_for(&self, target: &AttachmentTarget) -> Vec<AttachedServiceCharge>;

    /// Lists modifiers attached to a line.
    fn modifiers_for_line(&self, line_id: &str) -> Vec<Modifier>;

    /// Returns the order's persisted fulfillment, if any.
    fn order_fulfillment(&self, order_id: &str) -> Option<Fulfillment>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// HashMap-backed [`CompositionStore`].
///
/// Used directly by core tests, and by `meridian-db` as the snapshot
/// type an order graph is hydrated into.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    products: HashMap<String, Product>,
    deductibles: HashMap<String, Deductible>,
    service_charges: HashMap<String, ServiceCharge>,
    modifiers: HashMap<String, Modifier>,
    customers: HashMap<String, Recipient>,
    lines: Vec<OrderLine>,
    deductible_attachments: Vec<(AttachmentTarget, AttachedDeductible)>,
    charge_attachments: Vec<(AttachmentTarget, AttachedServiceCharge)>,
    line_modifiers: Vec<(String, String)>,
    fulfillments: HashMap<String, Fulfillment>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a product.
    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    /// Inserts (or replaces) a deductible definition.
    pub fn insert_deductible(&mut self, deductible: Deductible) {
        self.deductibles.insert(deductible.id.clone(), deductible);
    }

    /// Inserts (or replaces) a service charge definition.
    pub fn insert_service_charge(&mut self, charge: ServiceCharge) {
        self.service_charges.insert(charge.id.clone(), charge);
    }

    /// Inserts (or replaces) a modifier.
    pub fn insert_modifier(&mut self, modifier: Modifier) {
        self.modifiers.insert(modifier.id.clone(), modifier);
    }

    /// Registers a customer identity with its recipient contact data.
    pub fn insert_customer(&mut self, customer_id: impl Into<String>, recipient: Recipient) {
        self.customers.insert(customer_id.into(), recipient);
    }

    /// Inserts (or replaces, by natural key) an order line.
    pub fn insert_line(&mut self, line: OrderLine) {
        if let Some(existing) = self
            .lines
            .iter_mut()
            .find(|l| l.order_id == line.order_id && l.product_id == line.product_id)
        {
            *existing = line;
        } else {
            self.lines.push(line);
        }
    }

    /// Inserts a fully-formed deductible attachment (pivot id included),
    /// as loaded from persistent storage.
    pub fn insert_deductible_attachment(
        &mut self,
        target: AttachmentTarget,
        attached: AttachedDeductible,
    ) {
        self.deductible_attachments.push((target, attached));
    }

    /// Inserts a fully-formed service charge attachment, as loaded from
    /// persistent storage.
    pub fn insert_charge_attachment(
        &mut self,
        target: AttachmentTarget,
        attached: AttachedServiceCharge,
    ) {
        self.charge_attachments.push((target, attached));
    }

    /// Attaches a known deductible to a target, returning the generated
    /// pivot id. Panics if the deductible is unknown (test setup error).
    pub fn attach_deductible(
        &mut self,
        target: AttachmentTarget,
        deductible_id: &str,
        scope: Scope,
    ) -> String {
        let deductible = self
            .deductibles
            .get(deductible_id)
            .cloned()
            .unwrap_or_else(|| panic!("unknown deductible in store setup: {deductible_id}"));
        let pivot_id = Uuid::new_v4().to_string();
        self.insert_deductible_attachment(
            target,
            AttachedDeductible {
                deductible,
                scope,
                pivot_id: Some(pivot_id.clone()),
            },
        );
        pivot_id
    }

    /// Attaches a known service charge to a target, returning the
    /// generated pivot id.
    pub fn attach_service_charge(
        &mut self,
        target: AttachmentTarget,
        charge_id: &str,
        scope: Scope,
    ) -> String {
        let charge = self
            .service_charges
            .get(charge_id)
            .cloned()
            .unwrap_or_else(|| panic!("unknown service charge in store setup: {charge_id}"));
        let pivot_id = Uuid::new_v4().to_string();
        self.insert_charge_attachment(
            target,
            AttachedServiceCharge {
                charge,
                scope,
                pivot_id: Some(pivot_id.clone()),
            },
        );
        pivot_id
    }

    /// Attaches a known modifier to a line.
    pub fn attach_modifier(&mut self, line_id: impl Into<String>, modifier_id: impl Into<String>) {
        self.line_modifiers.push((line_id.into(), modifier_id.into()));
    }

    /// Sets an order's persisted fulfillment.
    pub fn set_fulfillment(&mut self, order_id: impl Into<String>, fulfillment: Fulfillment) {
        self.fulfillments.insert(order_id.into(), fulfillment);
    }
}

impl CompositionStore for InMemoryStore {
    fn product(&self, id: &str) -> Option<Product> {
        self.products.get(id).cloned()
    }

    fn deductible(&self, id: &str) -> Option<Deductible> {
        self.deductibles.get(id).cloned()
    }

    fn service_charge(&self, id: &str) -> Option<ServiceCharge> {
        self.service_charges.get(id).cloned()
    }

    fn modifier(&self, id: &str) -> Option<Modifier> {
        self.modifiers.get(id).cloned()
    }

    fn customer_recipient(&self, customer_id: &str) -> Option<Recipient> {
        self.customers.get(customer_id).cloned()
    }

    fn order_line(&self, order_id: &str, product_id: &str) -> Option<OrderLine> {
        self.lines
            .iter()
            .find(|l| l.order_id == order_id && l.product_id == product_id)
            .cloned()
    }

    fn order_lines(&self, order_id: &str) -> Vec<OrderLine> {
        self.lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect()
    }

    fn deductible_attachment(&self, pivot_id: &str) -> Option<AttachedDeductible> {
        self.deductible_attachments
            .iter()
            .map(|(_, attached)| attached)
            .find(|attached| attached.pivot_id.as_deref() == Some(pivot_id))
            .cloned()
    }

    fn attachments_for(&self, target: &AttachmentTarget) -> Vec<AttachedDeductible> {
        self.deductible_attachments
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, attached)| attached.clone())
            .collect()
    }

    fn charges_for(&self, target: &AttachmentTarget) -> Vec<AttachedServiceCharge> {
        self.charge_attachments
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, attached)| attached.clone())
            .collect()
    }

    fn modifiers_for_line(&self, line_id: &str) -> Vec<Modifier> {
        self.line_modifiers
            .iter()
            .filter(|(lid, _)| lid == line_id)
            .filter_map(|(_, mid)| self.modifiers.get(mid).cloned())
            .collect()
    }

    fn order_fulfillment(&self, order_id: &str) -> Option<Fulfillment> {
        self.fulfillments.get(order_id).cloned()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
