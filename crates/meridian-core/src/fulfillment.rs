//! # Fulfillment
//!
//! How a composed order reaches the customer: pickup, shipment, or
//! delivery. An order supports exactly one fulfillment; its details
//! payload must match the declared type.
//!
//! ## Recipient Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pickup     recipient OPTIONAL                                          │
//! │  Shipment   recipient REQUIRED (address present)                        │
//! │  Delivery   recipient REQUIRED (address present)                        │
//! │                                                                         │
//! │  A recipient resolves from EITHER an existing customer identity OR a   │
//! │  fully populated set of contact fields (display name, email, phone,    │
//! │  address). Partial contact data fails with MissingAttribute.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Kind & State
// =============================================================================

/// How the order is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentKind {
    /// Customer collects the order.
    Pickup,
    /// Order ships via a carrier.
    Shipment,
    /// Order is delivered by the merchant.
    Delivery,
}

impl FulfillmentKind {
    /// Parses the loosely-typed kind string from raw input.
    ///
    /// ## Errors
    /// `InvalidOrder` for an unrecognized fulfillment type.
    pub fn parse(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pickup" => Ok(FulfillmentKind::Pickup),
            "shipment" => Ok(FulfillmentKind::Shipment),
            "delivery" => Ok(FulfillmentKind::Delivery),
            other => Err(CoreError::invalid_order(format!(
                "unknown fulfillment type: {other}"
            ))),
        }
    }
}

/// Fulfillment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentState {
    /// Proposed but not yet accepted.
    #[default]
    Proposed,
    /// Accepted and reserved.
    Reserved,
    /// Prepared and awaiting handoff.
    Prepared,
    /// Handed off / delivered.
    Completed,
    /// Canceled.
    Canceled,
}

// =============================================================================
// Recipient
// =============================================================================

/// Postal address for a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line_1: String,
    pub line_2: Option<String>,
    pub locality: String,
    pub administrative_district: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Fully-resolved recipient contact information.
///
/// Only ever constructed from a customer identity lookup or a complete
/// contact field set; a partially-populated recipient cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub display_name: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

// =============================================================================
// Details
// =============================================================================

/// Pickup-specific details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupDetails {
    /// Optional for pickup: the customer shows up in person.
    pub recipient: Option<Recipient>,
    /// Pickup window note ("ready at 5pm").
    pub pickup_at: Option<String>,
    pub note: Option<String>,
}

/// Shipment-specific details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentDetails {
    pub recipient: Recipient,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// Delivery-specific details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub recipient: Recipient,
    /// Scheduled delivery window note.
    pub deliver_at: Option<String>,
    pub courier_note: Option<String>,
}

/// Exactly one details payload, tagged by the kind it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FulfillmentDetails {
    Pickup(PickupDetails),
    Shipment(ShipmentDetails),
    Delivery(DeliveryDetails),
}

impl FulfillmentDetails {
    /// Returns the kind this payload belongs to.
    pub fn kind(&self) -> FulfillmentKind {
        match self {
            FulfillmentDetails::Pickup(_) => FulfillmentKind::Pickup,
            FulfillmentDetails::Shipment(_) => FulfillmentKind::Shipment,
            FulfillmentDetails::Delivery(_) => FulfillmentKind::Delivery,
        }
    }

    /// Returns the recipient, if one is present.
    pub fn recipient(&self) -> Option<&Recipient> {
        match self {
            FulfillmentDetails::Pickup(details) => details.recipient.as_ref(),
            FulfillmentDetails::Shipment(details) => Some(&details.recipient),
            FulfillmentDetails::Delivery(details) => Some(&details.recipient),
        }
    }
}

// =============================================================================
// Fulfillment
// =============================================================================

/// A fulfillment instruction: kind, lifecycle state, and the matching
/// details payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub kind: FulfillmentKind,
    pub state: FulfillmentState,
    pub details: FulfillmentDetails,
}

impl Fulfillment {
    /// Creates a fulfillment, rejecting a details payload that does not
    /// match the declared kind.
    ///
    /// ## Errors
    /// `InvalidOrder` on kind/details mismatch (e.g. `Pickup` with
    /// `DeliveryDetails`).
    pub fn new(
        kind: FulfillmentKind,
        state: FulfillmentState,
        details: FulfillmentDetails,
    ) -> CoreResult<Self> {
        if details.kind() != kind {
            return Err(CoreError::invalid_order(format!(
                "fulfillment type {:?} does not match its {:?} details",
                kind,
                details.kind()
            )));
        }
        Ok(Fulfillment {
            kind,
            state,
            details,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
