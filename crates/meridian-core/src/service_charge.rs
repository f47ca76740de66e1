//! # Service Charge State Machine
//!
//! An order- or line-level fee with a calculation phase and a treatment
//! type, governed by a validation state machine.
//!
//! ## Phase × Treatment Legality
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Phase                  LineItem    Apportioned   taxable?   pricing    │
//! │  ─────────────────────  ──────────  ───────────   ────────   ────────── │
//! │  Subtotal               ✅          ✅            either     either     │
//! │  Total                  ❌          ✅            must be    either     │
//! │                                                   false                 │
//! │  ApportionedAmount      ❌          ✅            either     Fixed only │
//! │  ApportionedPercentage  ❌          ✅            either     Pct only   │
//! │                                                                         │
//! │  Attachment scope is a separate axis: only the two Apportioned*        │
//! │  phases may attach at LINE scope. Subtotal at line scope fails with    │
//! │  InvalidScope at ATTACHMENT time, not creation time, because           │
//! │  legality depends on where the charge lands, not how it was built.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation runs identically on create and on update: no illegal
//! combination may ever reach a persisted or priced state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deductible::{Pricing, Scope};
use crate::error::{CoreError, CoreResult};

// =============================================================================
// Phase & Treatment
// =============================================================================

/// When in the pricing sequence a service charge is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationPhase {
    /// Against the post-discount order subtotal, before taxes.
    Subtotal,
    /// Against the fully-taxed running total, applied last.
    Total,
    /// A fixed amount apportioned at its attachment scope.
    ApportionedAmount,
    /// A percentage apportioned at its attachment scope.
    ApportionedPercentage,
}

/// Whether a service charge is distributed per line item or applied
/// once, apportioned across the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentType {
    /// Distributed onto individual line items.
    LineItem,
    /// Applied once, apportioned across the order.
    Apportioned,
}

// =============================================================================
// Service Charge
// =============================================================================

/// An order- or line-level fee.
///
/// Constructed only through [`ServiceCharge::new`] and mutated only
/// through [`ServiceCharge::update`], both of which run the full state
/// machine validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCharge {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name forwarded to the payment processor.
    pub name: String,

    /// Fixed amount or percentage (exactly one, by construction).
    pub pricing: Pricing,

    /// When in the pricing sequence the charge applies.
    pub calculation_phase: CalculationPhase,

    /// Per-line distribution vs order-wide apportionment.
    pub treatment_type: TreatmentType,

    /// Whether the charge amount feeds into the tax base.
    pub taxable: bool,
}

/// Field updates for an existing service charge.
///
/// `None` fields keep their current value. The merged candidate passes
/// through the same validation as creation before being committed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceChargeUpdate {
    pub name: Option<String>,
    pub pricing: Option<Pricing>,
    pub calculation_phase: Option<CalculationPhase>,
    pub treatment_type: Option<TreatmentType>,
    pub taxable: Option<bool>,
}

impl ServiceCharge {
    /// Creates a new service charge, validating the phase/treatment/
    /// taxable/pricing combination before it can exist.
    pub fn new(
        name: impl Into<String>,
        pricing: Pricing,
        calculation_phase: CalculationPhase,
        treatment_type: TreatmentType,
        taxable: bool,
    ) -> CoreResult<Self> {
        validate(pricing, calculation_phase, treatment_type, taxable)?;
        Ok(ServiceCharge {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            pricing,
            calculation_phase,
            treatment_type,
            taxable,
        })
    }

    /// Rehydrates a persisted charge, re-running validation.
    ///
    /// The storage layer calls this on load so that a row edited outside
    /// the application can never smuggle an illegal combination into a
    /// priced order.
    pub fn from_persisted(
        id: String,
        name: String,
        pricing: Pricing,
        calculation_phase: CalculationPhase,
        treatment_type: TreatmentType,
        taxable: bool,
    ) -> CoreResult<Self> {
        validate(pricing, calculation_phase, treatment_type, taxable)?;
        Ok(ServiceCharge {
            id,
            name,
            pricing,
            calculation_phase,
            treatment_type,
            taxable,
        })
    }

    /// Applies an update, validating the merged candidate first.
    ///
    /// On failure the charge is left unchanged - validation runs against
    /// a scratch copy, never the live value.
    pub fn update(&mut self, patch: ServiceChargeUpdate) -> CoreResult<()> {
        let pricing = patch.pricing.unwrap_or(self.pricing);
        let phase = patch.calculation_phase.unwrap_or(self.calculation_phase);
        let treatment = patch.treatment_type.unwrap_or(self.treatment_type);
        let taxable = patch.taxable.unwrap_or(self.taxable);

        validate(pricing, phase, treatment, taxable)?;

        if let Some(name) = patch.name {
            self.name = name;
        }
        self.pricing = pricing;
        self.calculation_phase = phase;
        self.treatment_type = treatment;
        self.taxable = taxable;
        Ok(())
    }

    /// True only for the two `Apportioned*` phases: everything else is
    /// illegal at line scope.
    pub fn can_apply_to_line(&self) -> bool {
        matches!(
            self.calculation_phase,
            CalculationPhase::ApportionedAmount | CalculationPhase::ApportionedPercentage
        )
    }

    /// Always true; each phase still enforces its own field constraints.
    pub fn can_apply_to_order(&self) -> bool {
        true
    }

    /// Checks legality at an attachment scope.
    ///
    /// ## Errors
    /// `InvalidScope` for any non-`Apportioned*` phase at line scope.
    pub fn check_scope(&self, scope: Scope) -> CoreResult<()> {
        match scope {
            Scope::Order => Ok(()),
            Scope::Line => {
                if self.can_apply_to_line() {
                    Ok(())
                } else {
                    Err(CoreError::InvalidScope {
                        phase: self.calculation_phase,
                        scope,
                    })
                }
            }
        }
    }
}

/// The state machine's transition guard, shared by create and update.
fn validate(
    pricing: Pricing,
    phase: CalculationPhase,
    treatment: TreatmentType,
    taxable: bool,
) -> CoreResult<()> {
    match phase {
        CalculationPhase::Subtotal => Ok(()),

        CalculationPhase::Total => {
            if taxable {
                return Err(CoreError::invalid_charge(
                    "Total-phase charge must not be taxable",
                ));
            }
            if treatment == TreatmentType::LineItem {
                return Err(CoreError::invalid_charge(
                    "Total-phase charge cannot use LineItem treatment",
                ));
            }
            Ok(())
        }

        CalculationPhase::ApportionedAmount => {
            if treatment == TreatmentType::LineItem {
                return Err(CoreError::invalid_charge(
                    "ApportionedAmount charge cannot use LineItem treatment",
                ));
            }
            if pricing.fixed_amount().is_none() {
                return Err(CoreError::invalid_charge(
                    "ApportionedAmount charge requires a fixed amount, not a percentage",
                ));
            }
            Ok(())
        }

        CalculationPhase::ApportionedPercentage => {
            if treatment == TreatmentType::LineItem {
                return Err(CoreError::invalid_charge(
                    "ApportionedPercentage charge cannot use LineItem treatment",
                ));
            }
            if pricing.percentage().is_none() {
                return Err(CoreError::invalid_charge(
                    "ApportionedPercentage charge requires a percentage, not a fixed amount",
                ));
            }
            Ok(())
        }
    }
}

// =============================================================================
// Attachment
// =============================================================================

/// A service charge attached to a parent at a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedServiceCharge {
    /// The service charge definition.
    pub charge: ServiceCharge,

    /// Order-level or line-level.
    pub scope: Scope,

    /// Persisted join-row id, if any.
    pub pivot_id: Option<String>,
}

impl AttachedServiceCharge {
    /// Wraps a charge with a scope after checking scope legality.
    pub fn new(charge: ServiceCharge, scope: Scope) -> CoreResult<Self> {
        charge.check_scope(scope)?;
        Ok(AttachedServiceCharge {
            charge,
            scope,
            pivot_id: None,
        })
    }
}

/// Pushes an attachment onto a parent's list, deduplicating by charge
/// identity, mirroring [`crate::deductible::attach_deductible`].
pub fn attach_service_charge(
    list: &mut Vec<AttachedServiceCharge>,
    attachment: AttachedServiceCharge,
) {
    let already = list
        .iter()
        .any(|existing| existing.charge.id == attachment.charge.id);
    if !already {
        list.push(attachment);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
