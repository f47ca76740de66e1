//! # Error Types
//!
//! Domain-specific error types for meridian-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meridian-core errors (this file)                                      │
//! │  └── CoreError  - Composition, validation, and pricing failures        │
//! │                                                                         │
//! │  meridian-db errors (separate crate)                                   │
//! │  └── DbError    - Database operation failures (wraps CoreError when    │
//! │                   a loaded row violates a domain invariant)            │
//! │                                                                         │
//! │  meridian-gateway reuses CoreError: the wire builder surfaces the      │
//! │  same typed failure kinds the composition layer does.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Errors are enum variants, never String
//! 3. Every failure is raised synchronously at the point of violation and
//!    never retried internally - these are bad-input conditions, not
//!    transient ones
//! 4. No error is silently swallowed; pricing either succeeds with an
//!    exact total or fails entirely

use thiserror::Error;

use crate::deductible::Scope;
use crate::service_charge::CalculationPhase;

// =============================================================================
// Core Error
// =============================================================================

/// Composition, validation, and pricing errors.
///
/// These represent caller programming errors or bad input data. They are
/// raised at the point of violation and carry enough context to identify
/// the offending field or structure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A required field is absent.
    ///
    /// ## When This Occurs
    /// - A line draft with no quantity
    /// - A deductible draft with neither amount nor percentage
    /// - A tax without a percentage reaching the wire builder
    /// - A recipient with partial contact fields
    #[error("missing required attribute: {field}")]
    MissingAttribute { field: String },

    /// Two mutually exclusive fields were both set.
    ///
    /// ## When This Occurs
    /// - A deductible or service-charge draft carrying both a fixed
    ///   amount and a percentage
    #[error("conflicting attributes: {left} and {right} are mutually exclusive")]
    ConflictingAttributes { left: String, right: String },

    /// Structural violation of the order itself.
    ///
    /// ## When This Occurs
    /// - Composing a second fulfillment onto an order that has one
    /// - Fulfillment detail payload not matching the declared type
    /// - A reference to an unknown product, deductible, or customer
    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// A service charge was attached at a scope its phase forbids.
    ///
    /// ## When This Occurs
    /// - A `Subtotal`-phase charge attached at line scope (the canonical
    ///   case: legality depends on where it is attached, not how it was
    ///   built, so this surfaces at attachment time)
    #[error("{phase:?} service charge cannot be attached at {scope:?} scope")]
    InvalidScope {
        phase: CalculationPhase,
        scope: Scope,
    },

    /// A service charge violates the phase/treatment/taxable rules.
    ///
    /// Surfaced at validation time (create/update) or at pricing time as
    /// a defense-in-depth check for copies that bypassed reconciliation.
    #[error("invalid service charge: {reason}")]
    InvalidServiceCharge { reason: String },
}

impl CoreError {
    /// Creates a MissingAttribute error for a field.
    pub fn missing(field: impl Into<String>) -> Self {
        CoreError::MissingAttribute {
            field: field.into(),
        }
    }

    /// Creates a ConflictingAttributes error for a field pair.
    pub fn conflicting(left: impl Into<String>, right: impl Into<String>) -> Self {
        CoreError::ConflictingAttributes {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Creates an InvalidOrder error with a reason.
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        CoreError::InvalidOrder {
            reason: reason.into(),
        }
    }

    /// Creates an InvalidServiceCharge error with a reason.
    pub fn invalid_charge(reason: impl Into<String>) -> Self {
        CoreError::InvalidServiceCharge {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::missing("quantity");
        assert_eq!(err.to_string(), "missing required attribute: quantity");

        let err = CoreError::conflicting("amount", "percentage");
        assert_eq!(
            err.to_string(),
            "conflicting attributes: amount and percentage are mutually exclusive"
        );

        let err = CoreError::invalid_order("order already has a fulfillment");
        assert_eq!(
            err.to_string(),
            "invalid order: order already has a fulfillment"
        );
    }

    #[test]
    fn test_invalid_scope_message_names_phase_and_scope() {
        let err = CoreError::InvalidScope {
            phase: CalculationPhase::Subtotal,
            scope: Scope::Line,
        };
        let msg = err.to_string();
        assert!(msg.contains("Subtotal"));
        assert!(msg.contains("Line"));
    }
}
