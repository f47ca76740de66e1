//! # Pricing Engine
//!
//! Computes the exact integer total of a composed order.
//!
//! ## Fixed Step Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Gross            Σ line (quantity × unit price + modifiers)        │
//! │  2. Line discounts   each against its OWN line gross                   │
//! │  3. Order discounts  once each; % against the PRE-discount gross       │
//! │  4. Apportioned      fixed directly; % against the post-discount       │
//! │     charges          subtotal at the attachment scope                  │
//! │  5. Additive taxes   % against post-discount/post-charge subtotal      │
//! │     (inclusive taxes add nothing)                                      │
//! │  6. Total-phase      sequentially against the fully-taxed running      │
//! │     charges          total (never taxable, so no feedback into 5)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every sub-amount is an integer minor-unit value; percentage arithmetic
//! rounds half-to-even exactly once per sub-amount, so the result is
//! bit-for-bit deterministic.

use crate::compose::{LineCopy, OrderCopy};
use crate::deductible::{AttachedDeductible, DeductibleKind, TaxMode};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::service_charge::CalculationPhase;

/// Computes the order total.
///
/// ## Errors
/// `InvalidServiceCharge` if the copy carries a line-scoped charge whose
/// phase forbids line attachment. Reconciliation already rejects that
/// shape; pricing re-checks rather than silently skipping the charge.
pub fn total_cost(copy: &OrderCopy) -> CoreResult<Money> {
    reject_illegal_line_charges(copy)?;

    // Steps 1-2: per-line gross and post-discount subtotal
    let line_grosses: Vec<Money> = copy.lines.iter().map(LineCopy::gross).collect();
    let line_subtotals: Vec<Money> = copy
        .lines
        .iter()
        .zip(&line_grosses)
        .map(|(line_copy, gross)| apply_discounts(*gross, &line_copy.discounts))
        .collect();

    // Step 3: order discounts, once each, % against pre-discount gross
    let order_gross = line_grosses.iter().fold(Money::zero(), |acc, g| acc + *g);
    let discounted_lines = line_subtotals
        .iter()
        .fold(Money::zero(), |acc, s| acc + *s);
    let order_discount_total = copy
        .discounts
        .iter()
        .fold(Money::zero(), |acc, attached| {
            acc + attached.deductible.pricing.amount_against(order_gross)
        });
    let order_subtotal = discounted_lines - order_discount_total;

    // Step 4: apportioned charges at each scope, tracking what is taxable
    let mut charges_total = Money::zero();
    let mut taxable_charges_total = Money::zero();
    let mut line_taxable_charges: Vec<Money> = vec![Money::zero(); copy.lines.len()];

    for (index, line_copy) in copy.lines.iter().enumerate() {
        for attached in &line_copy.service_charges {
            let amount = attached
                .charge
                .pricing
                .amount_against(line_subtotals[index]);
            charges_total += amount;
            if attached.charge.taxable {
                taxable_charges_total += amount;
                line_taxable_charges[index] += amount;
            }
        }
    }
    for attached in &copy.service_charges {
        if attached.charge.calculation_phase == CalculationPhase::Total {
            continue; // step 6
        }
        let amount = attached.charge.pricing.amount_against(order_subtotal);
        charges_total += amount;
        if attached.charge.taxable {
            taxable_charges_total += amount;
        }
    }

    // Step 5: additive taxes; the base already carries taxable charges
    let mut tax_total = Money::zero();
    for (index, line_copy) in copy.lines.iter().enumerate() {
        let base = line_subtotals[index] + line_taxable_charges[index];
        tax_total += additive_tax_amount(&line_copy.taxes, base);
    }
    let order_tax_base = order_subtotal + taxable_charges_total;
    tax_total += additive_tax_amount(&copy.taxes, order_tax_base);

    // Step 6: Total-phase charges against the fully-taxed running total
    let mut running = order_subtotal + charges_total + tax_total;
    for attached in &copy.service_charges {
        if attached.charge.calculation_phase == CalculationPhase::Total {
            running += attached.charge.pricing.amount_against(running);
        }
    }

    Ok(running)
}

fn reject_illegal_line_charges(copy: &OrderCopy) -> CoreResult<()> {
    for line_copy in &copy.lines {
        for attached in &line_copy.service_charges {
            if !attached.charge.can_apply_to_line() {
                return Err(CoreError::invalid_charge(format!(
                    "{:?}-phase service charge {} is attached at line scope",
                    attached.charge.calculation_phase, attached.charge.id
                )));
            }
        }
    }
    Ok(())
}

fn apply_discounts(gross: Money, discounts: &[AttachedDeductible]) -> Money {
    // Each percentage computes against the line's own gross, never the
    // running total after earlier discounts
    discounts.iter().fold(gross, |acc, attached| {
        acc - attached.deductible.pricing.amount_against(gross)
    })
}

fn additive_tax_amount(taxes: &[AttachedDeductible], base: Money) -> Money {
    taxes.iter().fold(Money::zero(), |acc, attached| {
        match attached.deductible.kind {
            DeductibleKind::Tax { mode: TaxMode::Additive } => {
                acc + attached.deductible.pricing.amount_against(base)
            }
            // Inclusive: already embedded in the listed price
            DeductibleKind::Tax { mode: TaxMode::Inclusive } => acc,
            // Discounts never reach the tax lists
            DeductibleKind::Discount => acc,
        }
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deductible::{Deductible, Pricing, Scope};
    use crate::money::Percentage;
    use crate::service_charge::{AttachedServiceCharge, ServiceCharge, TreatmentType};
    use crate::types::{Order, OrderLine, Product};

    fn line(quantity: i64, unit_cents: i64) -> LineCopy {
        let product = Product::new("Item", Some(Money::from_cents(unit_cents)));
        let order_line = OrderLine::new("o1", &product.id, quantity, Money::from_cents(unit_cents));
        LineCopy {
            product,
            line: order_line,
            discounts: Vec::new(),
            taxes: Vec::new(),
            service_charges: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    fn empty_copy() -> OrderCopy {
        OrderCopy {
            order: Order::new(),
            lines: Vec::new(),
            discounts: Vec::new(),
            taxes: Vec::new(),
            service_charges: Vec::new(),
            fulfillment: None,
        }
    }

    fn fixed_discount(cents: i64, scope: Scope) -> AttachedDeductible {
        AttachedDeductible::new(
            Deductible::discount("Promo", Pricing::Fixed(Money::from_cents(cents))),
            scope,
        )
    }

    fn pct_discount(bps: u32, scope: Scope) -> AttachedDeductible {
        AttachedDeductible::new(
            Deductible::discount("Promo %", Pricing::Percentage(Percentage::from_bps(bps))),
            scope,
        )
    }

    fn additive_tax(bps: u32, scope: Scope) -> AttachedDeductible {
        AttachedDeductible::new(
            Deductible::tax(
                "Tax",
                Pricing::Percentage(Percentage::from_bps(bps)),
                TaxMode::Additive,
            ),
            scope,
        )
    }

    #[test]
    fn test_reference_scenario() {
        // price 110 × qty 5 = 550 gross; line discount 50; order 10%
        // discount against the pre-discount gross (55); inclusive 10% tax
        // adds nothing. 550 − 50 − 55 = 445.
        let mut copy = empty_copy();
        let mut l = line(5, 110);
        l.discounts.push(fixed_discount(50, Scope::Line));
        copy.lines.push(l);
        copy.discounts.push(pct_discount(1000, Scope::Order));
        copy.taxes.push(AttachedDeductible::new(
            Deductible::tax(
                "Inclusive",
                Pricing::Percentage(Percentage::from_bps(1000)),
                TaxMode::Inclusive,
            ),
            Scope::Order,
        ));

        assert_eq!(total_cost(&copy).unwrap().cents(), 445);
    }

    #[test]
    fn test_order_discount_applies_once_across_lines() {
        // Two lines; the fixed order discount subtracts once, not per line
        let mut copy = empty_copy();
        copy.lines.push(line(1, 1000));
        copy.lines.push(line(1, 1000));
        copy.discounts.push(fixed_discount(300, Scope::Order));

        assert_eq!(total_cost(&copy).unwrap().cents(), 1700);
    }

    #[test]
    fn test_line_percentage_discount_uses_own_line_gross() {
        let mut copy = empty_copy();
        let mut a = line(1, 1000);
        a.discounts.push(pct_discount(1000, Scope::Line)); // 10% of 1000
        let b = line(1, 500);
        copy.lines.push(a);
        copy.lines.push(b);

        assert_eq!(total_cost(&copy).unwrap().cents(), 1400);
    }

    #[test]
    fn test_apportioned_percentage_charge_uses_post_discount_base() {
        let mut copy = empty_copy();
        copy.lines.push(line(1, 1000));
        copy.discounts.push(fixed_discount(200, Scope::Order));
        copy.service_charges.push(
            AttachedServiceCharge::new(
                ServiceCharge::new(
                    "Service",
                    Pricing::Percentage(Percentage::from_bps(1000)),
                    CalculationPhase::ApportionedPercentage,
                    TreatmentType::Apportioned,
                    false,
                )
                .unwrap(),
                Scope::Order,
            )
            .unwrap(),
        );

        // 800 subtotal + 10% of 800
        assert_eq!(total_cost(&copy).unwrap().cents(), 880);
    }

    #[test]
    fn test_line_charge_bases_on_line_subtotal() {
        let mut copy = empty_copy();
        let mut l = line(1, 1000);
        l.discounts.push(fixed_discount(200, Scope::Line));
        l.service_charges.push(
            AttachedServiceCharge::new(
                ServiceCharge::new(
                    "Handling",
                    Pricing::Percentage(Percentage::from_bps(500)),
                    CalculationPhase::ApportionedPercentage,
                    TreatmentType::Apportioned,
                    false,
                )
                .unwrap(),
                Scope::Line,
            )
            .unwrap(),
        );
        copy.lines.push(l);

        // 800 + 5% of 800 = 840
        assert_eq!(total_cost(&copy).unwrap().cents(), 840);
    }

    #[test]
    fn test_taxable_charge_feeds_the_tax_base() {
        let mut copy = empty_copy();
        copy.lines.push(line(1, 1000));
        copy.service_charges.push(
            AttachedServiceCharge::new(
                ServiceCharge::new(
                    "Gratuity",
                    Pricing::Percentage(Percentage::from_bps(1000)),
                    CalculationPhase::ApportionedPercentage,
                    TreatmentType::Apportioned,
                    true,
                )
                .unwrap(),
                Scope::Order,
            )
            .unwrap(),
        );
        copy.taxes.push(additive_tax(1000, Scope::Order));

        // 1000 + 100 charge; tax = 10% of (1000 + 100) = 110
        assert_eq!(total_cost(&copy).unwrap().cents(), 1210);
    }

    #[test]
    fn test_non_taxable_charge_stays_out_of_the_tax_base() {
        let mut copy = empty_copy();
        copy.lines.push(line(1, 1000));
        copy.service_charges.push(
            AttachedServiceCharge::new(
                ServiceCharge::new(
                    "Fee",
                    Pricing::Fixed(Money::from_cents(100)),
                    CalculationPhase::ApportionedAmount,
                    TreatmentType::Apportioned,
                    false,
                )
                .unwrap(),
                Scope::Order,
            )
            .unwrap(),
        );
        copy.taxes.push(additive_tax(1000, Scope::Order));

        // tax = 10% of 1000 only
        assert_eq!(total_cost(&copy).unwrap().cents(), 1200);
    }

    #[test]
    fn test_total_phase_applies_last_and_sequentially() {
        let mut copy = empty_copy();
        copy.lines.push(line(1, 1000));
        copy.taxes.push(additive_tax(1000, Scope::Order));
        copy.service_charges.push(
            AttachedServiceCharge::new(
                ServiceCharge::new(
                    "Processing",
                    Pricing::Percentage(Percentage::from_bps(1000)),
                    CalculationPhase::Total,
                    TreatmentType::Apportioned,
                    false,
                )
                .unwrap(),
                Scope::Order,
            )
            .unwrap(),
        );

        // 1000 + 100 tax = 1100; then 10% of 1100 = 110
        assert_eq!(total_cost(&copy).unwrap().cents(), 1210);
    }

    #[test]
    fn test_pricing_rejects_subtotal_charge_at_line_scope() {
        // Bypass the attachment guard with a literal: pricing must still
        // refuse the copy rather than skip the charge
        let mut copy = empty_copy();
        let mut l = line(1, 1000);
        l.service_charges.push(AttachedServiceCharge {
            charge: ServiceCharge::new(
                "Service",
                Pricing::Percentage(Percentage::from_bps(1000)),
                CalculationPhase::Subtotal,
                TreatmentType::Apportioned,
                false,
            )
            .unwrap(),
            scope: Scope::Line,
            pivot_id: None,
        });
        copy.lines.push(l);

        let err = total_cost(&copy).unwrap_err();
        assert!(matches!(err, CoreError::InvalidServiceCharge { .. }));
    }

    #[test]
    fn test_inclusive_tax_adds_nothing() {
        let mut copy = empty_copy();
        copy.lines.push(line(2, 750));
        copy.taxes.push(AttachedDeductible::new(
            Deductible::tax(
                "VAT incl.",
                Pricing::Percentage(Percentage::from_bps(2100)),
                TaxMode::Inclusive,
            ),
            Scope::Order,
        ));

        assert_eq!(total_cost(&copy).unwrap().cents(), 1500);
    }

    #[test]
    fn test_total_is_deterministic() {
        let mut copy = empty_copy();
        let mut l = line(3, 333);
        l.discounts.push(pct_discount(825, Scope::Line));
        l.taxes.push(additive_tax(825, Scope::Line));
        copy.lines.push(l);
        copy.discounts.push(pct_discount(333, Scope::Order));

        let first = total_cost(&copy).unwrap();
        for _ in 0..100 {
            assert_eq!(total_cost(&copy).unwrap(), first);
        }
    }

    #[test]
    fn test_empty_order_prices_to_zero() {
        assert_eq!(total_cost(&empty_copy()).unwrap(), Money::zero());
    }
}
