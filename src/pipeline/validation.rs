//! Arithmetic cross-checks between invoice aggregates and line items.
//!
//! Validation is a pure function of the invoice: it mutates nothing, so
//! running it twice yields the same summary. Checks only run when both sides
//! of a comparison exist — an invoice without line items or without an
//! aggregate has nothing to disagree about. Failures are warnings for the
//! reviewer, never a reason to halt the pipeline.

use bigdecimal::BigDecimal;

use crate::models::invoice::{within_money_tolerance, Invoice, LineItem};

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSummary {
    pub all_valid: bool,
    /// Checks that ran and passed.
    pub passed: usize,
    /// Checks that ran at all.
    pub total: usize,
    pub errors: Vec<String>,
}

/// Run every applicable arithmetic check against the invoice.
pub fn validate(invoice: &Invoice) -> ValidationSummary {
    let mut passed = 0;
    let mut total = 0;
    let mut errors = Vec::new();

    let mut check = |name: &str, expected: &BigDecimal, actual: &BigDecimal| {
        total += 1;
        if within_money_tolerance(expected, actual) {
            passed += 1;
        } else {
            errors.push(format!(
                "{name}: stated {expected} but line items sum to {actual}"
            ));
        }
    };

    let items = &invoice.line_items;

    if let (Some(subtotal), Some(sum)) = (&invoice.subtotal, component_sum(items, |i| &i.amount)) {
        check("subtotal", subtotal, &sum);
    }
    if let (Some(gst), Some(sum)) = (&invoice.gst_amount, component_sum(items, |i| &i.gst)) {
        check("gst_amount", gst, &sum);
    }
    if let (Some(pst), Some(sum)) = (&invoice.pst_amount, component_sum(items, |i| &i.pst)) {
        check("pst_amount", pst, &sum);
    }
    if let (Some(qst), Some(sum)) = (&invoice.qst_amount, component_sum(items, |i| &i.qst)) {
        check("qst_amount", qst, &sum);
    }

    // Aggregate tax agrees with either the direct per-line tax column or,
    // failing that, the sum of the per-line GST/PST/QST components.
    if let Some(tax) = &invoice.tax_amount {
        let direct = component_sum(items, |i| &i.tax_amount);
        let by_parts = tax_parts_sum(items);
        match (direct, by_parts) {
            (Some(direct), _) if within_money_tolerance(tax, &direct) => {
                total += 1;
                passed += 1;
            }
            (Some(direct), Some(parts)) => {
                total += 1;
                if within_money_tolerance(tax, &parts) {
                    passed += 1;
                } else {
                    errors.push(format!(
                        "tax_amount: stated {tax} but line taxes sum to {direct} \
                         (components sum to {parts})"
                    ));
                }
            }
            (Some(direct), None) => {
                total += 1;
                errors.push(format!(
                    "tax_amount: stated {tax} but line taxes sum to {direct}"
                ));
            }
            (None, Some(parts)) => check("tax_amount", tax, &parts),
            (None, None) => {}
        }
    }

    // total = subtotal + tax + shipping + handling − discount, absent
    // adjustments treated as zero.
    if let (Some(total_amount), Some(subtotal)) = (&invoice.total_amount, &invoice.subtotal) {
        let zero = BigDecimal::from(0);
        let computed = subtotal
            + invoice.tax_amount.as_ref().unwrap_or(&zero)
            + invoice.shipping.as_ref().unwrap_or(&zero)
            + invoice.handling.as_ref().unwrap_or(&zero)
            - invoice.discount.as_ref().unwrap_or(&zero);
        total += 1;
        if within_money_tolerance(total_amount, &computed) {
            passed += 1;
        } else {
            errors.push(format!(
                "total_amount: stated {total_amount} but components compute to {computed}"
            ));
        }
    }

    ValidationSummary {
        all_valid: errors.is_empty(),
        passed,
        total,
        errors,
    }
}

/// Sum of one component across line items, `None` when no item carries it.
fn component_sum<F>(items: &[LineItem], component: F) -> Option<BigDecimal>
where
    F: Fn(&LineItem) -> &Option<BigDecimal>,
{
    let mut sum: Option<BigDecimal> = None;
    for item in items {
        if let Some(value) = component(item) {
            sum = Some(match sum.take() {
                Some(s) => s + value,
                None => value.clone(),
            });
        }
    }
    sum
}

/// Sum of GST + PST + QST across line items.
fn tax_parts_sum(items: &[LineItem]) -> Option<BigDecimal> {
    let mut sum: Option<BigDecimal> = None;
    for item in items {
        for part in [&item.gst, &item.pst, &item.qst] {
            if let Some(value) = part {
                sum = Some(match sum.take() {
                    Some(s) => s + value,
                    None => value.clone(),
                });
            }
        }
    }
    sum
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
