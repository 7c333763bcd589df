//! Line-item mapping: typed conversion of raw provider items, tax-line
//! exclusion, and amount derivation/consistency checks.

use std::sync::OnceLock;

use bigdecimal::BigDecimal;
use regex::Regex;

use super::parse::parse_decimal;
use crate::models::invoice::LineItem;
use crate::pipeline::gateway::RawLineItem;

/// Confidence cap applied when a line's amount disagrees with qty × price.
const INCONSISTENT_LINE_CONFIDENCE: f32 = 0.5;

/// Result of mapping the provider's raw items.
pub struct MappedLineItems {
    pub items: Vec<LineItem>,
    /// Sum of amounts from excluded tax lines, to fold into the invoice's
    /// aggregate tax_amount.
    pub tax_line_total: Option<BigDecimal>,
}

/// Whether a line-item description is a tax line rather than a good/service.
///
/// Matches whole words only, so "Taxi fare" and "Syntax guide" stay items
/// while "GST 5%" and "Sales Tax" are excluded.
pub fn is_tax_line(description: &str) -> bool {
    static TAX_LINE_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAX_LINE_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(gst|pst|qst|hst|vat|taxes?)\b").expect("valid tax-line pattern")
    });
    re.is_match(description)
}

/// Map raw line items to typed ones.
///
/// Tax lines are excluded from the result and accumulated separately.
/// Remaining items are renumbered 1..n. When quantity and unit price are
/// present but the amount is missing, the amount is derived; when all three
/// are present and disagree by more than 0.01, the line's confidence is
/// capped rather than the line dropped.
pub fn map_line_items(raw_items: &[RawLineItem]) -> MappedLineItems {
    let mut items = Vec::new();
    let mut tax_line_total: Option<BigDecimal> = None;

    for raw in raw_items {
        let description = raw
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let amount = raw.amount.as_deref().and_then(parse_decimal);

        if let Some(desc) = &description {
            if is_tax_line(desc) {
                if let Some(a) = amount {
                    tax_line_total = Some(match tax_line_total.take() {
                        Some(t) => t + a,
                        None => a,
                    });
                }
                continue;
            }
        }

        let mut item = LineItem::new((items.len() + 1) as u32);
        item.description = description;
        item.quantity = raw.quantity.as_deref().and_then(parse_decimal);
        item.unit_price = raw.unit_price.as_deref().and_then(parse_decimal);
        item.amount = amount;
        item.gst = raw.gst.as_deref().and_then(parse_decimal);
        item.pst = raw.pst.as_deref().and_then(parse_decimal);
        item.qst = raw.qst.as_deref().and_then(parse_decimal);
        item.tax_amount = raw.tax.as_deref().and_then(parse_decimal);
        item.confidence = raw.confidence.clamp(0.0, 1.0);

        // Derive amount when both factors are known.
        if item.amount.is_none() {
            if let (Some(q), Some(p)) = (&item.quantity, &item.unit_price) {
                item.amount = Some(q * p);
            }
        } else if !item.amount_consistent() {
            item.confidence = item.confidence.min(INCONSISTENT_LINE_CONFIDENCE);
        }

        items.push(item);
    }

    MappedLineItems {
        items,
        tax_line_total,
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
