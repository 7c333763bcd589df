//! Canonical field mapper.
//!
//! Normalizes the provider's raw extraction into the canonical `Invoice`
//! schema: alias lookup for directly-mapped fields, address composition from
//! sub-fields, typed parsing of dates and amounts, line-item mapping with
//! tax-line exclusion, and derivation of one missing financial aggregate.
//! Per-field confidences are recorded only for fields that actually mapped.

pub mod address;
pub mod aliases;
pub mod line_items;
pub mod parse;

use bigdecimal::BigDecimal;

use crate::models::invoice::Invoice;
use crate::pipeline::gateway::{RawExtraction, RawField};

use aliases::FIELD_ALIASES;

/// Address field → provider sub-field prefixes, in lookup priority order.
const ADDRESS_PREFIXES: &[(&str, &[&str])] = &[
    ("vendor_address", &["Vendor"]),
    ("billing_address", &["Billing", "Customer"]),
    ("shipping_address", &["Shipping"]),
    ("remittance_address", &["Remittance"]),
];

pub struct CanonicalFieldMapper {
    default_currency: String,
}

impl CanonicalFieldMapper {
    pub fn new(default_currency: &str) -> Self {
        Self {
            default_currency: default_currency.to_string(),
        }
    }

    /// Map a raw extraction into a canonical invoice.
    ///
    /// Values the target field's type rejects (bad dates, non-numeric
    /// amounts) are dropped rather than carried as text, so absence after
    /// mapping always means "no usable value".
    pub fn map(&self, raw: &RawExtraction) -> Invoice {
        let mut invoice = Invoice::new();
        invoice.source_error = raw.error.clone();

        for (canonical, alias_names) in FIELD_ALIASES {
            if let Some(field) = first_present(&raw.fields, alias_names) {
                if invoice.set_field(canonical, &field.value, &self.default_currency) {
                    invoice
                        .field_confidence
                        .insert(canonical.to_string(), field.confidence.clamp(0.0, 1.0));
                }
            }
        }

        for (canonical, prefixes) in ADDRESS_PREFIXES {
            for prefix in *prefixes {
                if let Some((addr, confidence)) = address::compose_address(&raw.fields, prefix) {
                    match *canonical {
                        "vendor_address" => invoice.vendor_address = Some(addr),
                        "billing_address" => invoice.billing_address = Some(addr),
                        "shipping_address" => invoice.shipping_address = Some(addr),
                        _ => invoice.remittance_address = Some(addr),
                    }
                    invoice
                        .field_confidence
                        .insert(canonical.to_string(), confidence.clamp(0.0, 1.0));
                    break;
                }
            }
        }

        let mapped = line_items::map_line_items(&raw.line_items);
        invoice.line_items = mapped.items;

        // Excluded tax lines fill an absent aggregate tax_amount.
        if invoice.tax_amount.is_none() {
            if let Some(total) = mapped.tax_line_total {
                invoice.tax_amount = Some(total);
                invoice
                    .field_confidence
                    .insert("tax_amount".to_string(), raw.confidence.clamp(0.0, 1.0));
            }
        }

        self.derive_missing_aggregate(&mut invoice);
        invoice
    }

    /// When line items exist and exactly one of {subtotal, tax_amount,
    /// total_amount} is missing, derive it from the other two. The derived
    /// field inherits the minimum confidence of its operands.
    fn derive_missing_aggregate(&self, invoice: &mut Invoice) {
        if invoice.line_items.is_empty() {
            return;
        }

        let conf = |invoice: &Invoice, name: &str| -> f32 {
            invoice.field_confidence.get(name).copied().unwrap_or(0.0)
        };

        let (derived_name, value, confidence): (&str, BigDecimal, f32) = match (
            &invoice.subtotal,
            &invoice.tax_amount,
            &invoice.total_amount,
        ) {
            (Some(sub), Some(tax), None) => (
                "total_amount",
                sub + tax,
                conf(invoice, "subtotal").min(conf(invoice, "tax_amount")),
            ),
            (Some(sub), None, Some(total)) => (
                "tax_amount",
                total - sub,
                conf(invoice, "subtotal").min(conf(invoice, "total_amount")),
            ),
            (None, Some(tax), Some(total)) => (
                "subtotal",
                total - tax,
                conf(invoice, "tax_amount").min(conf(invoice, "total_amount")),
            ),
            _ => return,
        };

        // A stated subtotal above the stated total would derive a negative
        // amount; leave the field absent instead.
        if value < BigDecimal::from(0) {
            return;
        }

        match derived_name {
            "total_amount" => invoice.total_amount = Some(value),
            "tax_amount" => invoice.tax_amount = Some(value),
            _ => invoice.subtotal = Some(value),
        }
        invoice
            .field_confidence
            .insert(derived_name.to_string(), confidence);
    }
}

/// First alias present in the raw fields with a non-blank value.
fn first_present<'a>(
    fields: &'a std::collections::HashMap<String, RawField>,
    alias_names: &[&str],
) -> Option<&'a RawField> {
    alias_names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|f| !f.value.trim().is_empty())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    use crate::pipeline::gateway::RawLineItem;

    fn field(value: &str, confidence: f32) -> RawField {
        RawField {
            value: value.to_string(),
            confidence,
        }
    }

    fn mapper() -> CanonicalFieldMapper {
        CanonicalFieldMapper::new("USD")
    }

    fn raw_with(fields: Vec<(&str, &str, f32)>) -> RawExtraction {
        let mut map = HashMap::new();
        for (name, value, conf) in fields {
            map.insert(name.to_string(), field(value, conf));
        }
        RawExtraction {
            fields: map,
            confidence: 0.9,
            ..RawExtraction::default()
        }
    }

    #[test]
    fn maps_aliased_fields_with_confidence() {
        let raw = raw_with(vec![
            ("InvoiceId", "INV-2042", 0.98),
            ("VendorName", "Acme Corp", 0.92),
            ("InvoiceTotal", "$1,250.00", 0.97),
            ("InvoiceDate", "2026-03-14", 0.95),
        ]);
        let invoice = mapper().map(&raw);

        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-2042"));
        assert_eq!(invoice.vendor_name.as_deref(), Some("Acme Corp"));
        assert_eq!(
            invoice.total_amount,
            Some(BigDecimal::from_str("1250.00").unwrap())
        );
        assert_eq!(
            invoice.invoice_date,
            Some(chrono::NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
        );
        assert!((invoice.field_confidence["invoice_number"] - 0.98).abs() < f32::EPSILON);
        assert!((invoice.field_confidence["total_amount"] - 0.97).abs() < f32::EPSILON);
    }

    #[test]
    fn first_alias_wins() {
        let raw = raw_with(vec![
            ("InvoiceId", "FROM-ID", 0.9),
            ("InvoiceNumber", "FROM-NUMBER", 0.9),
        ]);
        let invoice = mapper().map(&raw);
        assert_eq!(invoice.invoice_number.as_deref(), Some("FROM-ID"));
    }

    #[test]
    fn blank_alias_falls_through_to_next() {
        let raw = raw_with(vec![
            ("InvoiceId", "   ", 0.9),
            ("InvoiceNumber", "INV-7", 0.9),
        ]);
        let invoice = mapper().map(&raw);
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-7"));
    }

    #[test]
    fn unparseable_values_leave_field_absent() {
        let raw = raw_with(vec![
            ("InvoiceDate", "sometime in March", 0.8),
            ("SubTotal", "n/a", 0.8),
        ]);
        let invoice = mapper().map(&raw);
        assert!(invoice.invoice_date.is_none());
        assert!(invoice.subtotal.is_none());
        assert!(!invoice.field_confidence.contains_key("invoice_date"));
        assert!(!invoice.field_confidence.contains_key("subtotal"));
    }

    #[test]
    fn currency_symbol_normalized() {
        let raw = raw_with(vec![("CurrencyCode", "C$", 0.9)]);
        let invoice = mapper().map(&raw);
        assert_eq!(invoice.currency.as_deref(), Some("CAD"));
    }

    #[test]
    fn vendor_address_composed_from_subfields() {
        let raw = raw_with(vec![
            ("VendorAddressStreet", "12 Main St", 0.95),
            ("VendorAddressCity", "Springfield", 0.90),
            ("VendorAddressState", "IL", 0.85),
        ]);
        let invoice = mapper().map(&raw);
        let addr = invoice.vendor_address.expect("vendor address");
        assert_eq!(addr.street.as_deref(), Some("12 Main St"));
        assert_eq!(addr.city.as_deref(), Some("Springfield"));
        assert!((invoice.field_confidence["vendor_address"] - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn billing_address_falls_back_to_customer_prefix() {
        let raw = raw_with(vec![
            ("CustomerAddressStreet", "9 Elm Ave", 0.9),
            ("CustomerAddressCity", "Portland", 0.9),
        ]);
        let invoice = mapper().map(&raw);
        let addr = invoice.billing_address.expect("billing address");
        assert_eq!(addr.street.as_deref(), Some("9 Elm Ave"));
    }

    #[test]
    fn derives_total_from_subtotal_and_tax() {
        let mut raw = raw_with(vec![
            ("SubTotal", "1150.00", 0.96),
            ("TotalTax", "100.00", 0.94),
        ]);
        raw.line_items = vec![RawLineItem {
            description: Some("Widget".into()),
            amount: Some("1150.00".into()),
            confidence: 0.9,
            ..RawLineItem::default()
        }];
        let invoice = mapper().map(&raw);
        assert_eq!(
            invoice.total_amount,
            Some(BigDecimal::from_str("1250.00").unwrap())
        );
        // Derived confidence is the minimum of the operands'.
        assert!((invoice.field_confidence["total_amount"] - 0.94).abs() < f32::EPSILON);
    }

    #[test]
    fn derives_subtotal_from_total_and_tax() {
        let mut raw = raw_with(vec![
            ("InvoiceTotal", "1250.00", 0.97),
            ("TotalTax", "100.00", 0.94),
        ]);
        raw.line_items = vec![RawLineItem {
            description: Some("Widget".into()),
            amount: Some("1150.00".into()),
            confidence: 0.9,
            ..RawLineItem::default()
        }];
        let invoice = mapper().map(&raw);
        assert_eq!(
            invoice.subtotal,
            Some(BigDecimal::from_str("1150.00").unwrap())
        );
    }

    #[test]
    fn no_derivation_when_result_would_be_negative() {
        let mut raw = raw_with(vec![
            ("SubTotal", "150.00", 0.96),
            ("InvoiceTotal", "100.00", 0.97),
        ]);
        raw.line_items = vec![RawLineItem {
            description: Some("Widget".into()),
            amount: Some("150.00".into()),
            confidence: 0.9,
            ..RawLineItem::default()
        }];
        let invoice = mapper().map(&raw);
        assert!(invoice.tax_amount.is_none());
        assert!(!invoice.field_confidence.contains_key("tax_amount"));
    }

    #[test]
    fn no_derivation_without_line_items() {
        let raw = raw_with(vec![
            ("SubTotal", "1150.00", 0.96),
            ("TotalTax", "100.00", 0.94),
        ]);
        let invoice = mapper().map(&raw);
        assert!(invoice.total_amount.is_none());
    }

    #[test]
    fn no_derivation_when_two_aggregates_missing() {
        let mut raw = raw_with(vec![("SubTotal", "1150.00", 0.96)]);
        raw.line_items = vec![RawLineItem {
            description: Some("Widget".into()),
            amount: Some("1150.00".into()),
            confidence: 0.9,
            ..RawLineItem::default()
        }];
        let invoice = mapper().map(&raw);
        assert!(invoice.total_amount.is_none());
        assert!(invoice.tax_amount.is_none());
    }

    #[test]
    fn tax_lines_fill_absent_tax_amount() {
        let mut raw = raw_with(vec![]);
        raw.line_items = vec![
            RawLineItem {
                description: Some("Widget".into()),
                amount: Some("100.00".into()),
                confidence: 0.9,
                ..RawLineItem::default()
            },
            RawLineItem {
                description: Some("GST 5%".into()),
                amount: Some("5.00".into()),
                confidence: 0.9,
                ..RawLineItem::default()
            },
        ];
        let invoice = mapper().map(&raw);
        assert_eq!(invoice.line_items.len(), 1);
        assert_eq!(
            invoice.tax_amount,
            Some(BigDecimal::from_str("5.00").unwrap())
        );
    }

    #[test]
    fn provider_tax_amount_not_overwritten_by_tax_lines() {
        let mut raw = raw_with(vec![("TotalTax", "12.00", 0.95)]);
        raw.line_items = vec![RawLineItem {
            description: Some("GST".into()),
            amount: Some("5.00".into()),
            confidence: 0.9,
            ..RawLineItem::default()
        }];
        let invoice = mapper().map(&raw);
        assert_eq!(
            invoice.tax_amount,
            Some(BigDecimal::from_str("12.00").unwrap())
        );
    }

    #[test]
    fn degraded_extraction_carries_error_through() {
        let raw = RawExtraction::failed("Provider unavailable (503)".to_string());
        let invoice = mapper().map(&raw);
        assert!(invoice.source_error.is_some());
        assert!(invoice.field_confidence.is_empty());
    }
}
