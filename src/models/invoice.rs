//! Canonical invoice record.
//!
//! The provider's raw output is normalized into this schema by the mapper;
//! every downstream stage (confidence, correction, validation, review) works
//! against canonical field names only. Fields are optional across the board —
//! absence means the provider did not produce the field and no correction
//! recovered it.

use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ProcessingState;
use crate::pipeline::mapper::address::parse_loose_address;
use crate::pipeline::mapper::parse::{normalize_currency, parse_date, parse_decimal};

// ═══════════════════════════════════════════════════════════
// Canonical field vocabulary
// ═══════════════════════════════════════════════════════════

/// Every canonical field name, in schema order. This is the vocabulary the
/// correction prompt enumerates and the review API accepts.
pub const CANONICAL_FIELDS: &[&str] = &[
    // header
    "invoice_number",
    "invoice_date",
    "due_date",
    "order_date",
    "delivery_date",
    "purchase_order",
    "payment_terms",
    "currency",
    "invoice_type",
    "reference_number",
    "service_start_date",
    "service_end_date",
    // vendor
    "vendor_name",
    "vendor_tax_id",
    "vendor_phone",
    "vendor_fax",
    "vendor_email",
    "vendor_website",
    "vendor_address",
    // customer
    "customer_name",
    "customer_id",
    "customer_tax_id",
    "customer_contact",
    "customer_phone",
    "customer_email",
    "billing_address",
    "shipping_address",
    "remittance_address",
    // financial
    "subtotal",
    "tax_amount",
    "gst_amount",
    "pst_amount",
    "qst_amount",
    "gst_rate",
    "pst_rate",
    "qst_rate",
    "tax_rate",
    "shipping",
    "handling",
    "discount",
    "total_amount",
    "amount_due",
    "previous_balance",
    "amount_paid",
    // misc
    "account_number",
    "notes",
];

/// Monetary comparison tolerance shared by the mapper and the validator.
pub fn money_tolerance() -> BigDecimal {
    BigDecimal::from_str("0.01").unwrap_or_else(|_| BigDecimal::from(0))
}

/// Two monetary values agree when they differ by at most 0.01.
pub fn within_money_tolerance(a: &BigDecimal, b: &BigDecimal) -> bool {
    (a - b).abs() <= money_tolerance()
}

// ═══════════════════════════════════════════════════════════
// Address
// ═══════════════════════════════════════════════════════════

/// A postal address composed from structured provider sub-fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.city.is_none()
            && self.region.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
    }

    /// Single-line display form: "street, city, region postal, country".
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(s) = &self.street {
            parts.push(s.clone());
        }
        if let Some(c) = &self.city {
            parts.push(c.clone());
        }
        match (&self.region, &self.postal_code) {
            (Some(r), Some(p)) => parts.push(format!("{r} {p}")),
            (Some(r), None) => parts.push(r.clone()),
            (None, Some(p)) => parts.push(p.clone()),
            (None, None) => {}
        }
        if let Some(c) = &self.country {
            parts.push(c.clone());
        }
        parts.join(", ")
    }
}

// ═══════════════════════════════════════════════════════════
// LineItem
// ═══════════════════════════════════════════════════════════

/// One invoice line. `line_number` is 1-based and kept sequential — the
/// review controller resequences after deletions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_number: u32,
    pub description: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit_price: Option<BigDecimal>,
    pub amount: Option<BigDecimal>,
    pub gst: Option<BigDecimal>,
    pub pst: Option<BigDecimal>,
    pub qst: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub confidence: f32,
}

impl LineItem {
    pub fn new(line_number: u32) -> Self {
        Self {
            line_number,
            description: None,
            quantity: None,
            unit_price: None,
            amount: None,
            gst: None,
            pst: None,
            qst: None,
            tax_amount: None,
            confidence: 0.0,
        }
    }

    /// Whether amount agrees with quantity × unit_price (within 0.01).
    /// Vacuously true when any operand is absent.
    pub fn amount_consistent(&self) -> bool {
        match (&self.quantity, &self.unit_price, &self.amount) {
            (Some(q), Some(p), Some(a)) => within_money_tolerance(a, &(q * p)),
            _ => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Invoice
// ═══════════════════════════════════════════════════════════

/// The canonical invoice record produced by the pipeline and mutated only
/// through the review controller once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,

    // header
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub purchase_order: Option<String>,
    pub payment_terms: Option<String>,
    pub currency: Option<String>,
    pub invoice_type: Option<String>,
    pub reference_number: Option<String>,
    pub service_start_date: Option<NaiveDate>,
    pub service_end_date: Option<NaiveDate>,

    // vendor
    pub vendor_name: Option<String>,
    pub vendor_tax_id: Option<String>,
    pub vendor_phone: Option<String>,
    pub vendor_fax: Option<String>,
    pub vendor_email: Option<String>,
    pub vendor_website: Option<String>,
    pub vendor_address: Option<Address>,

    // customer
    pub customer_name: Option<String>,
    pub customer_id: Option<String>,
    pub customer_tax_id: Option<String>,
    pub customer_contact: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub remittance_address: Option<Address>,

    // financial
    pub subtotal: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub gst_amount: Option<BigDecimal>,
    pub pst_amount: Option<BigDecimal>,
    pub qst_amount: Option<BigDecimal>,
    pub gst_rate: Option<BigDecimal>,
    pub pst_rate: Option<BigDecimal>,
    pub qst_rate: Option<BigDecimal>,
    pub tax_rate: Option<BigDecimal>,
    pub shipping: Option<BigDecimal>,
    pub handling: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,
    pub total_amount: Option<BigDecimal>,
    pub amount_due: Option<BigDecimal>,
    pub previous_balance: Option<BigDecimal>,
    pub amount_paid: Option<BigDecimal>,

    // misc
    pub account_number: Option<String>,
    pub notes: Option<String>,

    pub line_items: Vec<LineItem>,
    /// Canonical field name → extraction confidence in [0,1].
    pub field_confidence: HashMap<String, f32>,
    pub extraction_confidence: f32,
    pub processing_state: ProcessingState,
    /// Bumped by exactly 1 per accepted review submission.
    pub review_version: i64,
    /// Non-fatal aggregation warnings surfaced to reviewers.
    pub validation_warnings: Vec<String>,
    /// Provider failure reason when extraction degraded to zero confidence.
    pub source_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Invoice {
    pub fn new() -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            invoice_number: None,
            invoice_date: None,
            due_date: None,
            order_date: None,
            delivery_date: None,
            purchase_order: None,
            payment_terms: None,
            currency: None,
            invoice_type: None,
            reference_number: None,
            service_start_date: None,
            service_end_date: None,
            vendor_name: None,
            vendor_tax_id: None,
            vendor_phone: None,
            vendor_fax: None,
            vendor_email: None,
            vendor_website: None,
            vendor_address: None,
            customer_name: None,
            customer_id: None,
            customer_tax_id: None,
            customer_contact: None,
            customer_phone: None,
            customer_email: None,
            billing_address: None,
            shipping_address: None,
            remittance_address: None,
            subtotal: None,
            tax_amount: None,
            gst_amount: None,
            pst_amount: None,
            qst_amount: None,
            gst_rate: None,
            pst_rate: None,
            qst_rate: None,
            tax_rate: None,
            shipping: None,
            handling: None,
            discount: None,
            total_amount: None,
            amount_due: None,
            previous_balance: None,
            amount_paid: None,
            account_number: None,
            notes: None,
            line_items: Vec::new(),
            field_confidence: HashMap::new(),
            extraction_confidence: 0.0,
            processing_state: ProcessingState::Extracted,
            review_version: 0,
            validation_warnings: Vec::new(),
            source_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display form of a canonical field, `None` for unknown names.
    pub fn get_field(&self, name: &str) -> Option<String> {
        fn s(v: &Option<String>) -> Option<String> {
            v.clone()
        }
        fn d(v: &Option<NaiveDate>) -> Option<String> {
            v.map(|d| d.to_string())
        }
        fn m(v: &Option<BigDecimal>) -> Option<String> {
            v.as_ref().map(|d| d.to_string())
        }
        fn a(v: &Option<Address>) -> Option<String> {
            v.as_ref().map(|a| a.display())
        }

        match name {
            "invoice_number" => s(&self.invoice_number),
            "invoice_date" => d(&self.invoice_date),
            "due_date" => d(&self.due_date),
            "order_date" => d(&self.order_date),
            "delivery_date" => d(&self.delivery_date),
            "purchase_order" => s(&self.purchase_order),
            "payment_terms" => s(&self.payment_terms),
            "currency" => s(&self.currency),
            "invoice_type" => s(&self.invoice_type),
            "reference_number" => s(&self.reference_number),
            "service_start_date" => d(&self.service_start_date),
            "service_end_date" => d(&self.service_end_date),
            "vendor_name" => s(&self.vendor_name),
            "vendor_tax_id" => s(&self.vendor_tax_id),
            "vendor_phone" => s(&self.vendor_phone),
            "vendor_fax" => s(&self.vendor_fax),
            "vendor_email" => s(&self.vendor_email),
            "vendor_website" => s(&self.vendor_website),
            "vendor_address" => a(&self.vendor_address),
            "customer_name" => s(&self.customer_name),
            "customer_id" => s(&self.customer_id),
            "customer_tax_id" => s(&self.customer_tax_id),
            "customer_contact" => s(&self.customer_contact),
            "customer_phone" => s(&self.customer_phone),
            "customer_email" => s(&self.customer_email),
            "billing_address" => a(&self.billing_address),
            "shipping_address" => a(&self.shipping_address),
            "remittance_address" => a(&self.remittance_address),
            "subtotal" => m(&self.subtotal),
            "tax_amount" => m(&self.tax_amount),
            "gst_amount" => m(&self.gst_amount),
            "pst_amount" => m(&self.pst_amount),
            "qst_amount" => m(&self.qst_amount),
            "gst_rate" => m(&self.gst_rate),
            "pst_rate" => m(&self.pst_rate),
            "qst_rate" => m(&self.qst_rate),
            "tax_rate" => m(&self.tax_rate),
            "shipping" => m(&self.shipping),
            "handling" => m(&self.handling),
            "discount" => m(&self.discount),
            "total_amount" => m(&self.total_amount),
            "amount_due" => m(&self.amount_due),
            "previous_balance" => m(&self.previous_balance),
            "amount_paid" => m(&self.amount_paid),
            "account_number" => s(&self.account_number),
            "notes" => s(&self.notes),
            _ => None,
        }
    }

    /// A field is blank when absent or whitespace-only.
    pub fn field_is_blank(&self, name: &str) -> bool {
        self.get_field(name)
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
    }

    /// Parse and assign a canonical field from raw text.
    ///
    /// Returns false for unknown field names and for values the field's type
    /// rejects (bad dates, non-numeric amounts, empty addresses) — callers
    /// treat false as "correction not applied".
    pub fn set_field(&mut self, name: &str, raw_value: &str, default_currency: &str) -> bool {
        let raw_value = raw_value.trim();
        if raw_value.is_empty() {
            return false;
        }

        // String fields assign verbatim.
        macro_rules! set_str {
            ($field:ident) => {{
                self.$field = Some(raw_value.to_string());
                true
            }};
        }
        // Typed fields only assign on a successful parse.
        macro_rules! set_date {
            ($field:ident) => {{
                match parse_date(raw_value) {
                    Some(d) => {
                        self.$field = Some(d);
                        true
                    }
                    None => false,
                }
            }};
        }
        macro_rules! set_money {
            ($field:ident) => {{
                match parse_decimal(raw_value) {
                    Some(d) => {
                        self.$field = Some(d);
                        true
                    }
                    None => false,
                }
            }};
        }
        macro_rules! set_addr {
            ($field:ident) => {{
                let addr = parse_loose_address(raw_value);
                if addr.is_empty() {
                    false
                } else {
                    self.$field = Some(addr);
                    true
                }
            }};
        }

        match name {
            "invoice_number" => set_str!(invoice_number),
            "invoice_date" => set_date!(invoice_date),
            "due_date" => set_date!(due_date),
            "order_date" => set_date!(order_date),
            "delivery_date" => set_date!(delivery_date),
            "purchase_order" => set_str!(purchase_order),
            "payment_terms" => set_str!(payment_terms),
            "currency" => {
                self.currency = Some(normalize_currency(raw_value, default_currency));
                true
            }
            "invoice_type" => set_str!(invoice_type),
            "reference_number" => set_str!(reference_number),
            "service_start_date" => set_date!(service_start_date),
            "service_end_date" => set_date!(service_end_date),
            "vendor_name" => set_str!(vendor_name),
            "vendor_tax_id" => set_str!(vendor_tax_id),
            "vendor_phone" => set_str!(vendor_phone),
            "vendor_fax" => set_str!(vendor_fax),
            "vendor_email" => set_str!(vendor_email),
            "vendor_website" => set_str!(vendor_website),
            "vendor_address" => set_addr!(vendor_address),
            "customer_name" => set_str!(customer_name),
            "customer_id" => set_str!(customer_id),
            "customer_tax_id" => set_str!(customer_tax_id),
            "customer_contact" => set_str!(customer_contact),
            "customer_phone" => set_str!(customer_phone),
            "customer_email" => set_str!(customer_email),
            "billing_address" => set_addr!(billing_address),
            "shipping_address" => set_addr!(shipping_address),
            "remittance_address" => set_addr!(remittance_address),
            "subtotal" => set_money!(subtotal),
            "tax_amount" => set_money!(tax_amount),
            "gst_amount" => set_money!(gst_amount),
            "pst_amount" => set_money!(pst_amount),
            "qst_amount" => set_money!(qst_amount),
            "gst_rate" => set_money!(gst_rate),
            "pst_rate" => set_money!(pst_rate),
            "qst_rate" => set_money!(qst_rate),
            "tax_rate" => set_money!(tax_rate),
            "shipping" => set_money!(shipping),
            "handling" => set_money!(handling),
            "discount" => set_money!(discount),
            "total_amount" => set_money!(total_amount),
            "amount_due" => set_money!(amount_due),
            "previous_balance" => set_money!(previous_balance),
            "amount_paid" => set_money!(amount_paid),
            "account_number" => set_str!(account_number),
            "notes" => set_str!(notes),
            _ => false,
        }
    }
}

impl Default for Invoice {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
