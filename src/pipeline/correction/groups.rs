//! Field groups for targeted correction.
//!
//! Low-confidence fields are corrected one group at a time: smaller prompts,
//! and one group failing cannot poison the others. Declaration order is
//! execution order. `notes` is deliberately absent — free text has no wrong
//! answer worth an LLM round trip.

/// Group name → member canonical fields.
pub const FIELD_GROUPS: &[(&str, &[&str])] = &[
    (
        "header",
        &[
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
        ],
    ),
    (
        "vendor",
        &[
            "vendor_name",
            "vendor_tax_id",
            "vendor_phone",
            "vendor_fax",
            "vendor_email",
            "vendor_website",
            "account_number",
        ],
    ),
    (
        "customer",
        &[
            "customer_name",
            "customer_id",
            "customer_tax_id",
            "customer_contact",
            "customer_phone",
            "customer_email",
        ],
    ),
    (
        "addresses",
        &[
            "vendor_address",
            "billing_address",
            "shipping_address",
            "remittance_address",
        ],
    ),
    (
        "financial",
        &[
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
        ],
    ),
];
