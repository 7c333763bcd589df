//! Provider field-name alias table.
//!
//! Each canonical field can be fed by one or more provider field names;
//! lookup takes the first alias present in the raw result. Address fields are
//! composed from sub-fields instead (see `address.rs`) and are not listed
//! here.

/// Canonical field → provider aliases, in lookup priority order.
pub const FIELD_ALIASES: &[(&str, &[&str])] = &[
    // header
    ("invoice_number", &["InvoiceId", "InvoiceNumber"]),
    ("invoice_date", &["InvoiceDate"]),
    ("due_date", &["DueDate", "PaymentDueDate"]),
    ("order_date", &["OrderDate"]),
    ("delivery_date", &["DeliveryDate"]),
    ("purchase_order", &["PurchaseOrder", "PurchaseOrderNumber"]),
    ("payment_terms", &["PaymentTerm", "PaymentTerms"]),
    ("currency", &["CurrencyCode", "Currency"]),
    ("invoice_type", &["InvoiceType"]),
    ("reference_number", &["ReferenceNumber", "CustomerReference"]),
    ("service_start_date", &["ServiceStartDate"]),
    ("service_end_date", &["ServiceEndDate"]),
    // vendor
    ("vendor_name", &["VendorName"]),
    ("vendor_tax_id", &["VendorTaxId"]),
    ("vendor_phone", &["VendorPhoneNumber", "VendorPhone"]),
    ("vendor_fax", &["VendorFax"]),
    ("vendor_email", &["VendorEmail"]),
    ("vendor_website", &["VendorWebsite", "Website"]),
    // customer
    ("customer_name", &["CustomerName", "BillTo"]),
    ("customer_id", &["CustomerId"]),
    ("customer_tax_id", &["CustomerTaxId"]),
    ("customer_contact", &["CustomerContact"]),
    ("customer_phone", &["CustomerPhoneNumber", "CustomerPhone"]),
    ("customer_email", &["CustomerEmail"]),
    // financial
    ("subtotal", &["SubTotal", "Subtotal"]),
    ("tax_amount", &["TotalTax", "TaxAmount"]),
    ("gst_amount", &["GstAmount", "GST"]),
    ("pst_amount", &["PstAmount", "PST"]),
    ("qst_amount", &["QstAmount", "QST"]),
    ("gst_rate", &["GstRate"]),
    ("pst_rate", &["PstRate"]),
    ("qst_rate", &["QstRate"]),
    ("tax_rate", &["TaxRate"]),
    ("shipping", &["ShippingCost", "Freight"]),
    ("handling", &["HandlingFee", "Handling"]),
    ("discount", &["Discount", "TotalDiscount"]),
    ("total_amount", &["InvoiceTotal", "TotalAmount"]),
    ("amount_due", &["AmountDue", "BalanceDue"]),
    ("previous_balance", &["PreviousUnpaidBalance", "PreviousBalance"]),
    ("amount_paid", &["AmountPaid"]),
    // misc
    ("account_number", &["AccountNumber"]),
    ("notes", &["Note", "Remarks"]),
];
