//! Prompt construction for LLM field correction.

use crate::models::invoice::{Invoice, CANONICAL_FIELDS};

/// System prompt: role, vocabulary, and the output contract.
pub fn build_system_prompt() -> String {
    format!(
        "You are an invoice data extraction assistant. You are given text (and \
         sometimes page images) of a single invoice, plus a list of fields whose \
         extracted values are missing or unreliable.\n\
         \n\
         Respond with a single JSON object and nothing else. Keys must be taken \
         from this canonical field vocabulary:\n{}\n\
         \n\
         Rules:\n\
         - Include only the fields you were asked about.\n\
         - Omit any field you cannot determine from the document. Never guess.\n\
         - Dates must be formatted YYYY-MM-DD.\n\
         - Amounts and rates must be plain numbers without currency symbols or \
           thousands separators.\n\
         - Addresses must be a single line: street, city, region postal, country.",
        CANONICAL_FIELDS.join(", ")
    )
}

/// User prompt for one field group: the fields to fix with their current
/// values, followed by the document text truncated to the configured budget.
pub fn build_user_prompt(
    group_name: &str,
    fields: &[String],
    invoice: &Invoice,
    full_text: &str,
    max_prompt_chars: usize,
) -> String {
    let mut lines = Vec::with_capacity(fields.len());
    for field in fields {
        let current = invoice
            .get_field(field)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "<missing>".to_string());
        lines.push(format!("- {field} (currently: {current})"));
    }

    format!(
        "Correct the {group_name} fields of this invoice.\n\
         \n\
         Fields to determine:\n{}\n\
         \n\
         Document text:\n{}",
        lines.join("\n"),
        truncate_chars(full_text, max_prompt_chars)
    )
}

/// Truncate on a character boundary; byte slicing could split UTF-8.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_enumerates_vocabulary() {
        let prompt = build_system_prompt();
        for field in CANONICAL_FIELDS {
            assert!(prompt.contains(field), "missing {field}");
        }
        assert!(prompt.contains("YYYY-MM-DD"));
    }

    #[test]
    fn user_prompt_lists_fields_and_current_values() {
        let mut invoice = Invoice::new();
        invoice.set_field("invoice_number", "INV-9", "USD");

        let fields = vec!["invoice_number".to_string(), "invoice_date".to_string()];
        let prompt = build_user_prompt("header", &fields, &invoice, "Invoice INV-9 ...", 12_000);

        assert!(prompt.contains("- invoice_number (currently: INV-9)"));
        assert!(prompt.contains("- invoice_date (currently: <missing>)"));
        assert!(prompt.contains("Invoice INV-9 ..."));
    }

    #[test]
    fn document_text_truncated_to_budget() {
        let invoice = Invoice::new();
        let long_text = "x".repeat(50_000);
        let prompt = build_user_prompt(
            "header",
            &["invoice_number".to_string()],
            &invoice,
            &long_text,
            1_000,
        );
        let tail: String = prompt.chars().filter(|c| *c == 'x').collect();
        assert_eq!(tail.len(), 1_000);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(truncate_chars(&text, 4).chars().count(), 4);
        assert_eq!(truncate_chars(&text, 100), text.as_str());
    }
}
