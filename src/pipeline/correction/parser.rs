//! Extraction of the correction JSON from raw LLM output.
//!
//! Models wrap the object in markdown fences, prefix it with prose, or emit
//! it bare. The parser tolerates all three but insists on exactly one JSON
//! object with scalar values.

use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No JSON object found in response")]
    NoJson,
    #[error("Response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Response object contains no usable corrections")]
    Empty,
}

/// Parse an LLM response into field name → corrected value text.
///
/// String values are kept verbatim; numbers and booleans are stringified.
/// Nulls, arrays, and nested objects are skipped — a field the model could
/// not determine must simply be absent.
pub fn parse_correction_response(raw: &str) -> Result<HashMap<String, String>, ParseError> {
    let json_text = extract_json_object(raw).ok_or(ParseError::NoJson)?;

    let value: Value =
        serde_json::from_str(json_text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NoJson)?;

    let mut corrections = HashMap::new();
    for (key, value) in object {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            corrections.insert(key.clone(), text);
        }
    }

    if corrections.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(corrections)
}

/// The JSON object within the response: fenced block first, then the
/// outermost brace span.
fn extract_json_object(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let after = &raw[start + 7..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if !inner.is_empty() {
                return Some(inner);
            }
        }
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        Some(&raw[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_object() {
        let out = parse_correction_response(r#"{"invoice_number": "INV-7", "subtotal": "100.00"}"#)
            .unwrap();
        assert_eq!(out["invoice_number"], "INV-7");
        assert_eq!(out["subtotal"], "100.00");
    }

    #[test]
    fn parses_fenced_object() {
        let raw = "Here you go:\n```json\n{\"vendor_name\": \"Acme Corp\"}\n```\nDone.";
        let out = parse_correction_response(raw).unwrap();
        assert_eq!(out["vendor_name"], "Acme Corp");
    }

    #[test]
    fn parses_object_embedded_in_prose() {
        let raw = "The corrected fields are {\"due_date\": \"2026-04-01\"} as requested.";
        let out = parse_correction_response(raw).unwrap();
        assert_eq!(out["due_date"], "2026-04-01");
    }

    #[test]
    fn numbers_and_bools_stringified() {
        let out = parse_correction_response(r#"{"subtotal": 1150.5, "flag": true}"#).unwrap();
        assert_eq!(out["subtotal"], "1150.5");
        assert_eq!(out["flag"], "true");
    }

    #[test]
    fn nulls_and_nested_values_skipped() {
        let raw = r#"{"invoice_number": "INV-7", "due_date": null, "items": [1, 2]}"#;
        let out = parse_correction_response(raw).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("invoice_number"));
    }

    #[test]
    fn no_json_is_an_error() {
        assert!(matches!(
            parse_correction_response("I cannot determine any fields."),
            Err(ParseError::NoJson)
        ));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            parse_correction_response(r#"{"invoice_number": }"#),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn empty_object_is_an_error() {
        assert!(matches!(
            parse_correction_response("{}"),
            Err(ParseError::Empty)
        ));
        assert!(matches!(
            parse_correction_response(r#"{"a": null}"#),
            Err(ParseError::Empty)
        ));
    }

    #[test]
    fn whitespace_only_values_dropped() {
        let raw = r#"{"vendor_name": "   ", "customer_name": "Globex"}"#;
        let out = parse_correction_response(raw).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["customer_name"], "Globex");
    }
}
