//! Scalar parsers used by the canonical mapper: dates, monetary decimals,
//! and currency normalization. All of them return `Option` — unparseable
//! provider output never fails the pipeline, it just leaves the field absent.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate};

// ═══════════════════════════════════════════════════════════
// Dates
// ═══════════════════════════════════════════════════════════

/// Parse a date from ISO-8601 (with or without time component) or `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    // ISO datetime without offset, e.g. "2026-03-14T00:00:00"
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    None
}

// ═══════════════════════════════════════════════════════════
// Decimals
// ═══════════════════════════════════════════════════════════

/// Parse a monetary or rate value, tolerating currency symbols, ISO code
/// prefixes/suffixes, thousands separators, percent signs, and accounting
/// negatives like "(45.00)".
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let negative_parens = trimmed.starts_with('(') && trimmed.ends_with(')');
    let inner = if negative_parens {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    let cleaned: String = inner
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    // "CAD 1.234,56"-style input is out of scope for the filter above only
    // when commas were decimal separators; providers emit dot decimals.
    let mut value = BigDecimal::from_str(&cleaned).ok()?;
    if negative_parens {
        value = -value;
    }
    Some(value)
}

// ═══════════════════════════════════════════════════════════
// Currency
// ═══════════════════════════════════════════════════════════

/// Symbol/alias → ISO 4217 lookup.
const CURRENCY_ALIASES: &[(&str, &str)] = &[
    ("$", "USD"),
    ("US$", "USD"),
    ("USD$", "USD"),
    ("DOLLAR", "USD"),
    ("DOLLARS", "USD"),
    ("C$", "CAD"),
    ("CA$", "CAD"),
    ("CAD$", "CAD"),
    ("€", "EUR"),
    ("EURO", "EUR"),
    ("EUROS", "EUR"),
    ("£", "GBP"),
    ("POUND", "GBP"),
    ("POUNDS", "GBP"),
    ("¥", "JPY"),
    ("YEN", "JPY"),
    ("A$", "AUD"),
    ("AU$", "AUD"),
    ("MX$", "MXN"),
    ("CHF", "CHF"),
    ("KR", "SEK"),
];

/// Normalize currency text to an ISO 4217 code.
///
/// Known symbols and aliases map through the table; an unrecognized 3-letter
/// alphabetic token passes through uppercased; anything else falls back to
/// `default_currency`.
pub fn normalize_currency(raw: &str, default_currency: &str) -> String {
    let token = raw.trim();
    if token.is_empty() {
        return default_currency.to_string();
    }

    let upper = token.to_uppercase();
    for (alias, code) in CURRENCY_ALIASES {
        if upper == *alias {
            return (*code).to_string();
        }
    }

    if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
        return upper;
    }

    default_currency.to_string()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_iso_date() {
        assert_eq!(
            parse_date("2026-03-14"),
            Some(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
        );
    }

    #[test]
    fn parses_rfc3339_datetime() {
        assert_eq!(
            parse_date("2026-03-14T09:30:00Z"),
            Some(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
        );
        assert_eq!(
            parse_date("2026-03-14T09:30:00+02:00"),
            Some(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
        );
    }

    #[test]
    fn parses_naive_datetime() {
        assert_eq!(
            parse_date("2026-03-14T00:00:00"),
            Some(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
        );
    }

    #[test]
    fn bad_dates_yield_none() {
        assert_eq!(parse_date("14/03/2026"), None);
        assert_eq!(parse_date("March 14, 2026"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2026-13-45"), None);
    }

    #[test]
    fn parses_decimal_with_symbols_and_separators() {
        assert_eq!(
            parse_decimal("$1,234.56"),
            Some(BigDecimal::from_str("1234.56").unwrap())
        );
        assert_eq!(
            parse_decimal("CAD 2,000.00"),
            Some(BigDecimal::from_str("2000.00").unwrap())
        );
        assert_eq!(
            parse_decimal("€99.90"),
            Some(BigDecimal::from_str("99.90").unwrap())
        );
        assert_eq!(parse_decimal("5%"), Some(BigDecimal::from(5)));
    }

    #[test]
    fn parses_accounting_negative() {
        assert_eq!(
            parse_decimal("(45.00)"),
            Some(BigDecimal::from_str("-45.00").unwrap())
        );
        assert_eq!(
            parse_decimal("-45.00"),
            Some(BigDecimal::from_str("-45.00").unwrap())
        );
    }

    #[test]
    fn invalid_decimals_yield_none() {
        assert_eq!(parse_decimal("N/A"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("TBD"), None);
        assert_eq!(parse_decimal("1.2.3"), None);
    }

    #[test]
    fn currency_symbols_map_to_iso() {
        assert_eq!(normalize_currency("$", "USD"), "USD");
        assert_eq!(normalize_currency("€", "USD"), "EUR");
        assert_eq!(normalize_currency("£", "USD"), "GBP");
        assert_eq!(normalize_currency("C$", "USD"), "CAD");
    }

    #[test]
    fn three_letter_codes_pass_through_uppercased() {
        assert_eq!(normalize_currency("nok", "USD"), "NOK");
        assert_eq!(normalize_currency("Cad", "USD"), "CAD");
    }

    #[test]
    fn unknown_text_falls_back_to_default() {
        assert_eq!(normalize_currency("local money", "USD"), "USD");
        assert_eq!(normalize_currency("1234", "CAD"), "CAD");
        assert_eq!(normalize_currency("", "EUR"), "EUR");
    }
}
