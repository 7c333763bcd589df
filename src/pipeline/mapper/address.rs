//! Address composition from structured provider sub-fields, plus a loose
//! single-line parser for human/LLM-supplied corrections.

use std::collections::HashMap;

use crate::models::invoice::Address;
use crate::pipeline::gateway::RawField;

/// Compose an address from `{prefix}*` provider sub-fields.
///
/// Street resolution falls back from a dedicated street field to
/// house number + road. Returns the address and the minimum confidence of
/// the sub-fields consumed; `None` when no sub-field is present.
pub fn compose_address(
    fields: &HashMap<String, RawField>,
    prefix: &str,
) -> Option<(Address, f32)> {
    let mut confidence = f32::MAX;
    let mut any = false;

    let mut take = |names: &[String]| -> Option<String> {
        for name in names {
            if let Some(field) = fields.get(name) {
                let value = field.value.trim();
                if !value.is_empty() {
                    confidence = confidence.min(field.confidence);
                    any = true;
                    return Some(value.to_string());
                }
            }
        }
        None
    };

    let street = take(&[
        format!("{prefix}AddressStreet"),
        format!("{prefix}Street"),
    ])
    .or_else(|| {
        let house = take(&[format!("{prefix}HouseNumber")]);
        let road = take(&[format!("{prefix}Road")]);
        match (house, road) {
            (Some(h), Some(r)) => Some(format!("{h} {r}")),
            (None, Some(r)) => Some(r),
            (Some(h), None) => Some(h),
            (None, None) => None,
        }
    });
    let city = take(&[format!("{prefix}AddressCity"), format!("{prefix}City")]);
    let region = take(&[
        format!("{prefix}AddressState"),
        format!("{prefix}Region"),
        format!("{prefix}State"),
    ]);
    let postal_code = take(&[
        format!("{prefix}AddressPostalCode"),
        format!("{prefix}PostalCode"),
    ]);
    let country = take(&[
        format!("{prefix}AddressCountry"),
        format!("{prefix}Country"),
    ]);

    let address = Address {
        street,
        city,
        region,
        postal_code,
        country,
    };

    if any && !address.is_empty() {
        Some((address, confidence))
    } else {
        // Flat single-field fallback, e.g. "VendorAddress".
        let flat = fields.get(&format!("{prefix}Address"))?;
        let parsed = parse_loose_address(&flat.value);
        if parsed.is_empty() {
            None
        } else {
            Some((parsed, flat.confidence))
        }
    }
}

/// Parse a single-line address of the form
/// "street, city, region postal, country". Segments beyond the recognized
/// four are folded into the country. Used for LLM and reviewer corrections.
pub fn parse_loose_address(raw: &str) -> Address {
    let segments: Vec<&str> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let mut address = Address::default();
    match segments.len() {
        0 => {}
        1 => address.street = Some(segments[0].to_string()),
        2 => {
            address.street = Some(segments[0].to_string());
            address.city = Some(segments[1].to_string());
        }
        _ => {
            address.street = Some(segments[0].to_string());
            address.city = Some(segments[1].to_string());
            split_region_postal(segments[2], &mut address);
            if segments.len() > 3 {
                address.country = Some(segments[3..].join(", "));
            }
        }
    }
    address
}

/// "IL 62704" → region IL, postal 62704. A trailing token containing a digit
/// is taken as the postal code; everything before it is the region.
fn split_region_postal(segment: &str, address: &mut Address) {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    if tokens.len() >= 2 && tokens[tokens.len() - 1].chars().any(|c| c.is_ascii_digit()) {
        address.region = Some(tokens[..tokens.len() - 1].join(" "));
        address.postal_code = Some(tokens[tokens.len() - 1].to_string());
    } else if !tokens.is_empty() {
        address.region = Some(tokens.join(" "));
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
