//! Overall extraction confidence.
//!
//! A weighted blend over per-field confidences: fields that decide whether an
//! invoice is actionable carry 70% of the weight, everything else 30%. The
//! blend degrades gracefully when one side of the split is absent, and the
//! result is always clamped to [0, 1].

use std::collections::HashMap;

/// Fields whose presence and accuracy dominate the overall score.
pub const IMPORTANT_FIELDS: &[&str] = &[
    "invoice_number",
    "invoice_date",
    "total_amount",
    "vendor_name",
    "subtotal",
    "tax_amount",
];

const IMPORTANT_WEIGHT: f32 = 0.7;
const OTHER_WEIGHT: f32 = 0.3;

/// Compute the overall confidence from per-field confidences.
///
/// Only fields present in the map participate: an important field that never
/// mapped simply does not drag the mean down, because blank-field selection
/// for correction is handled separately. Fields outside the important set
/// additionally need a non-zero confidence to count. Fallbacks when a side
/// is empty: only important → their mean; only others → mean of everything
/// present; nothing → 0.0.
pub fn overall_confidence(field_confidence: &HashMap<String, f32>) -> f32 {
    let mut important = Vec::new();
    let mut other = Vec::new();

    for (name, &confidence) in field_confidence {
        if IMPORTANT_FIELDS.contains(&name.as_str()) {
            important.push(confidence);
        } else if confidence > 0.0 {
            other.push(confidence);
        }
    }

    let score = match (important.is_empty(), other.is_empty()) {
        (false, false) => IMPORTANT_WEIGHT * mean(&important) + OTHER_WEIGHT * mean(&other),
        (false, true) => mean(&important),
        (true, false) => {
            let all: Vec<f32> = field_confidence.values().copied().collect();
            mean(&all)
        }
        (true, true) => 0.0,
    };

    score.clamp(0.0, 1.0)
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
