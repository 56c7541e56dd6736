//! Strict validation helpers for untrusted model output.
//!
//! serde enforces the shape; these functions enforce the ranges. Any
//! violation becomes `ScreeningError::Schema`, a content failure.

use std::collections::BTreeMap;

use crate::screening::models::ConfidenceMap;
use crate::screening::ScreeningError;

/// Placeholder strings models emit instead of leaving a field empty.
const ABSENT_MARKERS: &[&str] = &["", "n/a", "na", "none", "null", "not mentioned", "not specified", "unknown"];

/// Validates a confidence mapping: every value must lie in [0, 100] and every
/// `required` key must be present. Fractional values are rounded.
pub fn validate_confidence(
    raw: &BTreeMap<String, f64>,
    required: &[&str],
) -> Result<ConfidenceMap, ScreeningError> {
    for key in required {
        if !raw.contains_key(*key) {
            return Err(ScreeningError::Schema(format!(
                "confidence for '{key}' is missing"
            )));
        }
    }

    raw.iter()
        .map(|(field, &value)| {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ScreeningError::Schema(format!(
                    "confidence for '{field}' is {value}, outside 0-100"
                )));
            }
            Ok((field.clone(), value.round() as u8))
        })
        .collect()
}

/// Validates a score component against its ceiling and rounds it.
pub fn validate_points(value: f64, max: u32, field: &str) -> Result<u32, ScreeningError> {
    if !value.is_finite() || value < 0.0 || value.round() > f64::from(max) {
        return Err(ScreeningError::Schema(format!(
            "{field} is {value}, outside 0-{max}"
        )));
    }
    Ok(value.round() as u32)
}

/// Trims a free-text field, mapping placeholder answers to `None`.
pub fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !ABSENT_MARKERS.contains(&v.to_lowercase().as_str()))
}

/// Trims entries, drops blanks and case-insensitive duplicates, keeps order.
pub fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_lowercase()))
        .collect()
}
