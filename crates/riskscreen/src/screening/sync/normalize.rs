//! Value normalization for outgoing payloads.

use crate::screening::schema::{FieldMapping, ValueType};

/// Affirmative answers: the literal "Yes" or "true", case-insensitive.
pub fn is_affirmative(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "yes" | "true")
}

pub fn is_negative(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "no" | "false")
}

/// Normalizes a raw answer into the string the platform expects for the
/// mapped field, or `None` when the field must be omitted entirely.
///
/// TRUE_ONLY fields are present with "true" or absent, never "false".
pub fn normalize_value(mapping: &FieldMapping, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match mapping.value_type {
        ValueType::TrueOnly => is_affirmative(trimmed).then(|| "true".to_string()),
        ValueType::Boolean => Some(if is_affirmative(trimmed) {
            "true".to_string()
        } else {
            "false".to_string()
        }),
        ValueType::OptionSet => Some(mapping.resolve_option(trimmed)),
        ValueType::Text | ValueType::Number | ValueType::Date => Some(trimmed.to_string()),
    }
}
