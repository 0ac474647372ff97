// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload normalization and attribute extraction.
//!
//! Remote payloads arrive with double-encoding quirks: string attributes
//! that are themselves JSON documents, and numbers that lost their integer
//! shape. Normalization makes attribute rows stable and diff-friendly.

use std::collections::HashSet;

use serde_json::Value;

use crate::store::LayerAttributeRow;

/// Recursively normalize a payload value.
///
/// A string whose trimmed content begins and ends with matching braces or
/// brackets is re-parsed; if parsing fails it stays a plain string.
/// Numbers regain integer shape when lossless.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if looks_like_json(trimmed) {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(parsed) => normalize(&parsed),
                    Err(_) => value.clone(),
                }
            } else {
                value.clone()
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), normalize(v))).collect())
        }
        Value::Number(n) => Value::Number(integer_shape(n)),
        other => other.clone(),
    }
}

fn looks_like_json(s: &str) -> bool {
    (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('[') && s.ends_with(']'))
}

fn integer_shape(n: &serde_json::Number) -> serde_json::Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }
    if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < (i64::MAX as f64) {
            return serde_json::Number::from(f as i64);
        }
    }
    n.clone()
}

/// Extract top-level attribute rows from a layer payload.
///
/// `changed` holds the attribute names the source system's change record
/// enumerates for this layer; matching is case-insensitive.
pub fn extract_attributes(payload: &str, changed: &HashSet<String>) -> Vec<LayerAttributeRow> {
    let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };
    let normalized = normalize(&parsed);
    let Value::Object(map) = normalized else {
        return Vec::new();
    };

    map.into_iter()
        .map(|(name, value)| {
            let is_changed = changed.iter().any(|c| c.eq_ignore_ascii_case(&name));
            attribute_row(name, &value, is_changed)
        })
        .collect()
}

fn attribute_row(name: String, value: &Value, is_changed: bool) -> LayerAttributeRow {
    let (type_tag, is_complex, formatted) = match value {
        Value::Null => ("null", false, String::new()),
        Value::Bool(b) => ("bool", false, b.to_string()),
        Value::Number(n) => ("number", false, n.to_string()),
        Value::String(s) => ("string", false, s.clone()),
        Value::Array(_) => ("array", true, compact(value)),
        Value::Object(_) => ("object", true, compact(value)),
    };
    LayerAttributeRow {
        name,
        formatted_value: formatted,
        raw_value: compact(value),
        type_tag: type_tag.to_string(),
        is_complex,
        is_changed,
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
