//! A sanitised, JSON-shaped dynamic value used for `Resource::raw_data` and
//! similar type-specific payload bags.
//!
//! This is deliberately a thin wrapper around [`serde_json::Value`] rather
//! than a hand-rolled tagged variant: the resource families a parser may
//! encounter are open-ended (anything the auto-detector falls through to
//! `generic/<prefix>` for), so the payload itself stays a dynamic map. The
//! type discrimination lives one level up, on `resource_type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length, in bytes, of any string leaf inside a sanitised
/// [`RawValue`]. Longer values are replaced with a truncation sentinel that
/// records the original length.
pub const MAX_STRING_LEN: usize = 1024;

/// A sanitised dynamic JSON value.
pub type RawValue = Value;

/// Recursively sanitise `value`, replacing any string leaf longer than
/// [`MAX_STRING_LEN`] bytes with a sentinel string of the form
/// `"<truncated: N bytes>"`.
///
/// This is the only place oversize strings are allowed to exist transiently;
/// anything kept in `raw_data` must have passed through this function.
pub fn sanitize_raw_value(value: Value) -> Value {
    match value {
        Value::String(s) if s.len() > MAX_STRING_LEN => {
            Value::String(format!("<truncated: {} bytes>", s.len()))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_raw_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_raw_value(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_strings_pass_through() {
        let value = json!({"name": "subnet-a"});
        assert_eq!(sanitize_raw_value(value.clone()), value);
    }

    #[test]
    fn oversize_string_is_truncated() {
        let long = "x".repeat(2000);
        let value = json!({"blob": long});
        let sanitized = sanitize_raw_value(value);
        let got = sanitized.get("blob").unwrap().as_str().unwrap();
        assert_eq!(got, "<truncated: 2000 bytes>");
    }

    #[test]
    fn sanitizes_nested_arrays_and_objects() {
        let long = "y".repeat(3000);
        let value = json!({"items": [{"data": long}]});
        let sanitized = sanitize_raw_value(value);
        let got = sanitized["items"][0]["data"].as_str().unwrap();
        assert!(got.starts_with("<truncated:"));
    }

    #[test]
    fn exactly_at_limit_is_untouched() {
        let exact = "z".repeat(MAX_STRING_LEN);
        let value = json!({"k": exact});
        let sanitized = sanitize_raw_value(value.clone());
        assert_eq!(sanitized, value);
    }
}
