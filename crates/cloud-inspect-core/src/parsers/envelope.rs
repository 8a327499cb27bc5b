//! Envelope unwrapping, key normalisation, and the common-field mapping
//! shared by every family parser.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use cloud_inspect_types::{sanitize_raw_value, ParsedResource, MAX_STRING_LEN};

/// Unwrap one of the recognised envelope shapes into a flat list of items.
/// Anything that is neither object nor array yields an empty list rather
/// than an error — ingestion never raises on malformed input.
pub fn unwrap_envelope(json: Value) -> Vec<Value> {
    match json {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Object(mut inner)) => match inner.remove("items") {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(inner)],
            },
            Some(other) => vec![other],
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

fn kebab_to_camel(key: &str) -> String {
    if !key.contains('-') {
        return key.to_string();
    }
    let mut out = String::with_capacity(key.len());
    let mut capitalize_next = false;
    for ch in key.chars() {
        if ch == '-' {
            capitalize_next = true;
            continue;
        }
        if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Recursively rewrite kebab-case object keys to camelCase.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(kebab_to_camel(&k), normalize_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Read a field by any of `camelCase`, `snake_case`, or `kebab-case` spelling
/// (top-level fields only — nested payloads are always normalised to
/// camelCase by [`normalize_keys`] before this is called).
fn get_any<'a>(item: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| item.get(n))
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Compute a stable synthetic OCID for a record with no `id`/`ocid` field,
/// derived from name/namespace/compartment when present, else from the
/// whole item.
pub fn synthetic_ocid(resource_type: &str, item: &Value) -> String {
    let mut hasher = Sha256::new();
    let name = get_any(item, &["displayName", "display_name", "name"])
        .and_then(as_string)
        .unwrap_or_default();
    let namespace = get_any(item, &["namespace"]).and_then(as_string).unwrap_or_default();
    let compartment = get_any(item, &["compartmentId", "compartment_id"])
        .and_then(as_string)
        .unwrap_or_default();

    if name.is_empty() && namespace.is_empty() && compartment.is_empty() {
        hasher.update(serde_json::to_vec(item).unwrap_or_default());
    } else {
        hasher.update(name.as_bytes());
        hasher.update(b"|");
        hasher.update(namespace.as_bytes());
        hasher.update(b"|");
        hasher.update(compartment.as_bytes());
    }

    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    let family = resource_type.replace('/', ".");
    format!("synthetic.{family}.{hex}")
}

/// Map one already-typed, already-key-normalised item into a
/// [`ParsedResource`].
pub fn parse_common(resource_type: &str, item: Value) -> ParsedResource {
    let item = normalize_keys(item);

    let ocid = get_any(&item, &["id", "ocid"])
        .and_then(as_string)
        .unwrap_or_else(|| synthetic_ocid(resource_type, &item));

    let display_name = get_any(&item, &["displayName", "name"]).and_then(as_string);
    let compartment_id = get_any(&item, &["compartmentId"]).and_then(as_string);
    let lifecycle_state = get_any(&item, &["lifecycleState", "state"]).and_then(as_string);
    let availability_domain = get_any(&item, &["availabilityDomain"]).and_then(as_string);
    let region_key = get_any(&item, &["regionKey", "region"]).and_then(as_string);
    let time_created = get_any(&item, &["timeCreated"])
        .and_then(as_string)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let defined_tags = item
        .get("definedTags")
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    let freeform_tags = item
        .get("freeformTags")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    // Captured before sanitisation truncates it in raw_data, so audit rules
    // that need the full content can still reach it via a blob lookup.
    let user_data_blob = item
        .get("userData")
        .and_then(Value::as_str)
        .filter(|s| s.len() > MAX_STRING_LEN)
        .map(str::to_string);

    let raw_data = sanitize_raw_value(item);

    ParsedResource {
        ocid,
        resource_type: resource_type.to_string(),
        display_name,
        compartment_id,
        lifecycle_state,
        availability_domain,
        region_key,
        time_created,
        defined_tags,
        freeform_tags,
        raw_data,
        user_data_blob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_data_array() {
        let json = json!({"data": [{"id": "a"}, {"id": "b"}]});
        let items = unwrap_envelope(json);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn unwraps_data_items() {
        let json = json!({"data": {"items": [{"id": "a"}]}});
        let items = unwrap_envelope(json);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn unwraps_data_object() {
        let json = json!({"data": {"id": "a"}});
        let items = unwrap_envelope(json);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "a");
    }

    #[test]
    fn unwraps_bare_array() {
        let json = json!([{"id": "a"}]);
        assert_eq!(unwrap_envelope(json).len(), 1);
    }

    #[test]
    fn unwraps_bare_object() {
        let json = json!({"id": "a"});
        assert_eq!(unwrap_envelope(json).len(), 1);
    }

    #[test]
    fn unrecognised_scalar_yields_empty() {
        let json = json!("just a string");
        assert!(unwrap_envelope(json).is_empty());
    }

    #[test]
    fn normalizes_kebab_keys_recursively() {
        let value = json!({"display-name": "x", "nested": {"cidr-block": "10.0.0.0/24"}});
        let normalized = normalize_keys(value);
        assert_eq!(normalized["displayName"], "x");
        assert_eq!(normalized["nested"]["cidrBlock"], "10.0.0.0/24");
    }

    #[test]
    fn synthetic_ocid_is_stable() {
        let item = json!({"displayName": "bucket-a", "namespace": "ns1", "compartmentId": "c1"});
        let a = synthetic_ocid("storage/bucket", &item);
        let b = synthetic_ocid("storage/bucket", &item);
        assert_eq!(a, b);
        assert!(a.starts_with("synthetic.storage.bucket."));
    }

    #[test]
    fn parse_common_extracts_fields() {
        let item = json!({
            "id": "ocid1.instance.oc1..abc",
            "display-name": "web-1",
            "compartment-id": "ocid1.compartment.oc1..x",
            "lifecycle-state": "RUNNING",
        });
        let parsed = parse_common("compute/instance", item);
        assert_eq!(parsed.ocid, "ocid1.instance.oc1..abc");
        assert_eq!(parsed.display_name.as_deref(), Some("web-1"));
        assert_eq!(parsed.lifecycle_state.as_deref(), Some("RUNNING"));
    }

    #[test]
    fn parse_common_synthesizes_missing_id() {
        let item = json!({"displayName": "no-id-here"});
        let parsed = parse_common("generic/thing", item);
        assert!(parsed.ocid.starts_with("synthetic.generic.thing."));
    }

    #[test]
    fn parse_common_captures_oversize_user_data_as_blob() {
        let long = "echo hi; ".repeat(200);
        let item = json!({"id": "ocid1.instance.oc1..abc", "userData": long.clone()});
        let parsed = parse_common("compute/instance", item);
        assert_eq!(parsed.user_data_blob.as_deref(), Some(long.as_str()));
        assert!(parsed.raw_data["userData"].as_str().unwrap().starts_with("<truncated:"));
    }

    #[test]
    fn parse_common_leaves_short_user_data_blob_empty() {
        let item = json!({"id": "ocid1.instance.oc1..abc", "userData": "short script"});
        let parsed = parse_common("compute/instance", item);
        assert!(parsed.user_data_blob.is_none());
    }
}
