//! Parser set and auto-detector (spec §4.2).
//!
//! `parse_resources` is the single public entry point: unwrap the envelope,
//! detect a resource type once against the first element of a homogeneous
//! array, then map every element through [`envelope::parse_common`].

mod detect;
mod envelope;

use serde_json::Value;

use cloud_inspect_types::ParsedResource;

pub use envelope::{normalize_keys, synthetic_ocid, unwrap_envelope};

fn item_ocid(item: &Value) -> Option<&str> {
    item.get("id")
        .or_else(|| item.get("ocid"))
        .and_then(Value::as_str)
}

/// Resolve a resource type for one item: signature checks first, then the
/// OCID-prefix fallback, then the generic catch-all.
fn detect_resource_type(item: &Value) -> String {
    if let Some(ty) = detect::detect_by_signature(item) {
        return ty.to_string();
    }
    if let Some(ocid) = item_ocid(item) {
        if let Some(ty) = detect::detect_by_ocid_prefix(ocid) {
            return ty.to_string();
        }
    }
    detect::generic_type_for(item_ocid(item))
}

/// Parse a raw export payload into normalised resources.
///
/// `explicit_type` bypasses auto-detection (used when the caller already
/// knows the file's resource family, e.g. from a directory naming
/// convention). Detection otherwise runs once against the first element of
/// the unwrapped array and is applied uniformly to every element, matching
/// the homogeneous-per-file shape of real CLI exports.
#[tracing::instrument(skip(json))]
pub fn parse_resources(json: Value, explicit_type: Option<&str>) -> Vec<ParsedResource> {
    let items = unwrap_envelope(json);
    if items.is_empty() {
        return Vec::new();
    }

    let resource_type = match explicit_type {
        Some(ty) => ty.to_string(),
        None => detect_resource_type(&items[0]),
    };

    items
        .into_iter()
        .map(|item| envelope::parse_common(&resource_type, item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_and_parses_instance_array() {
        let json = json!({"data": [
            {"id": "ocid1.instance.oc1.phx.a", "shape": "VM.Standard2.1", "imageId": "ocid1.image.1", "display-name": "web-1"},
            {"id": "ocid1.instance.oc1.phx.b", "shape": "VM.Standard2.1", "imageId": "ocid1.image.1", "display-name": "web-2"},
        ]});

        let parsed = parse_resources(json, None);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|r| r.resource_type == "compute/instance"));
        assert_eq!(parsed[0].display_name.as_deref(), Some("web-1"));
    }

    #[test]
    fn falls_back_to_ocid_prefix_when_no_signature_matches() {
        let json = json!({"data": [{"id": "ocid1.vcn.oc1.phx.a", "weirdField": true}]});
        let parsed = parse_resources(json, None);
        assert_eq!(parsed[0].resource_type, "network/vcn");
    }

    #[test]
    fn falls_back_to_generic_with_synthetic_ocid() {
        let json = json!({"data": [{"displayName": "mystery-thing", "weirdField": true}]});
        let parsed = parse_resources(json, None);
        assert_eq!(parsed[0].resource_type, "generic/unknown");
        assert!(parsed[0].ocid.starts_with("synthetic.generic.unknown."));
    }

    #[test]
    fn explicit_type_bypasses_detection() {
        let json = json!({"data": [{"id": "ocid1.instance.oc1.phx.a", "shape": "VM.Standard2.1"}]});
        let parsed = parse_resources(json, Some("compute/instance"));
        assert_eq!(parsed[0].resource_type, "compute/instance");
    }

    #[test]
    fn unrecognised_envelope_yields_empty_not_panic() {
        let json = json!(42);
        assert!(parse_resources(json, None).is_empty());
    }

    #[test]
    fn empty_array_yields_empty() {
        let json = json!({"data": []});
        assert!(parse_resources(json, None).is_empty());
    }
}
