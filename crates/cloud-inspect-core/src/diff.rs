//! Snapshot diff (§4.7): two-pass OCID set difference plus per-field change
//! detection across `lifecycleState`, tags, and `rawData` leaves.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cloud_inspect_types::{ChangeRecord, Resource, SnapshotDiff};

use crate::error::StoreError;
use crate::store::{ResourceFilter, ResourceStore};

fn diff_scalar_field(ocid: &str, field: &str, old: &Value, new: &Value, out: &mut Vec<ChangeRecord>) {
    if old != new {
        out.push(ChangeRecord {
            ocid: ocid.to_string(),
            field: field.to_string(),
            old_value: old.clone(),
            new_value: new.clone(),
        });
    }
}

/// Walk the leaves of `rawData`, emitting one [`ChangeRecord`] per leaf path
/// whose value differs (including leaves present on only one side).
fn diff_raw_data(ocid: &str, prefix: &str, old: &Value, new: &Value, out: &mut Vec<ChangeRecord>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = format!("{prefix}.{key}");
                let old_value = old_map.get(key).unwrap_or(&Value::Null);
                let new_value = new_map.get(key).unwrap_or(&Value::Null);
                diff_raw_data(ocid, &path, old_value, new_value, out);
            }
        }
        (old, new) if old != new => out.push(ChangeRecord {
            ocid: ocid.to_string(),
            field: prefix.to_string(),
            old_value: old.clone(),
            new_value: new.clone(),
        }),
        _ => {}
    }
}

fn changes_for_pair(ocid: &str, a: &Resource, b: &Resource) -> Vec<ChangeRecord> {
    let mut out = Vec::new();

    diff_scalar_field(
        ocid,
        "lifecycleState",
        &a.lifecycle_state.clone().map(Value::String).unwrap_or(Value::Null),
        &b.lifecycle_state.clone().map(Value::String).unwrap_or(Value::Null),
        &mut out,
    );

    let a_freeform = serde_json::to_value(&a.freeform_tags).unwrap_or(Value::Null);
    let b_freeform = serde_json::to_value(&b.freeform_tags).unwrap_or(Value::Null);
    diff_scalar_field(ocid, "freeformTags", &a_freeform, &b_freeform, &mut out);

    let a_defined = serde_json::to_value(&a.defined_tags).unwrap_or(Value::Null);
    let b_defined = serde_json::to_value(&b.defined_tags).unwrap_or(Value::Null);
    diff_scalar_field(ocid, "definedTags", &a_defined, &b_defined, &mut out);

    diff_raw_data(ocid, "rawData", &a.raw_data, &b.raw_data, &mut out);

    out
}

fn empty_snapshot_diff() -> SnapshotDiff {
    SnapshotDiff { added: Vec::new(), removed: Vec::new(), changed: Vec::new() }
}

/// Diff two snapshots' resource sets: `added = B - A`, `removed = A - B`,
/// `changed` holds field-level deltas for every OCID present in both.
/// Checked for cancellation after each snapshot load and before the
/// per-OCID comparison; on cancellation an empty diff is returned (§5).
#[tracing::instrument(skip(store, cancel))]
pub async fn snapshot_diff(store: &dyn ResourceStore, snapshot_a: Uuid, snapshot_b: Uuid, cancel: &CancellationToken) -> Result<SnapshotDiff, StoreError> {
    if cancel.is_cancelled() {
        return Ok(empty_snapshot_diff());
    }

    let resources_a = store.list_all(snapshot_a, &ResourceFilter::all()).await?;
    let resources_b = store.list_all(snapshot_b, &ResourceFilter::all()).await?;

    if cancel.is_cancelled() {
        return Ok(empty_snapshot_diff());
    }

    let by_ocid_a: HashMap<&str, &Resource> = resources_a.iter().map(|r| (r.ocid.as_str(), r)).collect();
    let by_ocid_b: HashMap<&str, &Resource> = resources_b.iter().map(|r| (r.ocid.as_str(), r)).collect();

    let ocids_a: HashSet<&str> = by_ocid_a.keys().copied().collect();
    let ocids_b: HashSet<&str> = by_ocid_b.keys().copied().collect();

    let mut added: Vec<String> = ocids_b.difference(&ocids_a).map(|s| s.to_string()).collect();
    let mut removed: Vec<String> = ocids_a.difference(&ocids_b).map(|s| s.to_string()).collect();
    added.sort();
    removed.sort();

    let mut common: Vec<&str> = ocids_a.intersection(&ocids_b).copied().collect();
    common.sort();

    let mut changed = Vec::new();
    for ocid in common {
        let a = by_ocid_a[ocid];
        let b = by_ocid_b[ocid];
        changed.extend(changes_for_pair(ocid, a, b));
    }

    Ok(SnapshotDiff { added, removed, changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::store::InMemoryStore;
    use cloud_inspect_types::Snapshot;

    fn resource(snapshot_id: Uuid, ocid: &str, lifecycle_state: Option<&str>, raw_data: Value) -> Resource {
        Resource {
            snapshot_id,
            ocid: ocid.to_string(),
            resource_type: "compute/instance".to_string(),
            display_name: Some(ocid.to_string()),
            compartment_id: None,
            lifecycle_state: lifecycle_state.map(str::to_string),
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data,
        }
    }

    async fn snapshot(store: &InMemoryStore) -> Uuid {
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            imported_at: Utc::now(),
            owner: "tester".into(),
        };
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();
        id
    }

    #[tokio::test]
    async fn identical_snapshots_diff_empty() {
        let store = InMemoryStore::new();
        let a = snapshot(&store).await;
        let resources = vec![resource(a, "r-1", Some("RUNNING"), json!({"shape": "VM.Standard2.1"}))];
        store.insert_resources(a, resources.clone()).await.unwrap();

        let b = snapshot(&store).await;
        let mut resources_b = resources;
        resources_b[0].snapshot_id = b;
        store.insert_resources(b, resources_b).await.unwrap();

        let diff = snapshot_diff(&store, a, b, &CancellationToken::new()).await.unwrap();
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
    }

    #[tokio::test]
    async fn added_and_removed_are_set_differences() {
        let store = InMemoryStore::new();
        let a = snapshot(&store).await;
        store
            .insert_resources(a, vec![resource(a, "r-1", Some("RUNNING"), json!({}))])
            .await
            .unwrap();

        let b = snapshot(&store).await;
        store
            .insert_resources(b, vec![resource(b, "r-2", Some("RUNNING"), json!({}))])
            .await
            .unwrap();

        let diff = snapshot_diff(&store, a, b, &CancellationToken::new()).await.unwrap();
        assert_eq!(diff.added, vec!["r-2".to_string()]);
        assert_eq!(diff.removed, vec!["r-1".to_string()]);
    }

    #[tokio::test]
    async fn lifecycle_state_change_is_detected() {
        let store = InMemoryStore::new();
        let a = snapshot(&store).await;
        store
            .insert_resources(a, vec![resource(a, "r-1", Some("RUNNING"), json!({}))])
            .await
            .unwrap();

        let b = snapshot(&store).await;
        store
            .insert_resources(b, vec![resource(b, "r-1", Some("STOPPED"), json!({}))])
            .await
            .unwrap();

        let diff = snapshot_diff(&store, a, b, &CancellationToken::new()).await.unwrap();
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].field, "lifecycleState");
    }

    #[tokio::test]
    async fn raw_data_leaf_change_is_detected_by_path() {
        let store = InMemoryStore::new();
        let a = snapshot(&store).await;
        store
            .insert_resources(a, vec![resource(a, "r-1", None, json!({"shape": "VM.Standard2.1", "ocpus": 2}))])
            .await
            .unwrap();

        let b = snapshot(&store).await;
        store
            .insert_resources(b, vec![resource(b, "r-1", None, json!({"shape": "VM.Standard2.2", "ocpus": 2}))])
            .await
            .unwrap();

        let diff = snapshot_diff(&store, a, b, &CancellationToken::new()).await.unwrap();
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].field, "rawData.shape");
    }

    #[tokio::test]
    async fn snapshot_diff_returns_empty_when_pre_cancelled() {
        let store = InMemoryStore::new();
        let a = snapshot(&store).await;
        store.insert_resources(a, vec![resource(a, "r-1", Some("RUNNING"), json!({}))]).await.unwrap();
        let b = snapshot(&store).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let diff = snapshot_diff(&store, a, b, &cancel).await.unwrap();
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
    }
}
