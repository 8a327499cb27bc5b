//! Directory ingestion: read every `*.json` file in a directory, parse it
//! through the core auto-detector, and load the results into a snapshot.
//! Per §7, a bad file is recorded as an [`IngestFileError`] rather than
//! aborting the whole run.

use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use cloud_inspect_core::parse_resources;
use cloud_inspect_core::store::ResourceStore;
use cloud_inspect_types::{IngestFileError, IngestReport, ParsedResource, Resource, ResourceBlob};

fn parsed_to_resource(snapshot_id: Uuid, parsed: &ParsedResource) -> Resource {
    Resource {
        snapshot_id,
        ocid: parsed.ocid.clone(),
        resource_type: parsed.resource_type.clone(),
        display_name: parsed.display_name.clone(),
        compartment_id: parsed.compartment_id.clone(),
        lifecycle_state: parsed.lifecycle_state.clone(),
        availability_domain: parsed.availability_domain.clone(),
        region_key: parsed.region_key.clone(),
        time_created: parsed.time_created,
        defined_tags: parsed.defined_tags.clone(),
        freeform_tags: parsed.freeform_tags.clone(),
        raw_data: parsed.raw_data.clone(),
    }
}

/// Pull the oversize-userData blob, if any, out of a parsed resource.
fn parsed_to_blob(snapshot_id: Uuid, parsed: &ParsedResource) -> Option<ResourceBlob> {
    parsed.user_data_blob.as_ref().map(|content| ResourceBlob {
        snapshot_id,
        resource_ocid: parsed.ocid.clone(),
        blob_key: "user_data".to_string(),
        content: content.clone(),
    })
}

/// Ingest every `*.json` file directly under `dir` into `snapshot_id`.
pub async fn ingest_directory(store: &dyn ResourceStore, snapshot_id: Uuid, dir: &Path) -> std::io::Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let source = path.display().to_string();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %source, error = %e, "failed to read ingest file");
                report.errors.push(IngestFileError {
                    source,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let json: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                warn!(file = %source, error = %e, "invalid json in ingest file");
                report.errors.push(IngestFileError {
                    source,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let parsed = parse_resources(json, None);
        debug!(file = %source, count = parsed.len(), "parsed ingest file");
        let blobs: Vec<ResourceBlob> = parsed.iter().filter_map(|p| parsed_to_blob(snapshot_id, p)).collect();
        let resources: Vec<Resource> = parsed.iter().map(|p| parsed_to_resource(snapshot_id, p)).collect();
        report.imported += resources.len();

        if let Err(e) = store.insert_resources(snapshot_id, resources).await {
            warn!(file = %source, error = %e, "failed to store resources from ingest file");
            report.errors.push(IngestFileError {
                source: source.clone(),
                message: e.to_string(),
            });
            continue;
        }

        if !blobs.is_empty() {
            if let Err(e) = store.insert_blobs(snapshot_id, blobs).await {
                warn!(file = %source, error = %e, "failed to store blobs from ingest file");
                report.errors.push(IngestFileError {
                    source,
                    message: e.to_string(),
                });
            }
        }
    }

    let relations = cloud_inspect_core::extract_relations(snapshot_id, &store.list_all(snapshot_id, &Default::default()).await.unwrap_or_default());
    if let Err(e) = store.insert_relations(snapshot_id, relations).await {
        warn!(error = %e, "failed to store relations derived from this ingest run");
        report.errors.push(IngestFileError {
            source: "<relations>".to_string(),
            message: e.to_string(),
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cloud_inspect_core::store::InMemoryStore;
    use cloud_inspect_types::Snapshot;

    #[tokio::test]
    async fn ingest_directory_loads_json_files_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("vcns.json"), r#"{"data": [{"id": "ocid1.vcn.oc1..a", "cidrBlock": "10.0.0.0/16"}]}"#)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignore me").await.unwrap();

        let store = InMemoryStore::new();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            imported_at: Utc::now(),
            owner: "tester".into(),
        };
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();

        let report = ingest_directory(&store, id, dir.path()).await.unwrap();
        assert_eq!(report.imported, 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn ingest_directory_records_invalid_json_as_error_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("bad.json"), "{ not json").await.unwrap();
        tokio::fs::write(dir.path().join("good.json"), r#"[{"id": "ocid1.vcn.oc1..a"}]"#).await.unwrap();

        let store = InMemoryStore::new();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            imported_at: Utc::now(),
            owner: "tester".into(),
        };
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();

        let report = ingest_directory(&store, id, dir.path()).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn ingest_directory_stores_oversize_user_data_as_blob() {
        let dir = tempfile::tempdir().unwrap();
        let long = "echo hi; ".repeat(200);
        let body = serde_json::json!({"data": [{"id": "ocid1.instance.oc1..a", "shape": "VM.Standard2.1", "imageId": "ocid1.image.1", "userData": long.clone()}]});
        tokio::fs::write(dir.path().join("instances.json"), body.to_string()).await.unwrap();

        let store = InMemoryStore::new();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            imported_at: Utc::now(),
            owner: "tester".into(),
        };
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();

        ingest_directory(&store, id, dir.path()).await.unwrap();
        let blobs = store.blobs_for_resource(id, "ocid1.instance.oc1..a").await.unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].blob_key, "user_data");
        assert_eq!(blobs[0].content.len(), long.len());
    }
}
