//! The snapshot store interface (§4's "Snapshot store interface" /
//! `resource-store`) and an in-memory reference implementation.
//!
//! The spec treats the persistent store as an external collaborator: "a
//! keyed document store supporting selection by snapshot, type, id, ocid,
//! and compartment, with paginated and chunked reads." [`ResourceStore`] is
//! that interface; [`InMemoryStore`] is the reference implementation this
//! crate's own tests and the CLI run against, standing in for whatever
//! persistence layer wraps it in production.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use cloud_inspect_types::{Resource, ResourceBlob, ResourceRelation, Snapshot};

use crate::config::STORE_CHUNK_SIZE;
use crate::error::StoreError;

/// Selection filter for [`ResourceStore::list_page`] / `list_all`.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    /// Restrict to one of these resource types, if set.
    pub resource_types: Option<Vec<String>>,
    /// Restrict to resources whose `compartment_id` is one of these, if set.
    pub compartment_ids: Option<Vec<String>>,
}

impl ResourceFilter {
    /// No restriction — matches every resource in the snapshot.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a single resource type.
    pub fn of_type(resource_type: impl Into<String>) -> Self {
        Self {
            resource_types: Some(vec![resource_type.into()]),
            compartment_ids: None,
        }
    }

    /// Restrict to a set of resource types.
    pub fn of_types(resource_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            resource_types: Some(resource_types.into_iter().collect()),
            compartment_ids: None,
        }
    }

    fn matches(&self, resource: &Resource) -> bool {
        if let Some(types) = &self.resource_types {
            if !types.iter().any(|t| t == &resource.resource_type) {
                return false;
            }
        }
        if let Some(compartments) = &self.compartment_ids {
            match &resource.compartment_id {
                Some(c) if compartments.iter().any(|x| x == c) => {}
                _ => return false,
            }
        }
        true
    }
}

/// One page of a cursor-paginated read.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in this page.
    pub items: Vec<T>,
    /// Opaque cursor for the next page, `None` once exhausted.
    pub next_cursor: Option<String>,
}

/// Split `ids` into chunks no larger than the store's parameter-limit cap.
/// Shared by the store implementation and by callers (e.g. the topology
/// builder's own `chunkedIn` preprocessing step) that need to keep IN-style
/// lookups within the same safe bound.
pub fn chunk_ids(ids: &[String], size: usize) -> impl Iterator<Item = &[String]> {
    ids.chunks(size.max(1))
}

/// The snapshot store interface: selection by snapshot, type, id, ocid, and
/// compartment, cursor-paginated, with chunked IN-lookups.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create a new, empty snapshot.
    async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError>;

    /// Delete a snapshot and cascade-delete all its resources, relations,
    /// and blobs.
    async fn delete_snapshot(&self, snapshot_id: Uuid) -> Result<(), StoreError>;

    /// Fetch snapshot metadata.
    async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>, StoreError>;

    /// Bulk-insert resources into a snapshot (upsert by `(snapshot_id, ocid)`).
    async fn insert_resources(
        &self,
        snapshot_id: Uuid,
        resources: Vec<Resource>,
    ) -> Result<(), StoreError>;

    /// Bulk-insert relations into a snapshot.
    async fn insert_relations(
        &self,
        snapshot_id: Uuid,
        relations: Vec<ResourceRelation>,
    ) -> Result<(), StoreError>;

    /// Bulk-insert blobs into a snapshot.
    async fn insert_blobs(
        &self,
        snapshot_id: Uuid,
        blobs: Vec<ResourceBlob>,
    ) -> Result<(), StoreError>;

    /// Fetch one resource by ocid.
    async fn get_resource(
        &self,
        snapshot_id: Uuid,
        ocid: &str,
    ) -> Result<Option<Resource>, StoreError>;

    /// Fetch a batch of resources by ocid. Implementations must chunk this
    /// internally at [`STORE_CHUNK_SIZE`] if they delegate to a
    /// parameter-limited backend.
    async fn get_resources_by_ids(
        &self,
        snapshot_id: Uuid,
        ocids: &[String],
    ) -> Result<Vec<Resource>, StoreError>;

    /// Cursor-paginated read, optionally filtered by type/compartment.
    async fn list_page(
        &self,
        snapshot_id: Uuid,
        filter: &ResourceFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Resource>, StoreError>;

    /// Convenience wrapper over `list_page` that drains every page.
    #[tracing::instrument(skip(self))]
    async fn list_all(
        &self,
        snapshot_id: Uuid,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError> {
        let mut out = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .list_page(snapshot_id, filter, cursor.as_deref(), STORE_CHUNK_SIZE)
                .await?;
            out.extend(page.items);
            match page.next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(out)
    }

    /// All relations owned by a snapshot.
    async fn relations_for_snapshot(
        &self,
        snapshot_id: Uuid,
    ) -> Result<Vec<ResourceRelation>, StoreError>;

    /// Blobs attached to one resource.
    async fn blobs_for_resource(
        &self,
        snapshot_id: Uuid,
        ocid: &str,
    ) -> Result<Vec<ResourceBlob>, StoreError>;

    /// Blobs attached to a batch of resources, chunked internally.
    async fn blobs_for_resources(
        &self,
        snapshot_id: Uuid,
        ocids: &[String],
    ) -> Result<Vec<ResourceBlob>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory reference implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SnapshotData {
    /// Insertion order, so pagination cursors are stable.
    order: Vec<String>,
    resources: HashMap<String, Resource>,
    relations: Vec<ResourceRelation>,
    blobs: HashMap<String, Vec<ResourceBlob>>,
}

/// A `dashmap`-backed in-memory store. Reference implementation of
/// [`ResourceStore`]; good enough for tests and the CLI, not meant to
/// survive process restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    snapshots: Arc<DashMap<Uuid, Snapshot>>,
    data: Arc<DashMap<Uuid, SnapshotData>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let id = snapshot.id;
        self.snapshots.insert(id, snapshot);
        self.data.entry(id).or_default();
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_snapshot(&self, snapshot_id: Uuid) -> Result<(), StoreError> {
        self.snapshots.remove(&snapshot_id);
        self.data.remove(&snapshot_id);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshots.get(&snapshot_id).map(|s| s.clone()))
    }

    #[tracing::instrument(skip(self))]
    async fn insert_resources(
        &self,
        snapshot_id: Uuid,
        resources: Vec<Resource>,
    ) -> Result<(), StoreError> {
        let mut entry = self.data.entry(snapshot_id).or_default();
        for resource in resources {
            if !entry.resources.contains_key(&resource.ocid) {
                entry.order.push(resource.ocid.clone());
            }
            entry.resources.insert(resource.ocid.clone(), resource);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn insert_relations(
        &self,
        snapshot_id: Uuid,
        relations: Vec<ResourceRelation>,
    ) -> Result<(), StoreError> {
        let mut entry = self.data.entry(snapshot_id).or_default();
        entry.relations.extend(relations);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn insert_blobs(
        &self,
        snapshot_id: Uuid,
        blobs: Vec<ResourceBlob>,
    ) -> Result<(), StoreError> {
        let mut entry = self.data.entry(snapshot_id).or_default();
        for blob in blobs {
            entry
                .blobs
                .entry(blob.resource_ocid.clone())
                .or_default()
                .push(blob);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_resource(
        &self,
        snapshot_id: Uuid,
        ocid: &str,
    ) -> Result<Option<Resource>, StoreError> {
        Ok(self
            .data
            .get(&snapshot_id)
            .and_then(|d| d.resources.get(ocid).cloned()))
    }

    #[tracing::instrument(skip(self))]
    async fn get_resources_by_ids(
        &self,
        snapshot_id: Uuid,
        ocids: &[String],
    ) -> Result<Vec<Resource>, StoreError> {
        let Some(data) = self.data.get(&snapshot_id) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for chunk in chunk_ids(ocids, STORE_CHUNK_SIZE) {
            for id in chunk {
                if let Some(r) = data.resources.get(id) {
                    out.push(r.clone());
                }
            }
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self))]
    async fn list_page(
        &self,
        snapshot_id: Uuid,
        filter: &ResourceFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Resource>, StoreError> {
        let Some(data) = self.data.get(&snapshot_id) else {
            return Ok(Page {
                items: Vec::new(),
                next_cursor: None,
            });
        };

        let start: usize = match cursor {
            Some(c) => c.parse().unwrap_or(0),
            None => 0,
        };

        let mut items = Vec::new();
        let mut idx = start;
        while idx < data.order.len() && items.len() < limit {
            if let Some(r) = data.resources.get(&data.order[idx]) {
                if filter.matches(r) {
                    items.push(r.clone());
                }
            }
            idx += 1;
        }

        let next_cursor = if idx < data.order.len() {
            Some(idx.to_string())
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    #[tracing::instrument(skip(self))]
    async fn relations_for_snapshot(
        &self,
        snapshot_id: Uuid,
    ) -> Result<Vec<ResourceRelation>, StoreError> {
        Ok(self
            .data
            .get(&snapshot_id)
            .map(|d| d.relations.clone())
            .unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    async fn blobs_for_resource(
        &self,
        snapshot_id: Uuid,
        ocid: &str,
    ) -> Result<Vec<ResourceBlob>, StoreError> {
        Ok(self
            .data
            .get(&snapshot_id)
            .and_then(|d| d.blobs.get(ocid).cloned())
            .unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    async fn blobs_for_resources(
        &self,
        snapshot_id: Uuid,
        ocids: &[String],
    ) -> Result<Vec<ResourceBlob>, StoreError> {
        let Some(data) = self.data.get(&snapshot_id) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for chunk in chunk_ids(ocids, STORE_CHUNK_SIZE) {
            for id in chunk {
                if let Some(blobs) = data.blobs.get(id) {
                    out.extend(blobs.iter().cloned());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            id: Uuid::new_v4(),
            name: "test".into(),
            description: None,
            imported_at: Utc::now(),
            owner: "tester".into(),
        }
    }

    fn sample_resource(snapshot_id: Uuid, ocid: &str, resource_type: &str) -> Resource {
        Resource {
            snapshot_id,
            ocid: ocid.to_string(),
            resource_type: resource_type.to_string(),
            display_name: Some(ocid.to_string()),
            compartment_id: None,
            lifecycle_state: None,
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data: json!({}),
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrips() {
        let store = InMemoryStore::new();
        let snapshot = sample_snapshot();
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();
        store
            .insert_resources(id, vec![sample_resource(id, "ocid1.vcn.1", "network/vcn")])
            .await
            .unwrap();

        let got = store.get_resource(id, "ocid1.vcn.1").await.unwrap();
        assert!(got.is_some());
        assert_eq!(got.unwrap().resource_type, "network/vcn");
    }

    #[tokio::test]
    async fn list_page_paginates_and_filters() {
        let store = InMemoryStore::new();
        let snapshot = sample_snapshot();
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();

        let resources: Vec<Resource> = (0..10)
            .map(|i| {
                sample_resource(
                    id,
                    &format!("ocid1.instance.{i}"),
                    if i % 2 == 0 {
                        "compute/instance"
                    } else {
                        "network/subnet"
                    },
                )
            })
            .collect();
        store.insert_resources(id, resources).await.unwrap();

        let filter = ResourceFilter::of_type("compute/instance");
        let all = store.list_all(id, &filter).await.unwrap();
        assert_eq!(all.len(), 5);

        let page1 = store.list_page(id, &ResourceFilter::all(), None, 3).await.unwrap();
        assert_eq!(page1.items.len(), 3);
        assert!(page1.next_cursor.is_some());
    }

    #[tokio::test]
    async fn delete_snapshot_cascades() {
        let store = InMemoryStore::new();
        let snapshot = sample_snapshot();
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();
        store
            .insert_resources(id, vec![sample_resource(id, "ocid1.vcn.1", "network/vcn")])
            .await
            .unwrap();

        store.delete_snapshot(id).await.unwrap();
        assert!(store.get_snapshot(id).await.unwrap().is_none());
        assert!(store.get_resource(id, "ocid1.vcn.1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_resources_by_ids_chunks_large_batches() {
        let store = InMemoryStore::new();
        let snapshot = sample_snapshot();
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();

        let ocids: Vec<String> = (0..1200).map(|i| format!("ocid1.x.{i}")).collect();
        let resources = ocids
            .iter()
            .map(|o| sample_resource(id, o, "generic/x"))
            .collect();
        store.insert_resources(id, resources).await.unwrap();

        let got = store.get_resources_by_ids(id, &ocids).await.unwrap();
        assert_eq!(got.len(), 1200);
    }
}
