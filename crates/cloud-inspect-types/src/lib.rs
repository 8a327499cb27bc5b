//! cloud-inspect-types: shared data model and result record types for the
//! cloud-inspect ecosystem.
//!
//! This crate contains no I/O. It defines the resource graph (`Resource`,
//! `ResourceBlob`, `ResourceRelation`, `Snapshot`) ingestion produces, and the
//! stable result records (`ReachabilityResult`, `TopologyResult`,
//! `AuditReport`, `TagReport`, `SnapshotDiff`) the analytical core returns.

#![warn(missing_docs)]

pub mod raw;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use raw::{sanitize_raw_value, RawValue, MAX_STRING_LEN};

/// A point-in-time, immutable inventory of a tenancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// When this snapshot was imported.
    pub imported_at: DateTime<Utc>,
    /// Who imported it.
    pub owner: String,
}

/// A normalised cloud resource, uniquely identified by `(snapshot_id, ocid)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Owning snapshot.
    pub snapshot_id: Uuid,
    /// Oracle Cloud Identifier (or synthetic equivalent for generic resources).
    pub ocid: String,
    /// Stable resource-type slug, e.g. `network/subnet`, `generic/foo`.
    pub resource_type: String,
    /// Human-facing display name, if present in the source.
    pub display_name: Option<String>,
    /// Owning compartment, if applicable.
    pub compartment_id: Option<String>,
    /// Lifecycle state string as reported by the provider.
    pub lifecycle_state: Option<String>,
    /// Availability domain, if applicable.
    pub availability_domain: Option<String>,
    /// Region key, if applicable.
    pub region_key: Option<String>,
    /// Creation timestamp, if present in the source.
    pub time_created: Option<DateTime<Utc>>,
    /// Defined (namespaced) tags.
    pub defined_tags: Option<BTreeMap<String, BTreeMap<String, RawValue>>>,
    /// Freeform tags.
    pub freeform_tags: Option<BTreeMap<String, String>>,
    /// Type-specific normalised payload. Every string leaf is sanitised to
    /// at most `MAX_STRING_LEN` bytes (see [`sanitize_raw_value`]).
    pub raw_data: RawValue,
}

impl Resource {
    /// Identity tuple used throughout the engine: `(snapshot_id, ocid)`.
    pub fn key(&self) -> (Uuid, &str) {
        (self.snapshot_id, self.ocid.as_str())
    }
}

/// An oversize textual payload (instance user-data, SSH keys, ...) carried
/// outside `raw_data`, keyed by `(resource_ocid, blob_key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBlob {
    /// Owning snapshot.
    pub snapshot_id: Uuid,
    /// OCID of the resource this blob belongs to.
    pub resource_ocid: String,
    /// Discriminator within the resource, e.g. `"user_data"`.
    pub blob_key: String,
    /// Raw textual content, never truncated.
    pub content: String,
}

/// The closed set of relation types the extractor may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationType {
    /// Structural containment (e.g. compartment tree).
    Contains,
    /// Structural parent link.
    Parent,
    /// Resource is a member of a subnet.
    SubnetMember,
    /// Subnet/VCN routes traffic via a route table.
    RoutesVia,
    /// Subnet is secured by a security list.
    SecuredBy,
    /// Resource is a member of a network security group.
    NsgMember,
    /// Volume is attached to a compute resource.
    VolumeAttached,
    /// Load balancer has a backend resource.
    LbBackend,
    /// Gateway serves a VCN.
    GatewayFor,
    /// Workload runs in a network location.
    RunsIn,
    /// Resource uses a VCN.
    UsesVcn,
    /// Instance uses an image.
    UsesImage,
    /// IAM principal is a member of a group/dynamic-group.
    MemberOf,
    /// Resource is stored in a bucket/filesystem.
    StoredIn,
    /// Workload is deployed to a cluster/node-pool.
    DeployedTo,
    /// Backup relationship.
    BackupOf,
    /// Policy groups a set of principals.
    Groups,
    /// Resource is attached to another resource.
    AttachedTo,
    /// Certificate/key signs another resource.
    Signs,
    /// General ownership/ownership-adjacent link.
    BelongsTo,
}

/// A directed, typed edge between two resources in the same snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRelation {
    /// Owning snapshot.
    pub snapshot_id: Uuid,
    /// Source resource OCID.
    pub from_ocid: String,
    /// Target resource OCID.
    pub to_ocid: String,
    /// Relation discriminator.
    pub relation_type: RelationType,
    /// Optional free-form metadata (e.g. an edge label).
    pub metadata: Option<RawValue>,
}

/// A resource record produced by a parser, prior to being stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResource {
    /// OCID (real, OCID-prefix-derived, or synthetic-hash).
    pub ocid: String,
    /// Stable resource-type slug.
    pub resource_type: String,
    /// Display name, if present.
    pub display_name: Option<String>,
    /// Owning compartment, if present.
    pub compartment_id: Option<String>,
    /// Lifecycle state, if present.
    pub lifecycle_state: Option<String>,
    /// Availability domain, if present.
    pub availability_domain: Option<String>,
    /// Region key, if present.
    pub region_key: Option<String>,
    /// Creation timestamp, if present.
    pub time_created: Option<DateTime<Utc>>,
    /// Defined tags, if present.
    pub defined_tags: Option<BTreeMap<String, BTreeMap<String, RawValue>>>,
    /// Freeform tags, if present.
    pub freeform_tags: Option<BTreeMap<String, String>>,
    /// Sanitised, type-specific payload.
    pub raw_data: RawValue,
    /// Full, unsanitised `userData` content, set only when the source value
    /// exceeded [`MAX_STRING_LEN`] and was replaced with a truncation
    /// sentinel in `raw_data`. Ingestion persists this as a [`ResourceBlob`]
    /// keyed `"user_data"` so audit rules can still inspect it.
    pub user_data_blob: Option<String>,
}

// ---------------------------------------------------------------------------
// Reachability result types
// ---------------------------------------------------------------------------

/// The closed hop taxonomy walked by the reachability analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HopType {
    /// The originating source address.
    Src,
    /// A subnet or VCN.
    Sub,
    /// A route table.
    Rt,
    /// A security list.
    Sl,
    /// A network security group.
    Nsg,
    /// Any gateway (IGW, NAT, SGW, DRG, LPG).
    Gw,
    /// The destination.
    Dst,
    /// External/internet endpoint.
    Net,
}

/// Per-hop admissibility status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HopStatus {
    /// Traffic is admitted at this hop.
    Allow,
    /// Traffic is denied at this hop.
    Deny,
    /// The hop could not be resolved (missing reference).
    Unknown,
}

/// The top-level reachability outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// All hops allow, end to end.
    Reachable,
    /// At least one hop denies.
    Blocked,
    /// Cross-VCN traversal could not be fully resolved.
    Partial,
    /// A referenced resource was missing, or no query was specified.
    Unknown,
}

/// One node in a reachability walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    /// Stable id, unique within the result.
    pub id: String,
    /// Hop taxonomy discriminator.
    #[serde(rename = "type")]
    pub hop_type: HopType,
    /// Human-readable label.
    pub label: String,
    /// Resource type of the underlying resource, if any.
    pub resource_type: Option<String>,
    /// OCID of the underlying resource, if any.
    pub ocid: Option<String>,
    /// Admissibility status.
    pub status: HopStatus,
    /// Free-text explanation (e.g. which rule matched).
    pub details: Option<String>,
    /// Optional structured metadata.
    pub metadata: Option<RawValue>,
}

/// A directed link between two hops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Stable id, unique within the result.
    pub id: String,
    /// Source hop id.
    pub source: String,
    /// Target hop id.
    pub target: String,
    /// Derived from the endpoints: `DENY` if either is `DENY`, else
    /// `UNKNOWN` if either is `UNKNOWN`, else `ALLOW`.
    pub status: HopStatus,
    /// Optional label.
    pub label: Option<String>,
}

/// The result of one reachability query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityResult {
    /// Hops in walk order.
    pub hops: Vec<Hop>,
    /// Links between hops.
    pub links: Vec<Link>,
    /// Top-level verdict.
    pub verdict: Verdict,
    /// Human-readable explanation of the verdict.
    pub verdict_detail: String,
}

// ---------------------------------------------------------------------------
// Topology result types
// ---------------------------------------------------------------------------

/// The four topology views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViewType {
    /// Physical/virtual network layout.
    Network,
    /// Compartment hierarchy and cross-compartment dependencies.
    Compartment,
    /// Workload dependency graph.
    Dependency,
    /// Internet-reachable subset.
    Exposure,
}

/// A node in a topology result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    /// Stable id, unique within the result (OCID for real resources, a
    /// synthetic id for `Internet`/`OracleServices`/summary nodes).
    pub id: String,
    /// Render-class tag (e.g. `"vcnNode"`, `"iamNode"`).
    pub node_type: String,
    /// Underlying resource type, if any (absent for synthetic nodes).
    pub resource_type: Option<String>,
    /// OCID, empty for synthetic nodes.
    pub ocid: String,
    /// Display label.
    pub label: String,
    /// Parent node id, for nesting (e.g. subnet under VCN).
    pub parent_id: Option<String>,
    /// Arbitrary per-view metadata (instance counts, resource counts, ...).
    pub metadata: Option<RawValue>,
}

/// An edge in a topology result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyEdge {
    /// Stable id, unique within the result.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Optional label.
    pub label: Option<String>,
    /// Underlying relation type, if derived from one.
    pub relation_type: Option<RelationType>,
    /// Whether this edge should render as animated (e.g. active routing).
    pub animated: bool,
}

/// The result of one topology build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyResult {
    /// Nodes in the view.
    pub nodes: Vec<TopologyNode>,
    /// Edges in the view.
    pub edges: Vec<TopologyEdge>,
    /// Total number of resources considered, before any capping.
    pub total_count: usize,
    /// Whether the result was truncated to `MAX_TOPOLOGY_NODES`.
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Audit result types
// ---------------------------------------------------------------------------

/// Finding severity, ordered most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Immediate risk of compromise or data loss.
    Critical,
    /// Significant exposure.
    High,
    /// Moderate hygiene issue.
    Medium,
    /// Informational.
    Low,
}

/// One finding grouped by `(severity, title)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingGroup {
    /// Finding severity.
    pub severity: Severity,
    /// Finding title.
    pub title: String,
    /// Human-readable description of the condition.
    pub description: String,
    /// Recommended remediation.
    pub recommendation: String,
    /// Number of affected resources.
    pub count: usize,
    /// OCIDs of affected resources.
    pub affected_resources: Vec<String>,
    /// CIS benchmark mapping, if one exists for this title.
    pub framework: Option<String>,
}

/// Per-severity finding counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Number of CRITICAL findings.
    pub critical: usize,
    /// Number of HIGH findings.
    pub high: usize,
    /// Number of MEDIUM findings.
    pub medium: usize,
    /// Number of LOW findings.
    pub low: usize,
}

/// The result of running the audit engine against a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Findings grouped by `(severity, title)`, severity ascending then
    /// count descending.
    pub grouped_findings: Vec<FindingGroup>,
    /// Per-severity totals.
    pub summary: AuditSummary,
}

/// Per-required-tag compliance counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagReport {
    /// Total resources scanned.
    pub total_resources: usize,
    /// Resources with all required tags present.
    pub compliant_resources: usize,
    /// Percentage compliant, rounded to two decimals.
    pub percentage: f64,
    /// Per-tag-key presence counts.
    pub tag_counts: BTreeMap<String, usize>,
    /// OCIDs missing at least one required tag, capped at
    /// `MAX_MISSING_TAG_RESOURCES`.
    pub non_compliant_resources: Vec<String>,
    /// Whether `non_compliant_resources` was truncated.
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Diff result types
// ---------------------------------------------------------------------------

/// A single field-level change between two snapshots' view of the same OCID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// OCID that changed.
    pub ocid: String,
    /// Field path, e.g. `"lifecycle_state"` or `"raw_data.shape"`.
    pub field: String,
    /// Value in the first snapshot.
    pub old_value: RawValue,
    /// Value in the second snapshot.
    pub new_value: RawValue,
}

/// The result of diffing two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// OCIDs present in B but not A.
    pub added: Vec<String>,
    /// OCIDs present in A but not B.
    pub removed: Vec<String>,
    /// Field-level changes for OCIDs present in both.
    pub changed: Vec<ChangeRecord>,
}

// ---------------------------------------------------------------------------
// Ingestion report
// ---------------------------------------------------------------------------

/// One file-level ingestion failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileError {
    /// Path or identifier of the offending file.
    pub source: String,
    /// Human-readable error message.
    pub message: String,
}

/// The result of ingesting a batch of files into a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Number of resources successfully imported.
    pub imported: usize,
    /// Per-file errors; ingestion never aborts because of these.
    pub errors: Vec<IngestFileError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes() {
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            name: "prod-2026-01".to_string(),
            description: None,
            imported_at: Utc::now(),
            owner: "alice".to_string(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("prod-2026-01"));
    }

    #[test]
    fn severity_orders_critical_first() {
        let mut severities = vec![Severity::Low, Severity::Critical, Severity::Medium];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::Medium, Severity::Low]
        );
    }
}
