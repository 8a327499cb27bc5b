//! Audit engine (§4.6): a fixed rule table evaluated in chunks, findings
//! grouped by `(severity, title)`, plus a separate tag-compliance pass.

use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cloud_inspect_types::{
    AuditReport, AuditSummary, FindingGroup, RelationType, Resource, Severity, TagReport,
};

use crate::config::{AUDIT_CHUNK_SIZE, MAX_MISSING_TAG_RESOURCES};
use crate::error::StoreError;
use crate::store::{ResourceFilter, ResourceStore};

const SENSITIVE_PORTS: &[u16] = &[22, 3389, 1521, 3306, 5432, 27017];

struct RawFinding {
    severity: Severity,
    title: &'static str,
    description: String,
    recommendation: &'static str,
    ocid: String,
    framework: Option<&'static str>,
}

fn cis_mapping(title: &str) -> Option<&'static str> {
    match title {
        "Publicly accessible bucket" => Some("CIS 2.1.2"),
        "Open ingress on port P from 0.0.0.0/0" => Some("CIS 4.1"),
        "Ingress rule allows all protocols from 0.0.0.0/0" => Some("CIS 4.2"),
        "Volume not encrypted with customer-managed key" => Some("CIS 3.1"),
        _ => None,
    }
}

fn port_range_intersects_sensitive(rule: &Value) -> bool {
    let Some(range) = rule.get("tcpOptions").and_then(|o| o.get("destinationPortRange")) else {
        return true;
    };
    let min = range.get("min").and_then(Value::as_u64).unwrap_or(0);
    let max = range.get("max").and_then(Value::as_u64).unwrap_or(65535);
    SENSITIVE_PORTS.iter().any(|&p| (p as u64) >= min && (p as u64) <= max)
}

fn security_list_findings(resource: &Resource) -> Vec<RawFinding> {
    let mut out = Vec::new();
    let Some(ingress) = resource.raw_data.get("ingressSecurityRules").and_then(Value::as_array) else {
        return out;
    };

    for rule in ingress {
        let is_open = rule.get("source").and_then(Value::as_str) == Some("0.0.0.0/0");
        if !is_open {
            continue;
        }
        let protocol = rule.get("protocol").and_then(Value::as_str).unwrap_or("all");
        if protocol == "6" && port_range_intersects_sensitive(rule) {
            out.push(RawFinding {
                severity: Severity::Critical,
                title: "Open ingress on port P from 0.0.0.0/0",
                description: format!("security list {} allows ingress from 0.0.0.0/0 on a sensitive port", resource.ocid),
                recommendation: "Restrict ingress to known CIDR ranges and required ports only.",
                ocid: resource.ocid.clone(),
                framework: cis_mapping("Open ingress on port P from 0.0.0.0/0"),
            });
        }
        if protocol == "all" {
            out.push(RawFinding {
                severity: Severity::High,
                title: "Ingress rule allows all protocols from 0.0.0.0/0",
                description: format!("security list {} allows all protocols from 0.0.0.0/0", resource.ocid),
                recommendation: "Scope ingress rules to specific protocols and ports.",
                ocid: resource.ocid.clone(),
                framework: cis_mapping("Ingress rule allows all protocols from 0.0.0.0/0"),
            });
        }
    }
    out
}

fn resource_findings(
    resource: &Resource,
    nsg_members: &HashSet<String>,
    volume_attached: &HashSet<String>,
    user_data_blobs: &HashMap<String, String>,
) -> Vec<RawFinding> {
    let mut out = Vec::new();

    match resource.resource_type.as_str() {
        "network/security-list" => out.extend(security_list_findings(resource)),
        "network/subnet" => {
            if resource.raw_data.get("prohibitInternetIngress").and_then(Value::as_bool) == Some(false) {
                out.push(RawFinding {
                    severity: Severity::High,
                    title: "Public subnet detected",
                    description: format!("subnet {} permits internet ingress", resource.ocid),
                    recommendation: "Set prohibitInternetIngress=true unless public access is required.",
                    ocid: resource.ocid.clone(),
                    framework: None,
                });
            }
        }
        "compute/block-volume" | "compute/boot-volume" => {
            if resource.raw_data.get("kmsKeyId").is_none() {
                out.push(RawFinding {
                    severity: Severity::High,
                    title: "Volume not encrypted with customer-managed key",
                    description: format!("volume {} has no kmsKeyId", resource.ocid),
                    recommendation: "Encrypt volumes with a customer-managed KMS key.",
                    ocid: resource.ocid.clone(),
                    framework: cis_mapping("Volume not encrypted with customer-managed key"),
                });
            }
            if !volume_attached.contains(&resource.ocid) {
                out.push(RawFinding {
                    severity: Severity::Medium,
                    title: "Unattached block volume",
                    description: format!("volume {} is not attached to any compute resource", resource.ocid),
                    recommendation: "Delete or attach unused volumes to avoid unnecessary cost and exposure.",
                    ocid: resource.ocid.clone(),
                    framework: None,
                });
            }
        }
        "storage/bucket" => {
            if resource.raw_data.get("publicAccessType").and_then(Value::as_str) != Some("NoPublicAccess") {
                out.push(RawFinding {
                    severity: Severity::Critical,
                    title: "Publicly accessible bucket",
                    description: format!("bucket {} has public access enabled", resource.ocid),
                    recommendation: "Set publicAccessType to NoPublicAccess unless public hosting is required.",
                    ocid: resource.ocid.clone(),
                    framework: cis_mapping("Publicly accessible bucket"),
                });
            }
        }
        "compute/instance" => {
            if !nsg_members.contains(&resource.ocid) {
                out.push(RawFinding {
                    severity: Severity::Medium,
                    title: "Instance without Network Security Group",
                    description: format!("instance {} is not a member of any NSG", resource.ocid),
                    recommendation: "Attach instances to a network security group for defense in depth.",
                    ocid: resource.ocid.clone(),
                    framework: None,
                });
            }
            if resource.lifecycle_state.as_deref() == Some("STOPPED") {
                out.push(RawFinding {
                    severity: Severity::Low,
                    title: "Stopped instance detected",
                    description: format!("instance {} is stopped", resource.ocid),
                    recommendation: "Terminate instances that are no longer needed.",
                    ocid: resource.ocid.clone(),
                    framework: None,
                });
            }
            out.extend(user_data_findings(resource, user_data_blobs));
        }
        "iam/policy" => out.extend(policy_findings(resource)),
        _ => {}
    }

    if matches!(resource.lifecycle_state.as_deref(), Some("FAILED") | Some("TERMINATING")) {
        out.push(RawFinding {
            severity: Severity::Medium,
            title: "Resource in {FAILED,TERMINATING} state",
            description: format!("resource {} is in lifecycle state {:?}", resource.ocid, resource.lifecycle_state),
            recommendation: "Investigate and clean up resources stuck in a terminal or failing state.",
            ocid: resource.ocid.clone(),
            framework: None,
        });
    }

    out
}

fn policy_findings(resource: &Resource) -> Vec<RawFinding> {
    let mut out = Vec::new();
    let Some(statements) = resource.raw_data.get("statements").and_then(Value::as_array) else {
        return out;
    };
    for statement in statements.iter().filter_map(Value::as_str) {
        let lower = statement.to_lowercase();
        if lower.contains("manage all-resources in tenancy") {
            out.push(RawFinding {
                severity: Severity::High,
                title: "Overly broad policy — manage all-resources in tenancy",
                description: format!("policy {} grants manage all-resources in tenancy", resource.ocid),
                recommendation: "Scope policy statements to specific resource types and compartments.",
                ocid: resource.ocid.clone(),
                framework: None,
            });
        } else if lower.contains("manage") && lower.contains("in tenancy") {
            out.push(RawFinding {
                severity: Severity::Medium,
                title: "Broad \"manage\" policy at tenancy level",
                description: format!("policy {} grants a broad manage statement at tenancy scope", resource.ocid),
                recommendation: "Prefer compartment-scoped statements over tenancy-wide grants.",
                ocid: resource.ocid.clone(),
                framework: None,
            });
        }
    }
    out
}

fn password_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(password\s*[=:]\s*\S+|passwd\s*[=:]|-p\s+\S+)").unwrap())
}

fn api_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(AKIA[0-9A-Z]{16})|((?i)(key|token|secret)\s*[=:]\s*['"]?[A-Za-z0-9/+=]{20,})"#).unwrap())
}

fn insecure_http_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"http://(?!localhost|127\.0\.0\.1)").unwrap())
}

/// `raw_data.userData` is intact for any value under `MAX_STRING_LEN`; past
/// that it has been replaced with a truncation sentinel, and the real
/// content — if it was ingested — lives in a `"user_data"` blob instead.
fn user_data_content<'a>(resource: &'a Resource, user_data_blobs: &'a HashMap<String, String>) -> Option<&'a str> {
    match resource.raw_data.get("userData").and_then(Value::as_str) {
        Some(s) if !s.starts_with("<truncated:") => Some(s),
        _ => user_data_blobs.get(&resource.ocid).map(String::as_str),
    }
}

fn user_data_findings(resource: &Resource, user_data_blobs: &HashMap<String, String>) -> Vec<RawFinding> {
    let mut out = Vec::new();
    let Some(user_data) = user_data_content(resource, user_data_blobs) else {
        return out;
    };

    if password_pattern().is_match(user_data) {
        out.push(RawFinding {
            severity: Severity::Critical,
            title: "Hardcoded password in instance userData",
            description: format!("instance {} userData appears to contain a hardcoded password", resource.ocid),
            recommendation: "Move secrets out of userData into a vault and inject at boot time.",
            ocid: resource.ocid.clone(),
            framework: None,
        });
    }
    if api_key_pattern().is_match(user_data) {
        out.push(RawFinding {
            severity: Severity::High,
            title: "Potential API key or token in instance userData",
            description: format!("instance {} userData appears to contain an API key or token", resource.ocid),
            recommendation: "Rotate the exposed credential and move secrets into a vault.",
            ocid: resource.ocid.clone(),
            framework: None,
        });
    }
    if insecure_http_pattern().is_match(user_data) {
        out.push(RawFinding {
            severity: Severity::Medium,
            title: "Insecure HTTP URL in instance userData",
            description: format!("instance {} userData references a plaintext HTTP URL", resource.ocid),
            recommendation: "Use HTTPS endpoints for any resource fetched during boot.",
            ocid: resource.ocid.clone(),
            framework: None,
        });
    }
    if user_data.contains("setenforce 0") || user_data.contains("iptables -F") {
        out.push(RawFinding {
            severity: Severity::Medium,
            title: "Security controls disabled in instance userData",
            description: format!("instance {} userData disables SELinux or flushes iptables", resource.ocid),
            recommendation: "Do not disable host security controls during provisioning.",
            ocid: resource.ocid.clone(),
            framework: None,
        });
    }
    out
}

async fn build_membership_sets(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
) -> Result<(HashSet<String>, HashSet<String>), StoreError> {
    let relations = store.relations_for_snapshot(snapshot_id).await?;
    let mut nsg_members = HashSet::new();
    let mut volume_attached = HashSet::new();
    for relation in relations {
        match relation.relation_type {
            RelationType::NsgMember => {
                nsg_members.insert(relation.from_ocid);
            }
            RelationType::VolumeAttached => {
                volume_attached.insert(relation.from_ocid);
            }
            _ => {}
        }
    }
    Ok((nsg_members, volume_attached))
}

/// Preload `"user_data"` blob content for every instance in the snapshot, so
/// `user_data_findings` can see content that was too long to survive
/// sanitisation into `raw_data`.
async fn user_data_blob_map(store: &dyn ResourceStore, snapshot_id: Uuid) -> Result<HashMap<String, String>, StoreError> {
    let instance_ids: Vec<String> = store
        .list_all(snapshot_id, &ResourceFilter::of_type("compute/instance"))
        .await?
        .into_iter()
        .map(|r| r.ocid)
        .collect();

    let blobs = store.blobs_for_resources(snapshot_id, &instance_ids).await?;
    Ok(blobs
        .into_iter()
        .filter(|b| b.blob_key == "user_data")
        .map(|b| (b.resource_ocid, b.content))
        .collect())
}

fn empty_audit_report() -> AuditReport {
    AuditReport { grouped_findings: Vec::new(), summary: AuditSummary::default() }
}

/// Run the audit rule table against every resource in a snapshot, streaming
/// in chunks of [`AUDIT_CHUNK_SIZE`]. Checked for cancellation between
/// chunks; on cancellation the accumulated findings are discarded and an
/// empty report is returned (§5).
#[tracing::instrument(skip(store, cancel))]
pub async fn run_audit(store: &dyn ResourceStore, snapshot_id: Uuid, cancel: &CancellationToken) -> Result<AuditReport, StoreError> {
    if cancel.is_cancelled() {
        return Ok(empty_audit_report());
    }

    let (nsg_members, volume_attached) = build_membership_sets(store, snapshot_id).await?;
    let user_data_blobs = user_data_blob_map(store, snapshot_id).await?;

    let mut grouped: HashMap<(Severity, &'static str), Vec<RawFinding>> = HashMap::new();
    let mut cursor = None;

    loop {
        if cancel.is_cancelled() {
            return Ok(empty_audit_report());
        }

        let page = store
            .list_page(snapshot_id, &ResourceFilter::all(), cursor.as_deref(), AUDIT_CHUNK_SIZE)
            .await?;

        for resource in &page.items {
            for finding in resource_findings(resource, &nsg_members, &volume_attached, &user_data_blobs) {
                grouped.entry((finding.severity, finding.title)).or_default().push(finding);
            }
        }

        match page.next_cursor {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    let mut groups: Vec<FindingGroup> = grouped
        .into_iter()
        .map(|((severity, title), findings)| {
            let affected_resources: Vec<String> = findings.iter().map(|f| f.ocid.clone()).collect();
            FindingGroup {
                severity,
                title: title.to_string(),
                description: findings.first().map(|f| f.description.clone()).unwrap_or_default(),
                recommendation: findings.first().map(|f| f.recommendation.to_string()).unwrap_or_default(),
                count: affected_resources.len(),
                affected_resources,
                framework: findings.first().and_then(|f| f.framework).map(str::to_string),
            }
        })
        .collect();

    groups.sort_by(|a, b| a.severity.cmp(&b.severity).then(b.count.cmp(&a.count)));

    let mut summary = AuditSummary::default();
    for group in &groups {
        match group.severity {
            Severity::Critical => summary.critical += group.count,
            Severity::High => summary.high += group.count,
            Severity::Medium => summary.medium += group.count,
            Severity::Low => summary.low += group.count,
        }
    }

    Ok(AuditReport { grouped_findings: groups, summary })
}

fn empty_tag_report(required_tags: &[String]) -> TagReport {
    TagReport {
        total_resources: 0,
        compliant_resources: 0,
        percentage: 0.0,
        tag_counts: required_tags.iter().map(|t| (t.clone(), 0)).collect(),
        non_compliant_resources: Vec::new(),
        truncated: false,
    }
}

/// Tag-compliance pass (§4.6's "Tag compliance" paragraph). Checked for
/// cancellation between chunks, matching [`run_audit`].
#[tracing::instrument(skip(store, required_tags, cancel))]
pub async fn run_tag_compliance(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
    required_tags: &[String],
    cancel: &CancellationToken,
) -> Result<TagReport, StoreError> {
    if cancel.is_cancelled() {
        return Ok(empty_tag_report(required_tags));
    }

    let mut total = 0usize;
    let mut compliant = 0usize;
    let mut tag_counts: BTreeMap<String, usize> = required_tags.iter().map(|t| (t.clone(), 0)).collect();
    let mut non_compliant = Vec::new();
    let mut truncated = false;

    let mut cursor = None;
    loop {
        if cancel.is_cancelled() {
            return Ok(empty_tag_report(required_tags));
        }

        let page = store
            .list_page(snapshot_id, &ResourceFilter::all(), cursor.as_deref(), AUDIT_CHUNK_SIZE)
            .await?;

        for resource in &page.items {
            total += 1;
            let mut has_all = true;
            for tag in required_tags {
                let present = resource.freeform_tags.as_ref().map(|m| m.contains_key(tag)).unwrap_or(false);
                if present {
                    *tag_counts.entry(tag.clone()).or_insert(0) += 1;
                } else {
                    has_all = false;
                }
            }
            if has_all {
                compliant += 1;
            } else if non_compliant.len() < MAX_MISSING_TAG_RESOURCES {
                non_compliant.push(resource.ocid.clone());
            } else {
                truncated = true;
            }
        }

        match page.next_cursor {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    let percentage = if total == 0 {
        0.0
    } else {
        ((compliant as f64 / total as f64) * 10000.0).round() / 100.0
    };

    Ok(TagReport {
        total_resources: total,
        compliant_resources: compliant,
        percentage,
        tag_counts,
        non_compliant_resources: non_compliant,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket(ocid: &str, public_access: &str) -> Resource {
        Resource {
            snapshot_id: Uuid::new_v4(),
            ocid: ocid.to_string(),
            resource_type: "storage/bucket".to_string(),
            display_name: None,
            compartment_id: None,
            lifecycle_state: None,
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data: json!({"namespace": "ns1", "publicAccessType": public_access}),
        }
    }

    #[test]
    fn public_bucket_yields_critical_finding() {
        let resource = bucket("ocid1.bucket.1", "ObjectRead");
        let findings = resource_findings(&resource, &HashSet::new(), &HashSet::new(), &HashMap::new());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].title, "Publicly accessible bucket");
    }

    #[test]
    fn private_bucket_yields_no_finding() {
        let resource = bucket("ocid1.bucket.1", "NoPublicAccess");
        let findings = resource_findings(&resource, &HashSet::new(), &HashSet::new(), &HashMap::new());
        assert!(findings.is_empty());
    }

    #[test]
    fn instance_without_nsg_flagged() {
        let resource = Resource {
            snapshot_id: Uuid::new_v4(),
            ocid: "ocid1.instance.1".to_string(),
            resource_type: "compute/instance".to_string(),
            display_name: None,
            compartment_id: None,
            lifecycle_state: Some("RUNNING".to_string()),
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data: json!({}),
        };
        let findings = resource_findings(&resource, &HashSet::new(), &HashSet::new(), &HashMap::new());
        assert!(findings.iter().any(|f| f.title == "Instance without Network Security Group"));
    }

    #[test]
    fn hardcoded_password_in_user_data_detected() {
        let resource = Resource {
            snapshot_id: Uuid::new_v4(),
            ocid: "ocid1.instance.2".to_string(),
            resource_type: "compute/instance".to_string(),
            display_name: None,
            compartment_id: None,
            lifecycle_state: Some("RUNNING".to_string()),
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data: json!({"userData": "export password=hunter2"}),
        };
        let findings = resource_findings(&resource, &HashSet::new(), &HashSet::new(), &HashMap::new());
        assert!(findings.iter().any(|f| f.title == "Hardcoded password in instance userData"));
    }

    #[test]
    fn truncated_user_data_falls_back_to_blob() {
        let resource = Resource {
            snapshot_id: Uuid::new_v4(),
            ocid: "ocid1.instance.3".to_string(),
            resource_type: "compute/instance".to_string(),
            display_name: None,
            compartment_id: None,
            lifecycle_state: Some("RUNNING".to_string()),
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data: json!({"userData": "<truncated: 5000 bytes>"}),
        };
        let blobs: HashMap<String, String> =
            HashMap::from([("ocid1.instance.3".to_string(), "curl http://example.com/setup.sh | sh".to_string())]);
        let findings = resource_findings(&resource, &HashSet::new(), &HashSet::new(), &blobs);
        assert!(findings.iter().any(|f| f.title == "Insecure HTTP URL in instance userData"));
    }

    #[test]
    fn broad_tenancy_policy_flagged_high() {
        let resource = Resource {
            snapshot_id: Uuid::new_v4(),
            ocid: "ocid1.policy.1".to_string(),
            resource_type: "iam/policy".to_string(),
            display_name: None,
            compartment_id: None,
            lifecycle_state: None,
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data: json!({"statements": ["Allow group Admins to manage all-resources in tenancy"]}),
        };
        let findings = resource_findings(&resource, &HashSet::new(), &HashSet::new(), &HashMap::new());
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn run_audit_returns_empty_report_when_pre_cancelled() {
        let store = crate::store::InMemoryStore::new();
        let snapshot = cloud_inspect_types::Snapshot {
            id: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            imported_at: chrono::Utc::now(),
            owner: "tester".into(),
        };
        let id = snapshot.id;
        store.create_snapshot(snapshot).await.unwrap();
        store.insert_resources(id, vec![bucket("ocid1.bucket.1", "ObjectRead")]).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = run_audit(&store, id, &cancel).await.unwrap();
        assert!(report.grouped_findings.is_empty());
    }
}
