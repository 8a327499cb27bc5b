//! Relation extractor (§4.3): a post-parse pass that inspects each
//! resource's `rawData` and emits typed edges. Idempotent and
//! order-insensitive — running it twice over the same resource set
//! produces the same edge set modulo relation id ordering.

use cloud_inspect_types::{RelationType, Resource, ResourceRelation};
use uuid::Uuid;

fn str_field<'a>(resource: &'a Resource, key: &str) -> Option<&'a str> {
    resource.raw_data.get(key).and_then(|v| v.as_str())
}

fn edge(
    snapshot_id: Uuid,
    from: &str,
    to: &str,
    relation_type: RelationType,
) -> ResourceRelation {
    ResourceRelation {
        snapshot_id,
        from_ocid: from.to_string(),
        to_ocid: to.to_string(),
        relation_type,
        metadata: None,
    }
}

/// Extract every relation this resource's `rawData` implies. `resources` is
/// the full resource set, used only to resolve the handful of rules that
/// need a first-element lookup (e.g. the first VNIC attachment) against a
/// subresource that may itself be represented as a separate record.
#[tracing::instrument(skip(resources))]
pub fn extract_relations(snapshot_id: Uuid, resources: &[Resource]) -> Vec<ResourceRelation> {
    let mut out = Vec::new();

    for resource in resources {
        match resource.resource_type.as_str() {
            "network/subnet" => {
                if let Some(vcn_id) = str_field(resource, "vcnId") {
                    out.push(edge(snapshot_id, &resource.ocid, vcn_id, RelationType::SubnetMember));
                }
                let route_table = str_field(resource, "routeTableId");
                if let Some(rt_id) = route_table {
                    out.push(edge(snapshot_id, &resource.ocid, rt_id, RelationType::RoutesVia));
                }
                if let Some(sl_ids) = resource.raw_data.get("securityListIds").and_then(|v| v.as_array()) {
                    for sl in sl_ids.iter().filter_map(|v| v.as_str()) {
                        out.push(edge(snapshot_id, &resource.ocid, sl, RelationType::SecuredBy));
                    }
                }
            }
            "compute/instance" | "compute/container-instance" => {
                if let Some(subnet_id) = first_vnic_subnet(resource) {
                    out.push(edge(snapshot_id, &resource.ocid, &subnet_id, RelationType::SubnetMember));
                }
                if let Some(image_id) = str_field(resource, "imageId") {
                    out.push(edge(snapshot_id, &resource.ocid, image_id, RelationType::UsesImage));
                }
            }
            "container/node-pool" => {
                if let Some(subnet_id) = first_placement_subnet(resource) {
                    out.push(edge(snapshot_id, &resource.ocid, &subnet_id, RelationType::SubnetMember));
                }
                if let Some(cluster_id) = str_field(resource, "clusterId") {
                    out.push(edge(snapshot_id, &resource.ocid, cluster_id, RelationType::DeployedTo));
                }
            }
            "network/load-balancer" => {
                if let Some(backends) = backend_ocids(resource) {
                    for backend in backends {
                        out.push(edge(snapshot_id, &resource.ocid, &backend, RelationType::LbBackend));
                    }
                }
                if let Some(subnet_ids) = resource.raw_data.get("subnetIds").and_then(|v| v.as_array()) {
                    for subnet in subnet_ids.iter().filter_map(|v| v.as_str()) {
                        out.push(edge(snapshot_id, &resource.ocid, subnet, RelationType::SubnetMember));
                    }
                }
            }
            "network/internet-gateway"
            | "network/nat-gateway"
            | "network/service-gateway"
            | "network/local-peering-gateway"
            | "network/drg" => {
                if let Some(vcn_id) = str_field(resource, "vcnId") {
                    out.push(edge(snapshot_id, &resource.ocid, vcn_id, RelationType::GatewayFor));
                }
            }
            "iam/compartment" => {
                if let Some(parent_id) = str_field(resource, "compartmentId") {
                    out.push(edge(snapshot_id, parent_id, &resource.ocid, RelationType::Contains));
                    out.push(edge(snapshot_id, &resource.ocid, parent_id, RelationType::Parent));
                }
            }
            "iam/group" | "iam/dynamic-group" => {
                if let Some(members) = resource.raw_data.get("memberIds").and_then(|v| v.as_array()) {
                    for member in members.iter().filter_map(|v| v.as_str()) {
                        out.push(edge(snapshot_id, member, &resource.ocid, RelationType::MemberOf));
                    }
                }
            }
            "iam/policy" => {
                if let Some(groups) = resource.raw_data.get("appliesToGroupIds").and_then(|v| v.as_array()) {
                    for group in groups.iter().filter_map(|v| v.as_str()) {
                        out.push(edge(snapshot_id, &resource.ocid, group, RelationType::Groups));
                    }
                }
            }
            "compute/block-volume" | "compute/boot-volume" => {
                if let Some(attached_to) = str_field(resource, "attachedInstanceId") {
                    out.push(edge(snapshot_id, &resource.ocid, attached_to, RelationType::VolumeAttached));
                }
            }
            "network/nsg" => {
                if let Some(members) = resource.raw_data.get("memberIds").and_then(|v| v.as_array()) {
                    for member in members.iter().filter_map(|v| v.as_str()) {
                        out.push(edge(snapshot_id, member, &resource.ocid, RelationType::NsgMember));
                    }
                }
            }
            _ => {}
        }

        if let Some(vcn_id) = str_field(resource, "vcnId") {
            if resource.resource_type.starts_with("container/") {
                out.push(edge(snapshot_id, &resource.ocid, vcn_id, RelationType::UsesVcn));
            }
        }
    }

    out
}

fn first_vnic_subnet(resource: &Resource) -> Option<String> {
    if let Some(subnet_id) = str_field(resource, "subnetId") {
        return Some(subnet_id.to_string());
    }
    resource
        .raw_data
        .get("vnics")
        .and_then(|v| v.as_array())
        .and_then(|vnics| vnics.first())
        .and_then(|vnic| vnic.get("subnetId"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn first_placement_subnet(resource: &Resource) -> Option<String> {
    resource
        .raw_data
        .get("nodeConfigDetails")
        .and_then(|v| v.get("placementConfigs"))
        .or_else(|| resource.raw_data.get("placementConfigs"))
        .and_then(|v| v.as_array())
        .and_then(|configs| configs.first())
        .and_then(|cfg| cfg.get("subnetId"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn backend_ocids(resource: &Resource) -> Option<Vec<String>> {
    let backend_sets = resource.raw_data.get("backendSets")?.as_object()?;
    let mut out = Vec::new();
    for set in backend_sets.values() {
        if let Some(backends) = set.get("backends").and_then(|v| v.as_array()) {
            for backend in backends {
                if let Some(id) = backend.get("ocid").or_else(|| backend.get("name")).and_then(|v| v.as_str()) {
                    out.push(id.to_string());
                }
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(snapshot_id: Uuid, ocid: &str, resource_type: &str, raw_data: serde_json::Value) -> Resource {
        Resource {
            snapshot_id,
            ocid: ocid.to_string(),
            resource_type: resource_type.to_string(),
            display_name: None,
            compartment_id: None,
            lifecycle_state: None,
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data,
        }
    }

    #[test]
    fn subnet_emits_vcn_route_table_and_security_list_edges() {
        let sid = Uuid::new_v4();
        let subnet = resource(
            sid,
            "ocid1.subnet.1",
            "network/subnet",
            json!({"vcnId": "ocid1.vcn.1", "routeTableId": "ocid1.rt.1", "securityListIds": ["ocid1.sl.1", "ocid1.sl.2"]}),
        );
        let rels = extract_relations(sid, &[subnet]);
        assert!(rels.iter().any(|r| r.to_ocid == "ocid1.vcn.1" && r.relation_type == RelationType::SubnetMember));
        assert!(rels.iter().any(|r| r.to_ocid == "ocid1.rt.1" && r.relation_type == RelationType::RoutesVia));
        assert_eq!(rels.iter().filter(|r| r.relation_type == RelationType::SecuredBy).count(), 2);
    }

    #[test]
    fn instance_resolves_subnet_via_first_vnic() {
        let sid = Uuid::new_v4();
        let instance = resource(
            sid,
            "ocid1.instance.1",
            "compute/instance",
            json!({"imageId": "ocid1.image.1", "vnics": [{"subnetId": "ocid1.subnet.1"}, {"subnetId": "ocid1.subnet.2"}]}),
        );
        let rels = extract_relations(sid, &[instance]);
        assert!(rels.iter().any(|r| r.to_ocid == "ocid1.subnet.1" && r.relation_type == RelationType::SubnetMember));
        assert!(!rels.iter().any(|r| r.to_ocid == "ocid1.subnet.2"));
        assert!(rels.iter().any(|r| r.to_ocid == "ocid1.image.1" && r.relation_type == RelationType::UsesImage));
    }

    #[test]
    fn compartment_emits_contains_and_parent() {
        let sid = Uuid::new_v4();
        let child = resource(sid, "ocid1.compartment.child", "iam/compartment", json!({"compartmentId": "ocid1.compartment.root"}));
        let rels = extract_relations(sid, &[child]);
        assert!(rels.iter().any(|r| r.relation_type == RelationType::Contains && r.from_ocid == "ocid1.compartment.root"));
        assert!(rels.iter().any(|r| r.relation_type == RelationType::Parent && r.from_ocid == "ocid1.compartment.child"));
    }

    #[test]
    fn load_balancer_emits_backend_edges() {
        let sid = Uuid::new_v4();
        let lb = resource(
            sid,
            "ocid1.loadbalancer.1",
            "network/load-balancer",
            json!({"backendSets": {"set1": {"backends": [{"ocid": "ocid1.instance.1"}]}}}),
        );
        let rels = extract_relations(sid, &[lb]);
        assert!(rels.iter().any(|r| r.to_ocid == "ocid1.instance.1" && r.relation_type == RelationType::LbBackend));
    }

    #[test]
    fn extraction_is_idempotent() {
        let sid = Uuid::new_v4();
        let subnet = resource(sid, "ocid1.subnet.1", "network/subnet", json!({"vcnId": "ocid1.vcn.1"}));
        let first = extract_relations(sid, &[subnet.clone()]);
        let second = extract_relations(sid, &[subnet]);
        assert_eq!(first.len(), second.len());
    }
}
