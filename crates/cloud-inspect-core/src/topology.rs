//! Topology builder (§4.4): four views over the resource graph, each
//! capped at [`MAX_TOPOLOGY_NODES`] with a priority-ordered truncation
//! strategy and a handful of synthetic nodes (`Internet`, `OracleServices`,
//! instance-summary buckets).

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cloud_inspect_types::{
    RelationType, Resource, ResourceRelation, TopologyEdge, TopologyNode, TopologyResult, ViewType,
};

use crate::config::MAX_TOPOLOGY_NODES;
use crate::error::StoreError;
use crate::store::{ResourceFilter, ResourceStore};

const NETWORK_INFRA_TYPES: &[&str] = &[
    "network/vcn",
    "network/subnet",
    "network/internet-gateway",
    "network/nat-gateway",
    "network/service-gateway",
    "network/local-peering-gateway",
    "network/drg",
    "network/route-table",
    "network/security-list",
    "network/nsg",
    "network/load-balancer",
    "container/cluster",
    "container/node-pool",
    "serverless/application",
    "serverless/api-gateway",
];

/// Non-instance workload types the EXPOSURE view also includes when their
/// placement resolves into an exposed subnet (§4.4 EXPOSURE view).
const EXPOSURE_NON_INSTANCE_TYPES: &[&str] = &[
    "database/db-system",
    "database/database",
    "database/autonomous-database",
    "container/cluster",
    "container/node-pool",
    "compute/container-instance",
    "serverless/application",
    "serverless/api-gateway",
];

const DEPENDENCY_TYPES: &[&str] = &[
    "compute/instance",
    "database/db-system",
    "database/database",
    "database/autonomous-database",
    "network/load-balancer",
    "container/cluster",
    "container/node-pool",
    "serverless/function",
    "serverless/application",
    "storage/bucket",
    "storage/file-system",
    "security/vault",
    "dns/zone",
    "iam/policy",
];

fn priority_for(resource_type: &str) -> u8 {
    match resource_type {
        "network/vcn" => 0,
        "network/subnet" => 1,
        "network/load-balancer" => 3,
        t if t.starts_with("network/") => 2,
        t if t.starts_with("database/") || t.starts_with("container/cluster") => 4,
        t if t.starts_with("container/") || t.starts_with("serverless/") => 5,
        _ => 6,
    }
}

fn node_type_for(resource_type: &str) -> &'static str {
    match resource_type {
        "network/vcn" => "vcnNode",
        "network/subnet" => "subnetNode",
        "network/internet-gateway" | "network/nat-gateway" | "network/service-gateway" | "network/local-peering-gateway" | "network/drg" => "gatewayNode",
        "network/route-table" => "routeTableNode",
        "network/security-list" => "securityListNode",
        "network/nsg" => "nsgNode",
        "network/load-balancer" => "loadBalancerNode",
        "compute/instance" => "instanceNode",
        "container/cluster" | "container/node-pool" => "containerNode",
        "serverless/function" | "serverless/application" | "serverless/api-gateway" => "serverlessNode",
        "storage/bucket" | "storage/file-system" => "storageNode",
        "database/db-system" | "database/database" | "database/autonomous-database" | "database/nosql-table" => "databaseNode",
        "security/vault" | "security/key" => "vaultNode",
        "dns/zone" | "dns/record" => "dnsNode",
        t if t.starts_with("iam/") => "iamNode",
        _ => "resourceNode",
    }
}

fn to_node(resource: &Resource, metadata: Option<Value>, parent_id: Option<String>) -> TopologyNode {
    TopologyNode {
        id: resource.ocid.clone(),
        node_type: node_type_for(&resource.resource_type).to_string(),
        resource_type: Some(resource.resource_type.clone()),
        ocid: resource.ocid.clone(),
        label: resource.display_name.clone().unwrap_or_else(|| resource.ocid.clone()),
        parent_id,
        metadata,
    }
}

fn synthetic_node(id: &str, node_type: &str, label: &str, metadata: Option<Value>) -> TopologyNode {
    TopologyNode {
        id: id.to_string(),
        node_type: node_type.to_string(),
        resource_type: None,
        ocid: String::new(),
        label: label.to_string(),
        parent_id: None,
        metadata,
    }
}

fn parent_link(resource: &Resource) -> Option<String> {
    resource
        .raw_data
        .get("subnetId")
        .or_else(|| resource.raw_data.get("vcnId"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            resource
                .raw_data
                .get("subnetIds")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| {
            resource
                .raw_data
                .get("vnics")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(|v| v.get("subnetId"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

/// BFS over the `iam/compartment` parent→children map. Returns `None` when
/// no filter was requested.
pub fn descendant_compartments(compartments: &[Resource], compartment_id: Option<&str>) -> Option<HashSet<String>> {
    let root = compartment_id?;
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in compartments {
        if let Some(parent) = c.raw_data.get("compartmentId").and_then(Value::as_str) {
            children.entry(parent).or_default().push(&c.ocid);
        }
    }

    let mut out = HashSet::new();
    out.insert(root.to_string());
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(current) = queue.pop_front() {
        if let Some(kids) = children.get(current) {
            for &kid in kids {
                if out.insert(kid.to_string()) {
                    queue.push_back(kid);
                }
            }
        }
    }
    Some(out)
}

fn route_table_is_internet_exposed(route_table: &Resource, gateway_ids: &HashSet<String>) -> bool {
    route_table
        .raw_data
        .get("routeRules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|r| r.get("networkEntityId").and_then(Value::as_str))
                .any(|id| gateway_ids.contains(id))
        })
        .unwrap_or(false)
}

/// A gateway is "routed-to" only when some route table's rule has a
/// `networkEntityId` equal to its own OCID — not merely a member of a
/// combined gateway-id set (§4.4 point 5).
fn gateway_is_routed_to(route_tables: &[&Resource], gateway_id: &str) -> bool {
    route_tables.iter().any(|rt| {
        rt.raw_data
            .get("routeRules")
            .and_then(Value::as_array)
            .map(|rules| rules.iter().filter_map(|r| r.get("networkEntityId").and_then(Value::as_str)).any(|id| id == gateway_id))
            .unwrap_or(false)
    })
}

/// The subset of `gateway_ids` that some route table is individually
/// routed to.
fn routed_subset(route_tables: &[&Resource], gateway_ids: &HashSet<String>) -> HashSet<String> {
    gateway_ids.iter().filter(|id| gateway_is_routed_to(route_tables, id)).cloned().collect()
}

fn empty_topology_result() -> TopologyResult {
    TopologyResult { nodes: Vec::new(), edges: Vec::new(), total_count: 0, truncated: false }
}

/// Build one of the four topology views for a snapshot (§4.4). Checked for
/// cancellation at the two major phase boundaries (scope resolution, view
/// build); on cancellation an empty result is returned and partial state is
/// discarded (§5).
#[tracing::instrument(skip(store, cancel))]
pub async fn build_topology(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
    compartment_id: Option<&str>,
    view_type: ViewType,
    cancel: &CancellationToken,
) -> Result<TopologyResult, StoreError> {
    if cancel.is_cancelled() {
        return Ok(empty_topology_result());
    }

    let scope = match compartment_id {
        Some(id) => {
            let compartments = store.list_all(snapshot_id, &ResourceFilter::of_type("iam/compartment")).await?;
            descendant_compartments(&compartments, Some(id))
        }
        None => None,
    };

    if cancel.is_cancelled() {
        return Ok(empty_topology_result());
    }

    match view_type {
        ViewType::Network => build_network_view(store, snapshot_id, scope.as_ref()).await,
        ViewType::Compartment => build_compartment_view(store, snapshot_id).await,
        ViewType::Dependency => build_dependency_view(store, snapshot_id, scope.as_ref()).await,
        ViewType::Exposure => build_exposure_view(store, snapshot_id, scope.as_ref()).await,
    }
}

fn in_scope(resource: &Resource, scope: Option<&HashSet<String>>) -> bool {
    match (scope, &resource.compartment_id) {
        (Some(scope), Some(c)) => scope.contains(c),
        (Some(_), None) => false,
        (None, _) => true,
    }
}

async fn relations_within(store: &dyn ResourceStore, snapshot_id: Uuid, ids: &HashSet<String>) -> Result<Vec<ResourceRelation>, StoreError> {
    Ok(store
        .relations_for_snapshot(snapshot_id)
        .await?
        .into_iter()
        .filter(|r| ids.contains(&r.from_ocid) && ids.contains(&r.to_ocid))
        .collect())
}

fn edges_from_relations(relations: &[ResourceRelation]) -> Vec<TopologyEdge> {
    relations
        .iter()
        .enumerate()
        .map(|(i, r)| TopologyEdge {
            id: format!("edge-{i}"),
            source: r.from_ocid.clone(),
            target: r.to_ocid.clone(),
            label: None,
            relation_type: Some(r.relation_type),
            animated: r.relation_type == RelationType::RoutesVia,
        })
        .collect()
}

async fn build_network_view(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
    scope: Option<&HashSet<String>>,
) -> Result<TopologyResult, StoreError> {
    let infra_filter = ResourceFilter::of_types(NETWORK_INFRA_TYPES.iter().map(|s| s.to_string()));
    let mut infra: Vec<Resource> = store
        .list_all(snapshot_id, &infra_filter)
        .await?
        .into_iter()
        .filter(|r| in_scope(r, scope))
        .collect();

    let instances: Vec<Resource> = store
        .list_all(snapshot_id, &ResourceFilter::of_type("compute/instance"))
        .await?
        .into_iter()
        .filter(|r| in_scope(r, scope))
        .collect();

    let total_count = infra.len() + instances.len();
    let mut truncated = false;

    let mut nodes = Vec::new();

    if infra.len() + instances.len() > MAX_TOPOLOGY_NODES {
        if infra.len() > MAX_TOPOLOGY_NODES {
            infra.sort_by_key(|r| priority_for(&r.resource_type));
            infra.truncate(MAX_TOPOLOGY_NODES);
            truncated = true;
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for instance in &instances {
            let bucket = parent_link(instance).unwrap_or_else(|| "unplaced".to_string());
            *counts.entry(bucket).or_insert(0) += 1;
        }
        for (bucket, count) in counts {
            let id = format!("instance-summary-{bucket}");
            nodes.push(synthetic_node(
                &id,
                "instanceSummaryNode",
                &format!("{count} instances"),
                Some(json!({"instanceCount": count})),
            ));
        }
        truncated = true;
    } else {
        for instance in &instances {
            nodes.push(to_node(instance, None, parent_link(instance)));
        }
    }

    for resource in &infra {
        let parent = parent_link(resource);
        nodes.push(to_node(resource, None, parent));
    }

    let enabled_igw_ids: HashSet<String> = infra
        .iter()
        .filter(|r| r.resource_type == "network/internet-gateway" && r.raw_data.get("isEnabled").and_then(Value::as_bool).unwrap_or(true))
        .map(|r| r.ocid.clone())
        .collect();
    let unblocked_nat_ids: HashSet<String> = infra
        .iter()
        .filter(|r| r.resource_type == "network/nat-gateway" && !r.raw_data.get("blockTraffic").and_then(Value::as_bool).unwrap_or(false))
        .map(|r| r.ocid.clone())
        .collect();
    let active_sgw_ids: HashSet<String> = infra
        .iter()
        .filter(|r| r.resource_type == "network/service-gateway" && !r.raw_data.get("blockTraffic").and_then(Value::as_bool).unwrap_or(false))
        .map(|r| r.ocid.clone())
        .collect();

    let route_tables: Vec<&Resource> = infra.iter().filter(|r| r.resource_type == "network/route-table").collect();
    let routed_igw_ids = routed_subset(&route_tables, &enabled_igw_ids);
    let routed_nat_ids = routed_subset(&route_tables, &unblocked_nat_ids);
    let routed_sgw_ids = routed_subset(&route_tables, &active_sgw_ids);

    // IGW and NAT are independent internet-exposure triggers — a NAT-only
    // topology with no internet gateway at all must still be exposed.
    let internet_exposed = !routed_igw_ids.is_empty() || !routed_nat_ids.is_empty();
    let lb_public = infra
        .iter()
        .any(|r| r.resource_type == "network/load-balancer" && r.raw_data.get("isPrivate").and_then(Value::as_bool) == Some(false));
    let sgw_exposed = !routed_sgw_ids.is_empty();

    let mut edges = Vec::new();
    let node_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

    if internet_exposed || lb_public {
        nodes.push(synthetic_node("internet", "internetNode", "Internet", None));
        for gw in infra.iter().filter(|r| routed_igw_ids.contains(&r.ocid) || routed_nat_ids.contains(&r.ocid)) {
            if node_ids.contains(&gw.ocid) {
                edges.push(TopologyEdge {
                    id: format!("edge-internet-{}", gw.ocid),
                    source: gw.ocid.clone(),
                    target: "internet".to_string(),
                    label: None,
                    relation_type: None,
                    animated: false,
                });
            }
        }
    }
    if sgw_exposed {
        nodes.push(synthetic_node("oracle-services", "oracleServicesNode", "Oracle Services", None));
        for gw in infra.iter().filter(|r| routed_sgw_ids.contains(&r.ocid)) {
            if node_ids.contains(&gw.ocid) {
                edges.push(TopologyEdge {
                    id: format!("edge-oracle-{}", gw.ocid),
                    source: gw.ocid.clone(),
                    target: "oracle-services".to_string(),
                    label: None,
                    relation_type: None,
                    animated: false,
                });
            }
        }
    }

    let selected_ids: HashSet<String> = node_ids;
    let relations = relations_within(store, snapshot_id, &selected_ids).await?;
    edges.extend(edges_from_relations(&relations));

    Ok(TopologyResult { nodes, edges, total_count, truncated })
}

async fn build_compartment_view(store: &dyn ResourceStore, snapshot_id: Uuid) -> Result<TopologyResult, StoreError> {
    let compartments = store.list_all(snapshot_id, &ResourceFilter::of_type("iam/compartment")).await?;
    let all_relations = store.relations_for_snapshot(snapshot_id).await?;

    let mut resource_counts_by_compartment: HashMap<String, HashMap<String, usize>> = HashMap::new();
    let all_resources = store.list_all(snapshot_id, &ResourceFilter::all()).await?;
    for resource in &all_resources {
        if let Some(compartment) = &resource.compartment_id {
            *resource_counts_by_compartment
                .entry(compartment.clone())
                .or_default()
                .entry(resource.resource_type.clone())
                .or_insert(0) += 1;
        }
    }

    let total_count = compartments.len();
    let truncated = compartments.len() > MAX_TOPOLOGY_NODES;

    let nodes: Vec<TopologyNode> = compartments
        .iter()
        .take(MAX_TOPOLOGY_NODES)
        .map(|c| {
            let counts = resource_counts_by_compartment.get(&c.ocid).cloned().unwrap_or_default();
            let total: usize = counts.values().sum();
            to_node(
                c,
                Some(json!({"resourceCounts": counts, "totalResources": total})),
                c.raw_data.get("compartmentId").and_then(Value::as_str).map(str::to_string),
            )
        })
        .collect();

    let node_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let mut edges: Vec<TopologyEdge> = Vec::new();
    for relation in all_relations.iter().filter(|r| matches!(r.relation_type, RelationType::Parent | RelationType::Contains)) {
        if node_ids.contains(&relation.from_ocid) && node_ids.contains(&relation.to_ocid) {
            edges.push(TopologyEdge {
                id: format!("edge-{}-{}", relation.from_ocid, relation.to_ocid),
                source: relation.from_ocid.clone(),
                target: relation.to_ocid.clone(),
                label: None,
                relation_type: Some(relation.relation_type),
                animated: false,
            });
        }
    }

    let compartment_of: HashMap<&str, &str> = all_resources
        .iter()
        .filter_map(|r| r.compartment_id.as_deref().map(|c| (r.ocid.as_str(), c)))
        .collect();

    let mut cross_deps: HashMap<(String, String), HashMap<String, usize>> = HashMap::new();
    for relation in all_relations.iter().filter(|r| !matches!(r.relation_type, RelationType::Parent | RelationType::Contains)) {
        let (Some(&from_c), Some(&to_c)) = (compartment_of.get(relation.from_ocid.as_str()), compartment_of.get(relation.to_ocid.as_str())) else {
            continue;
        };
        if from_c == to_c {
            continue;
        }
        let mut pair = [from_c.to_string(), to_c.to_string()];
        pair.sort();
        let [a, b] = pair;
        *cross_deps.entry((a, b)).or_default().entry(format!("{:?}", relation.relation_type)).or_insert(0) += 1;
    }

    for ((a, b), by_type) in cross_deps {
        if !(node_ids.contains(&a) && node_ids.contains(&b)) {
            continue;
        }
        let total: usize = by_type.values().sum();
        let top_type = by_type.into_iter().max_by_key(|(_, n)| *n).map(|(t, _)| t).unwrap_or_default();
        edges.push(TopologyEdge {
            id: format!("edge-dep-{a}-{b}"),
            source: a,
            target: b,
            label: Some(format!("{total} deps ({top_type})")),
            relation_type: None,
            animated: false,
        });
    }

    Ok(TopologyResult { nodes, edges, total_count, truncated })
}

async fn build_dependency_view(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
    scope: Option<&HashSet<String>>,
) -> Result<TopologyResult, StoreError> {
    let filter = ResourceFilter::of_types(DEPENDENCY_TYPES.iter().map(|s| s.to_string()));
    let mut resources: Vec<Resource> = store
        .list_all(snapshot_id, &filter)
        .await?
        .into_iter()
        .filter(|r| in_scope(r, scope))
        .collect();

    let total_count = resources.len();
    let mut truncated = false;

    if resources.len() > MAX_TOPOLOGY_NODES {
        let ids: HashSet<String> = resources.iter().map(|r| r.ocid.clone()).collect();
        let relations = relations_within(store, snapshot_id, &ids).await?;
        let referenced: HashSet<String> = relations.iter().flat_map(|r| [r.from_ocid.clone(), r.to_ocid.clone()]).collect();
        resources.retain(|r| referenced.contains(&r.ocid));
        resources.truncate(MAX_TOPOLOGY_NODES);
        truncated = true;
    }

    let nodes: Vec<TopologyNode> = resources.iter().map(|r| to_node(r, None, None)).collect();
    let node_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let relations = relations_within(store, snapshot_id, &node_ids).await?;
    let edges = edges_from_relations(&relations)
        .into_iter()
        .filter(|e| !matches!(e.relation_type, Some(RelationType::Contains) | Some(RelationType::Parent)))
        .collect();

    Ok(TopologyResult { nodes, edges, total_count, truncated })
}

async fn build_exposure_view(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
    scope: Option<&HashSet<String>>,
) -> Result<TopologyResult, StoreError> {
    let subnets: Vec<Resource> = store
        .list_all(snapshot_id, &ResourceFilter::of_type("network/subnet"))
        .await?
        .into_iter()
        .filter(|r| in_scope(r, scope))
        .collect();
    let route_tables: Vec<Resource> = store.list_all(snapshot_id, &ResourceFilter::of_type("network/route-table")).await?;
    let gateways: Vec<Resource> = store
        .list_all(
            snapshot_id,
            &ResourceFilter::of_types(["network/internet-gateway", "network/nat-gateway", "network/service-gateway"].iter().map(|s| s.to_string())),
        )
        .await?;

    let active_igw_nat: HashSet<String> = gateways
        .iter()
        .filter(|g| match g.resource_type.as_str() {
            "network/internet-gateway" => g.raw_data.get("isEnabled").and_then(Value::as_bool).unwrap_or(true),
            "network/nat-gateway" => !g.raw_data.get("blockTraffic").and_then(Value::as_bool).unwrap_or(false),
            _ => false,
        })
        .map(|g| g.ocid.clone())
        .collect();
    let active_sgw: HashSet<String> = gateways
        .iter()
        .filter(|g| g.resource_type == "network/service-gateway" && !g.raw_data.get("blockTraffic").and_then(Value::as_bool).unwrap_or(false))
        .map(|g| g.ocid.clone())
        .collect();

    let rt_by_id: HashMap<&str, &Resource> = route_tables.iter().map(|rt| (rt.ocid.as_str(), rt)).collect();
    let exposed_subnets: Vec<&Resource> = subnets
        .iter()
        .filter(|s| {
            let rt_id = s.raw_data.get("routeTableId").and_then(Value::as_str);
            rt_id.and_then(|id| rt_by_id.get(id)).map(|rt| route_table_is_internet_exposed(rt, &active_igw_nat)).unwrap_or(false)
        })
        .collect();
    let exposed_subnet_ids: HashSet<String> = exposed_subnets.iter().map(|s| s.ocid.clone()).collect();
    let exposed_vcn_ids: HashSet<String> = exposed_subnets.iter().filter_map(|s| s.raw_data.get("vcnId").and_then(Value::as_str)).map(str::to_string).collect();

    let vcns: Vec<Resource> = store.list_all(snapshot_id, &ResourceFilter::of_type("network/vcn")).await?;
    let lbs: Vec<Resource> = store.list_all(snapshot_id, &ResourceFilter::of_type("network/load-balancer")).await?;
    let instances: Vec<Resource> = store.list_all(snapshot_id, &ResourceFilter::of_type("compute/instance")).await?;
    let non_instance_members: Vec<Resource> = store
        .list_all(snapshot_id, &ResourceFilter::of_types(EXPOSURE_NON_INSTANCE_TYPES.iter().map(|s| s.to_string())))
        .await?
        .into_iter()
        .filter(|r| in_scope(r, scope))
        .filter(|r| parent_link(r).map(|p| exposed_subnet_ids.contains(&p)).unwrap_or(false))
        .collect();

    let mut nodes = Vec::new();
    for vcn in vcns.iter().filter(|v| exposed_vcn_ids.contains(&v.ocid)) {
        nodes.push(to_node(vcn, None, None));
    }
    for subnet in &exposed_subnets {
        nodes.push(to_node(subnet, None, subnet.raw_data.get("vcnId").and_then(Value::as_str).map(str::to_string)));
    }
    for gw in gateways.iter().filter(|g| active_igw_nat.contains(&g.ocid)) {
        nodes.push(to_node(gw, None, None));
    }
    for lb in lbs.iter().filter(|l| l.raw_data.get("isPrivate").and_then(Value::as_bool) == Some(false)) {
        nodes.push(to_node(lb, None, None));
    }

    for member in &non_instance_members {
        nodes.push(to_node(member, None, parent_link(member)));
    }

    let exposed_instances: Vec<&Resource> = instances
        .iter()
        .filter(|i| parent_link(i).map(|p| exposed_subnet_ids.contains(&p)).unwrap_or(false))
        .collect();
    let total_count = exposed_instances.len() + nodes.len();
    let mut truncated = false;
    if exposed_instances.len() > crate::config::MAX_EXPOSURE_INSTANCES {
        for instance in exposed_instances.iter().take(crate::config::MAX_EXPOSURE_INSTANCES) {
            nodes.push(to_node(instance, None, parent_link(instance)));
        }
        nodes.push(synthetic_node(
            "exposure-overflow",
            "instanceSummaryNode",
            "additional exposed instances",
            Some(json!({"instanceCount": exposed_instances.len() - crate::config::MAX_EXPOSURE_INSTANCES})),
        ));
        truncated = true;
    } else {
        for instance in &exposed_instances {
            nodes.push(to_node(instance, None, parent_link(instance)));
        }
    }

    if active_sgw.is_empty() {
        // no SGW activity, nothing further to add
    } else {
        nodes.push(synthetic_node("oracle-services", "oracleServicesNode", "Oracle Services", None));
        for gw in gateways.iter().filter(|g| active_sgw.contains(&g.ocid)) {
            nodes.push(to_node(gw, None, None));
        }
    }
    if !active_igw_nat.is_empty() {
        nodes.push(synthetic_node("internet", "internetNode", "Internet", None));
    }

    let node_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let mut edges = Vec::new();
    for gw in gateways.iter().filter(|g| active_igw_nat.contains(&g.ocid) && node_ids.contains(&g.ocid)) {
        edges.push(TopologyEdge {
            id: format!("edge-internet-{}", gw.ocid),
            source: gw.ocid.clone(),
            target: "internet".to_string(),
            label: None,
            relation_type: None,
            animated: false,
        });
    }
    for gw in gateways.iter().filter(|g| active_sgw.contains(&g.ocid) && node_ids.contains(&g.ocid)) {
        edges.push(TopologyEdge {
            id: format!("edge-oracle-{}", gw.ocid),
            source: gw.ocid.clone(),
            target: "oracle-services".to_string(),
            label: None,
            relation_type: None,
            animated: false,
        });
    }
    let relations = relations_within(store, snapshot_id, &node_ids).await?;
    edges.extend(edges_from_relations(&relations));

    Ok(TopologyResult { nodes, edges, total_count, truncated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::store::InMemoryStore;
    use cloud_inspect_types::Snapshot;

    fn resource(snapshot_id: Uuid, ocid: &str, resource_type: &str, raw_data: Value, compartment_id: Option<&str>) -> Resource {
        Resource {
            snapshot_id,
            ocid: ocid.to_string(),
            resource_type: resource_type.to_string(),
            display_name: Some(ocid.to_string()),
            compartment_id: compartment_id.map(str::to_string),
            lifecycle_state: None,
            availability_domain: None,
            region_key: None,
            time_created: None,
            defined_tags: None,
            freeform_tags: None,
            raw_data,
        }
    }

    async fn seeded_store() -> (InMemoryStore, Uuid) {
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

        let vcn = resource(id, "vcn-1", "network/vcn", json!({"cidrBlock": "10.0.0.0/16", "defaultRouteTableId": "rt-1"}), None);
        let subnet = resource(id, "subnet-1", "network/subnet", json!({"vcnId": "vcn-1", "routeTableId": "rt-1", "cidrBlock": "10.0.1.0/24"}), None);
        let rt = resource(
            id,
            "rt-1",
            "network/route-table",
            json!({"routeRules": [{"destination": "0.0.0.0/0", "networkEntityId": "igw-1"}]}),
            None,
        );
        let igw = resource(id, "igw-1", "network/internet-gateway", json!({"vcnId": "vcn-1", "isEnabled": true}), None);
        let instance = resource(id, "instance-1", "compute/instance", json!({"subnetId": "subnet-1", "imageId": "image-1"}), None);

        store.insert_resources(id, vec![vcn, subnet, rt, igw, instance]).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn network_view_includes_internet_node_when_igw_routed() {
        let (store, id) = seeded_store().await;
        let result = build_topology(&store, id, None, ViewType::Network, &CancellationToken::new()).await.unwrap();
        assert!(result.nodes.iter().any(|n| n.id == "internet"));
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn network_view_exposes_internet_via_routed_nat_with_no_igw() {
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

        let vcn = resource(id, "vcn-1", "network/vcn", json!({"cidrBlock": "10.0.0.0/16"}), None);
        let subnet = resource(id, "subnet-1", "network/subnet", json!({"vcnId": "vcn-1", "routeTableId": "rt-1", "cidrBlock": "10.0.1.0/24"}), None);
        let rt = resource(
            id,
            "rt-1",
            "network/route-table",
            json!({"routeRules": [{"destination": "0.0.0.0/0", "networkEntityId": "nat-1"}]}),
            None,
        );
        let nat = resource(id, "nat-1", "network/nat-gateway", json!({"vcnId": "vcn-1", "blockTraffic": false}), None);
        store.insert_resources(id, vec![vcn, subnet, rt, nat]).await.unwrap();

        let result = build_topology(&store, id, None, ViewType::Network, &CancellationToken::new()).await.unwrap();
        assert!(result.nodes.iter().any(|n| n.id == "internet"));
        assert!(result.edges.iter().any(|e| e.source == "nat-1" && e.target == "internet"));
    }

    #[tokio::test]
    async fn exposure_view_includes_exposed_subnet_and_instance() {
        let (store, id) = seeded_store().await;
        let result = build_topology(&store, id, None, ViewType::Exposure, &CancellationToken::new()).await.unwrap();
        assert!(result.nodes.iter().any(|n| n.id == "subnet-1"));
        assert!(result.nodes.iter().any(|n| n.id == "instance-1"));
    }

    #[tokio::test]
    async fn exposure_view_includes_non_instance_member_in_exposed_subnet() {
        let (store, id) = seeded_store().await;
        let db = resource(id, "db-1", "database/db-system", json!({"subnetId": "subnet-1"}), None);
        store.insert_resources(id, vec![db]).await.unwrap();

        let result = build_topology(&store, id, None, ViewType::Exposure, &CancellationToken::new()).await.unwrap();
        assert!(result.nodes.iter().any(|n| n.id == "db-1"));
    }

    #[test]
    fn priority_for_ranks_load_balancer_above_other_network_types() {
        assert_eq!(priority_for("network/load-balancer"), 3);
        assert_eq!(priority_for("network/subnet"), 1);
        assert_eq!(priority_for("network/nat-gateway"), 2);
        assert_eq!(priority_for("network/vcn"), 0);
    }

    #[tokio::test]
    async fn dependency_view_excludes_network_infra() {
        let (store, id) = seeded_store().await;
        let result = build_topology(&store, id, None, ViewType::Dependency, &CancellationToken::new()).await.unwrap();
        assert!(result.nodes.iter().any(|n| n.id == "instance-1"));
        assert!(!result.nodes.iter().any(|n| n.id == "vcn-1"));
    }

    #[tokio::test]
    async fn build_topology_returns_empty_result_when_pre_cancelled() {
        let (store, id) = seeded_store().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = build_topology(&store, id, None, ViewType::Network, &cancel).await.unwrap();
        assert!(result.nodes.is_empty());
        assert!(!result.truncated);
    }

    #[test]
    fn descendant_compartments_returns_none_without_filter() {
        assert!(descendant_compartments(&[], None).is_none());
    }

    #[test]
    fn descendant_compartments_bfs_includes_root_and_children() {
        let id = Uuid::new_v4();
        let root = resource(id, "root", "iam/compartment", json!({}), None);
        let child = resource(id, "child", "iam/compartment", json!({"compartmentId": "root"}), None);
        let grandchild = resource(id, "grandchild", "iam/compartment", json!({"compartmentId": "child"}), None);
        let result = descendant_compartments(&[root, child, grandchild], Some("root")).unwrap();
        assert_eq!(result.len(), 3);
    }
}
