//! Reachability analyser (§4.5): three dispatch modes (pair, fan-out,
//! fan-in) over a hop/link walk through subnets, route tables, security
//! lists, NSGs, and gateways.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cloud_inspect_types::{Hop, HopStatus, HopType, Link, ReachabilityResult, Resource, Verdict};

use crate::cidr::{ip_in_cidr, longest_prefix_match, parse_cidr, Route};
use crate::error::StoreError;
use crate::store::{ResourceFilter, ResourceStore};

const NETWORK_TYPES: &[&str] = &[
    "network/vcn",
    "network/subnet",
    "network/route-table",
    "network/security-list",
    "network/nsg",
    "network/internet-gateway",
    "network/nat-gateway",
    "network/service-gateway",
    "network/local-peering-gateway",
    "network/drg",
];

const REPRESENTATIVE_EXTERNAL_IP: &str = "8.8.8.8";

/// Reachability query parameters. `source_ip`/`destination_ip` select the
/// dispatch mode; `"internet"` and `"0.0.0.0/0"` are both recognised as the
/// internet destination.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityQuery {
    /// Source address, if any.
    pub source_ip: Option<String>,
    /// Destination address, if any (may be `"internet"`/`"0.0.0.0/0"`).
    pub destination_ip: Option<String>,
    /// Decimal protocol number as a string (`"6"` TCP, `"17"` UDP, `"1"` ICMP).
    pub protocol: Option<String>,
    /// Destination port, if applicable.
    pub port: Option<u16>,
}

fn is_internet_destination(dest: &str) -> bool {
    dest == "internet" || dest == "0.0.0.0/0"
}

struct Walker<'a> {
    resources: HashMap<&'a str, &'a Resource>,
    hops: Vec<Hop>,
    links: Vec<Link>,
    next_id: usize,
}

impl<'a> Walker<'a> {
    fn new(resources: HashMap<&'a str, &'a Resource>) -> Self {
        Self {
            resources,
            hops: Vec::new(),
            links: Vec::new(),
            next_id: 0,
        }
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn push_hop(
        &mut self,
        hop_type: HopType,
        label: impl Into<String>,
        resource: Option<&Resource>,
        status: HopStatus,
        details: Option<String>,
    ) -> String {
        let id = self.fresh_id(&format!("{hop_type:?}").to_lowercase());
        self.hops.push(Hop {
            id: id.clone(),
            hop_type,
            label: label.into(),
            resource_type: resource.map(|r| r.resource_type.clone()),
            ocid: resource.map(|r| r.ocid.clone()),
            status,
            details,
            metadata: None,
        });
        id
    }

    fn link(&mut self, source: &str, target: &str, label: Option<String>) {
        let source_status = self.hops.iter().find(|h| h.id == source).map(|h| h.status);
        let target_status = self.hops.iter().find(|h| h.id == target).map(|h| h.status);
        let status = match (source_status, target_status) {
            (Some(HopStatus::Deny), _) | (_, Some(HopStatus::Deny)) => HopStatus::Deny,
            (Some(HopStatus::Unknown), _) | (_, Some(HopStatus::Unknown)) => HopStatus::Unknown,
            _ => HopStatus::Allow,
        };
        let id = self.fresh_id("link");
        self.links.push(Link {
            id,
            source: source.to_string(),
            target: target.to_string(),
            status,
            label,
        });
    }

    fn resource(&self, ocid: &str) -> Option<&&'a Resource> {
        self.resources.get(ocid)
    }
}

fn find_subnet_containing_ip<'a>(resources: &HashMap<&'a str, &'a Resource>, ip: &str) -> Option<&'a Resource> {
    resources
        .values()
        .filter(|r| r.resource_type == "network/subnet")
        .find(|r| {
            r.raw_data
                .get("cidrBlock")
                .and_then(Value::as_str)
                .and_then(parse_cidr)
                .map(|cidr| ip_in_cidr(ip, &cidr))
                .unwrap_or(false)
        })
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ingress,
    Egress,
}

fn rule_port_matches(rule: &Value, protocol: &str, port: Option<u16>) -> bool {
    let Some(port) = port else { return true };
    let options_key = match protocol {
        "6" => "tcpOptions",
        "17" => "udpOptions",
        _ => return true,
    };
    let Some(range) = rule.get(options_key).and_then(|o| o.get("destinationPortRange")) else {
        return true;
    };
    let min = range.get("min").and_then(Value::as_u64).unwrap_or(0) as u16;
    let max = range.get("max").and_then(Value::as_u64).unwrap_or(u16::MAX) as u16;
    port >= min && port <= max
}

fn rule_cidr_matches(rule: &Value, direction: Direction, peer_ip: &str) -> bool {
    let key = match direction {
        Direction::Ingress => "source",
        Direction::Egress => "destination",
    };
    match rule.get(key).and_then(Value::as_str) {
        Some(cidr_str) => parse_cidr(cidr_str).map(|c| ip_in_cidr(peer_ip, &c)).unwrap_or(false),
        None => true,
    }
}

/// Evaluate a rule set (security-list or NSG, same shape) in one direction.
/// First matching rule wins. Returns `(allowed, detail)`.
fn evaluate_rules(rules: &[Value], direction: Direction, peer_ip: &str, protocol: &str, port: Option<u16>) -> (bool, String) {
    for rule in rules {
        let rule_proto = rule.get("protocol").and_then(Value::as_str).unwrap_or("all");
        if rule_proto != "all" && rule_proto != protocol {
            continue;
        }
        if !rule_cidr_matches(rule, direction, peer_ip) {
            continue;
        }
        if !rule_port_matches(rule, protocol, port) {
            continue;
        }
        let side = match direction {
            Direction::Ingress => "src",
            Direction::Egress => "dest",
        };
        let cidr_desc = rule
            .get(match direction {
                Direction::Ingress => "source",
                Direction::Egress => "destination",
            })
            .and_then(Value::as_str)
            .unwrap_or("any");
        return (true, format!("proto={rule_proto}, {side}={cidr_desc}"));
    }
    (false, "no rule allows".to_string())
}

fn security_list_rules<'a>(security_list: &'a Resource, field: &str) -> Vec<Value> {
    security_list
        .raw_data
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Evaluate SL + any VCN NSG, combined disjunctively.
fn evaluate_sl_and_nsg(
    walker: &Walker<'_>,
    subnet: &Resource,
    vcn_id: &str,
    direction: Direction,
    peer_ip: &str,
    protocol: &str,
    port: Option<u16>,
) -> Vec<(HopType, HopStatus, String)> {
    let mut out = Vec::new();

    let sl_field = match direction {
        Direction::Ingress => "ingressSecurityRules",
        Direction::Egress => "egressSecurityRules",
    };

    let mut sl_allowed = false;
    let mut sl_detail = "no security list".to_string();
    if let Some(sl_ids) = subnet.raw_data.get("securityListIds").and_then(Value::as_array) {
        for sl_id in sl_ids.iter().filter_map(Value::as_str) {
            if let Some(sl) = walker.resource(sl_id) {
                let rules = security_list_rules(sl, sl_field);
                let (allowed, detail) = evaluate_rules(&rules, direction, peer_ip, protocol, port);
                if allowed {
                    sl_allowed = true;
                    sl_detail = detail;
                    break;
                }
                sl_detail = detail;
            }
        }
    }

    let nsg_field = match direction {
        Direction::Ingress => "ingress",
        Direction::Egress => "egress",
    };
    let mut nsg_allowed = false;
    let mut nsg_detail: Option<String> = None;
    for nsg in walker.resources.values().filter(|r| r.resource_type == "network/nsg" && r.raw_data.get("vcnId").and_then(Value::as_str) == Some(vcn_id)) {
        let rules: Vec<Value> = nsg
            .raw_data
            .get("securityRules")
            .and_then(Value::as_array)
            .map(|rules| {
                rules
                    .iter()
                    .filter(|r| r.get("direction").and_then(Value::as_str) == Some(nsg_field))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let (allowed, detail) = evaluate_rules(&rules, direction, peer_ip, protocol, port);
        if allowed {
            nsg_allowed = true;
            nsg_detail = Some(detail);
            break;
        }
    }

    if sl_allowed {
        out.push((HopType::Sl, HopStatus::Allow, sl_detail));
    } else if nsg_allowed {
        out.push((HopType::Sl, HopStatus::Deny, format!("{sl_detail} (SL denied, but NSG allowed)")));
        out.push((HopType::Nsg, HopStatus::Allow, nsg_detail.unwrap_or_default()));
    } else {
        out.push((HopType::Sl, HopStatus::Deny, sl_detail));
    }

    out
}

fn gateway_allows(gateway: &Resource) -> (bool, &'static str) {
    match gateway.resource_type.as_str() {
        "network/internet-gateway" => (gateway.raw_data.get("isEnabled").and_then(Value::as_bool).unwrap_or(true), "IGW"),
        "network/nat-gateway" => (!gateway.raw_data.get("blockTraffic").and_then(Value::as_bool).unwrap_or(false), "NAT"),
        "network/service-gateway" => (!gateway.raw_data.get("blockTraffic").and_then(Value::as_bool).unwrap_or(false), "SGW"),
        "network/drg" => (true, "DRG"),
        "network/local-peering-gateway" => (
            gateway.raw_data.get("peeringStatus").and_then(Value::as_str) != Some("REVOKED"),
            "LPG",
        ),
        _ => (false, "GW"),
    }
}

fn route_table_for_subnet<'a>(walker: &Walker<'a>, subnet: &Resource, vcn: Option<&Resource>) -> Option<&'a Resource> {
    if let Some(rt_id) = subnet.raw_data.get("routeTableId").and_then(Value::as_str) {
        if let Some(rt) = walker.resource(rt_id) {
            return Some(*rt);
        }
    }
    let vcn = vcn?;
    let rt_id = vcn.raw_data.get("defaultRouteTableId").and_then(Value::as_str)?;
    walker.resource(rt_id).copied()
}

fn route_targets<'a>(route_table: &'a Resource) -> Vec<Route<'a, &'a str>> {
    route_table
        .raw_data
        .get("routeRules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|r| {
                    let cidr = r.get("destination").and_then(Value::as_str)?;
                    let target = r.get("networkEntityId").and_then(Value::as_str)?;
                    Some(Route { cidr, target })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Outcome of one directed walk from a source subnet toward a destination
/// IP, shared by pair/fan-out/fan-in modes.
struct BranchOutcome {
    allow: bool,
    partial: bool,
}

/// Evaluate one branch: egress from `source_subnet`'s VCN, route resolution,
/// gateway traversal (including one level of cross-VCN recursion), and —
/// when the destination is intra-VCN — ingress at the destination subnet.
///
/// `source_ip` is the true originating client address and `dest_ip` the
/// target; ingress rules are evaluated against `source_ip` (§4.5 step 7),
/// egress rules against `dest_ip`.
#[allow(clippy::too_many_arguments)]
fn walk_branch(
    walker: &mut Walker,
    source_subnet: &Resource,
    source_ip: &str,
    dest_ip: &str,
    intra_vcn_target: Option<&Resource>,
    protocol: &str,
    port: Option<u16>,
    visited_vcns: &mut HashSet<String>,
) -> BranchOutcome {
    let vcn_id = source_subnet.raw_data.get("vcnId").and_then(Value::as_str);
    let vcn = vcn_id.and_then(|id| walker.resource(id)).copied();

    for (hop_type, status, detail) in evaluate_sl_and_nsg(
        walker,
        source_subnet,
        vcn_id.unwrap_or_default(),
        Direction::Egress,
        dest_ip,
        protocol,
        port,
    ) {
        walker.push_hop(hop_type, format!("{hop_type:?} (egress)"), None, status, Some(detail));
        if status == HopStatus::Deny {
            return BranchOutcome { allow: false, partial: false };
        }
    }

    if let Some(target) = intra_vcn_target {
        let ingress = evaluate_sl_and_nsg(walker, target, vcn_id.unwrap_or_default(), Direction::Ingress, source_ip, protocol, port);
        let mut ok = true;
        for (hop_type, status, detail) in ingress {
            walker.push_hop(hop_type, format!("{hop_type:?} (ingress)"), None, status, Some(detail));
            if status == HopStatus::Deny {
                ok = false;
            }
        }
        return BranchOutcome { allow: ok, partial: false };
    }

    let Some(route_table) = route_table_for_subnet(walker, source_subnet, vcn.as_deref()) else {
        walker.push_hop(HopType::Rt, "route table", None, HopStatus::Deny, Some("no route table".to_string()));
        return BranchOutcome { allow: false, partial: false };
    };

    let routes = route_targets(route_table);
    let matched = longest_prefix_match(dest_ip, &routes);

    let Some(&gateway_id) = matched else {
        walker.push_hop(
            HopType::Rt,
            route_table.display_name.clone().unwrap_or_else(|| "route table".to_string()),
            Some(route_table),
            HopStatus::Allow,
            Some("implicit local route".to_string()),
        );
        return BranchOutcome { allow: true, partial: false };
    };

    walker.push_hop(
        HopType::Rt,
        route_table.display_name.clone().unwrap_or_else(|| "route table".to_string()),
        Some(route_table),
        HopStatus::Allow,
        Some(format!("matched route to {gateway_id}")),
    );

    let Some(gateway) = walker.resource(gateway_id).copied() else {
        walker.push_hop(HopType::Gw, gateway_id, None, HopStatus::Unknown, Some("gateway not in snapshot".to_string()));
        return BranchOutcome { allow: false, partial: true };
    };

    let (allowed, label) = gateway_allows(gateway);
    walker.push_hop(
        HopType::Gw,
        gateway.display_name.clone().unwrap_or_else(|| label.to_string()),
        Some(gateway),
        if allowed { HopStatus::Allow } else { HopStatus::Deny },
        Some(label.to_string()),
    );
    if !allowed {
        return BranchOutcome { allow: false, partial: false };
    }

    match gateway.resource_type.as_str() {
        "network/drg" => {
            let Some(current_vcn_id) = vcn_id else {
                return BranchOutcome { allow: false, partial: true };
            };
            let target_vcn = walker
                .resources
                .values()
                .find(|r| r.resource_type == "network/vcn" && r.ocid != current_vcn_id)
                .copied();
            match target_vcn {
                Some(target_vcn) => continue_in_target_vcn(walker, target_vcn, source_ip, dest_ip, protocol, port, visited_vcns),
                None => BranchOutcome { allow: false, partial: true },
            }
        }
        "network/local-peering-gateway" => {
            let Some(peer_id) = gateway.raw_data.get("peerId").and_then(Value::as_str) else {
                return BranchOutcome { allow: false, partial: true };
            };
            let Some(peer) = walker.resource(peer_id).copied() else {
                walker.push_hop(HopType::Gw, peer_id, None, HopStatus::Unknown, Some("peer LPG not in snapshot".to_string()));
                return BranchOutcome { allow: false, partial: true };
            };
            walker.push_hop(
                HopType::Gw,
                peer.display_name.clone().unwrap_or_else(|| "peer LPG".to_string()),
                Some(peer),
                HopStatus::Allow,
                Some("peer LPG".to_string()),
            );
            let Some(peer_vcn_id) = peer.raw_data.get("vcnId").and_then(Value::as_str) else {
                return BranchOutcome { allow: false, partial: true };
            };
            match walker.resource(peer_vcn_id).copied() {
                Some(peer_vcn) => continue_in_target_vcn(walker, peer_vcn, source_ip, dest_ip, protocol, port, visited_vcns),
                None => BranchOutcome { allow: false, partial: true },
            }
        }
        _ => {
            if is_internet_destination(dest_ip) || dest_ip == REPRESENTATIVE_EXTERNAL_IP {
                walker.push_hop(HopType::Net, "Internet", None, HopStatus::Allow, None);
            } else {
                walker.push_hop(HopType::Dst, dest_ip, None, HopStatus::Allow, None);
            }
            BranchOutcome { allow: true, partial: false }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn continue_in_target_vcn(
    walker: &mut Walker,
    target_vcn: &Resource,
    source_ip: &str,
    dest_ip: &str,
    protocol: &str,
    port: Option<u16>,
    visited_vcns: &mut HashSet<String>,
) -> BranchOutcome {
    if visited_vcns.contains(&target_vcn.ocid) {
        walker.push_hop(HopType::Sub, "loop", None, HopStatus::Unknown, Some("loop detected".to_string()));
        return BranchOutcome { allow: false, partial: true };
    }
    visited_vcns.insert(target_vcn.ocid.clone());

    let Some(target_subnet) = find_subnet_containing_ip(&walker.resources, dest_ip) else {
        walker.push_hop(HopType::Sub, "target subnet", None, HopStatus::Unknown, Some("destination subnet not found".to_string()));
        return BranchOutcome { allow: false, partial: true };
    };

    walker.push_hop(
        HopType::Sub,
        target_subnet.display_name.clone().unwrap_or_else(|| "subnet".to_string()),
        Some(target_subnet),
        HopStatus::Allow,
        None,
    );

    let vcn_id = target_vcn.ocid.clone();
    let ingress = evaluate_sl_and_nsg(walker, target_subnet, &vcn_id, Direction::Ingress, source_ip, protocol, port);
    let mut ok = true;
    for (hop_type, status, detail) in ingress {
        walker.push_hop(hop_type, format!("{hop_type:?} (ingress)"), None, status, Some(detail));
        if status == HopStatus::Deny {
            ok = false;
        }
    }
    walker.push_hop(HopType::Dst, dest_ip, None, if ok { HopStatus::Allow } else { HopStatus::Deny }, None);
    BranchOutcome { allow: ok, partial: false }
}

async fn load_network_resources(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
) -> Result<Vec<Resource>, StoreError> {
    let filter = ResourceFilter::of_types(NETWORK_TYPES.iter().map(|s| s.to_string()));
    store.list_all(snapshot_id, &filter).await
}

fn unknown_result(detail: impl Into<String>) -> ReachabilityResult {
    ReachabilityResult {
        hops: Vec::new(),
        links: Vec::new(),
        verdict: Verdict::Unknown,
        verdict_detail: detail.into(),
    }
}

/// Run a reachability query against a snapshot (§4.5). Checked for
/// cancellation after the preload phase and, in fan-out/fan-in mode,
/// between branches; on cancellation the walk so far is discarded and an
/// `UNKNOWN` result is returned (§5).
#[tracing::instrument(skip(store, query, cancel))]
pub async fn analyze_reachability(
    store: &dyn ResourceStore,
    snapshot_id: Uuid,
    query: ReachabilityQuery,
    cancel: &CancellationToken,
) -> Result<ReachabilityResult, StoreError> {
    if cancel.is_cancelled() {
        return Ok(unknown_result("cancelled"));
    }

    let resources = load_network_resources(store, snapshot_id).await?;
    let map: HashMap<&str, &Resource> = resources.iter().map(|r| (r.ocid.as_str(), r)).collect();
    let protocol = query.protocol.as_deref().unwrap_or("6").to_string();

    if cancel.is_cancelled() {
        return Ok(unknown_result("cancelled"));
    }

    match (query.source_ip.as_deref(), query.destination_ip.as_deref()) {
        (Some(src), Some(dst)) => Ok(pair_mode(map, src, dst, &protocol, query.port)),
        (Some(src), None) => Ok(fan_out_mode(map, src, &protocol, query.port, cancel)),
        (None, Some(dst)) => Ok(fan_in_mode(map, dst, &protocol, query.port, cancel)),
        (None, None) => Ok(unknown_result("specify a source, a destination, or both")),
    }
}

fn pair_mode(map: HashMap<&str, &Resource>, source_ip: &str, dest_ip: &str, protocol: &str, port: Option<u16>) -> ReachabilityResult {
    let mut walker = Walker::new(map);
    let src_hop = walker.push_hop(HopType::Src, source_ip, None, HopStatus::Allow, None);

    let Some(source_subnet) = find_subnet_containing_ip(&walker.resources, source_ip) else {
        let deny = walker.push_hop(HopType::Sub, "source subnet", None, HopStatus::Deny, Some("no subnet contains source ip".to_string()));
        walker.link(&src_hop, &deny, None);
        return ReachabilityResult {
            hops: walker.hops,
            links: walker.links,
            verdict: Verdict::Blocked,
            verdict_detail: "source ip does not belong to any subnet".to_string(),
        };
    };

    let sub_hop = walker.push_hop(
        HopType::Sub,
        source_subnet.display_name.clone().unwrap_or_else(|| "source subnet".to_string()),
        Some(source_subnet),
        HopStatus::Allow,
        None,
    );
    walker.link(&src_hop, &sub_hop, None);

    let destination_is_internet = is_internet_destination(dest_ip);
    let effective_dest = if destination_is_internet { REPRESENTATIVE_EXTERNAL_IP } else { dest_ip };

    let dest_subnet = if destination_is_internet {
        None
    } else {
        find_subnet_containing_ip(&walker.resources, dest_ip)
    };
    let intra_vcn = dest_subnet
        .map(|d| d.raw_data.get("vcnId").and_then(Value::as_str) == source_subnet.raw_data.get("vcnId").and_then(Value::as_str))
        .unwrap_or(false);

    let mut visited = HashSet::new();
    if let Some(vcn_id) = source_subnet.raw_data.get("vcnId").and_then(Value::as_str) {
        visited.insert(vcn_id.to_string());
    }

    let outcome = walk_branch(
        &mut walker,
        source_subnet,
        source_ip,
        effective_dest,
        if intra_vcn { dest_subnet } else { None },
        protocol,
        port,
        &mut visited,
    );

    let verdict = if outcome.partial {
        Verdict::Partial
    } else if outcome.allow {
        Verdict::Reachable
    } else {
        Verdict::Blocked
    };

    let detail = match verdict {
        Verdict::Reachable => "all hops allow end-to-end".to_string(),
        Verdict::Blocked => "at least one hop denies".to_string(),
        Verdict::Partial => "cross-VCN traversal could not be fully resolved".to_string(),
        Verdict::Unknown => "a referenced resource was missing".to_string(),
    };

    chain_remaining_links(&mut walker, &sub_hop);

    ReachabilityResult {
        hops: walker.hops,
        links: walker.links,
        verdict,
        verdict_detail: detail,
    }
}

fn chain_remaining_links(walker: &mut Walker, from: &str) {
    let ids: Vec<String> = walker.hops.iter().map(|h| h.id.clone()).collect();
    if let Some(pos) = ids.iter().position(|id| id == from) {
        let mut prev = from.to_string();
        for id in &ids[pos + 1..] {
            walker.link(&prev, id, None);
            prev = id.clone();
        }
    }
}

fn fan_out_mode(map: HashMap<&str, &Resource>, source_ip: &str, protocol: &str, port: Option<u16>, cancel: &CancellationToken) -> ReachabilityResult {
    let mut walker = Walker::new(map);
    let src_hop = walker.push_hop(HopType::Src, source_ip, None, HopStatus::Allow, None);

    let Some(source_subnet) = find_subnet_containing_ip(&walker.resources, source_ip) else {
        return ReachabilityResult {
            hops: walker.hops,
            links: walker.links,
            verdict: Verdict::Blocked,
            verdict_detail: "source ip does not belong to any subnet".to_string(),
        };
    };
    let sub_hop = walker.push_hop(
        HopType::Sub,
        source_subnet.display_name.clone().unwrap_or_else(|| "source subnet".to_string()),
        Some(source_subnet),
        HopStatus::Allow,
        None,
    );
    walker.link(&src_hop, &sub_hop, None);

    let vcn_id = source_subnet.raw_data.get("vcnId").and_then(Value::as_str).map(str::to_string);
    let vcn = vcn_id.as_deref().and_then(|id| walker.resource(id)).copied();

    let mut branch_dests: Vec<String> = Vec::new();
    if let Some(route_table) = route_table_for_subnet(&walker, source_subnet, vcn) {
        if let Some(rules) = route_table.raw_data.get("routeRules").and_then(Value::as_array) {
            for rule in rules {
                if let Some(dest) = rule.get("destination").and_then(Value::as_str) {
                    branch_dests.push(dest.to_string());
                }
            }
        }
    }
    let sibling_ips: Vec<String> = walker
        .resources
        .values()
        .filter(|r| {
            r.resource_type == "network/subnet"
                && r.ocid != source_subnet.ocid
                && r.raw_data.get("vcnId").and_then(Value::as_str) == vcn_id.as_deref()
        })
        .filter_map(|r| r.raw_data.get("cidrBlock").and_then(Value::as_str))
        .map(|cidr| cidr.split('/').next().unwrap_or(cidr).to_string())
        .collect();
    branch_dests.extend(sibling_ips);

    let mut allow_count = 0usize;
    let mut deny_count = 0usize;
    let mut partial_count = 0usize;

    for dest in &branch_dests {
        if cancel.is_cancelled() {
            return unknown_result("cancelled");
        }

        let dest_is_internet = is_internet_destination(dest);
        let effective = if dest_is_internet { REPRESENTATIVE_EXTERNAL_IP } else { dest.as_str() };
        let target_subnet = find_subnet_containing_ip(&walker.resources, effective);
        let intra = target_subnet
            .map(|t| t.raw_data.get("vcnId").and_then(Value::as_str) == vcn_id.as_deref())
            .unwrap_or(false);
        let mut visited = HashSet::new();
        if let Some(id) = &vcn_id {
            visited.insert(id.clone());
        }
        let outcome = walk_branch(&mut walker, source_subnet, source_ip, effective, if intra { target_subnet } else { None }, protocol, port, &mut visited);
        if outcome.partial {
            partial_count += 1;
        } else if outcome.allow {
            allow_count += 1;
        } else {
            deny_count += 1;
        }
    }

    let total = branch_dests.len();
    let verdict = if total == 0 {
        Verdict::Unknown
    } else if deny_count == 0 && partial_count == 0 {
        Verdict::Reachable
    } else if allow_count == 0 && partial_count == 0 {
        Verdict::Blocked
    } else {
        Verdict::Partial
    };

    ReachabilityResult {
        hops: walker.hops,
        links: walker.links,
        verdict,
        verdict_detail: format!("{allow_count}/{total} branches reachable"),
    }
}

fn fan_in_mode(map: HashMap<&str, &Resource>, dest_ip: &str, protocol: &str, port: Option<u16>, cancel: &CancellationToken) -> ReachabilityResult {
    let mut walker = Walker::new(map);
    let dest_is_internet = is_internet_destination(dest_ip);
    let effective_dest = if dest_is_internet { REPRESENTATIVE_EXTERNAL_IP } else { dest_ip };
    let dst_hop = walker.push_hop(HopType::Dst, dest_ip, None, HopStatus::Allow, None);

    let subnet_ocids: Vec<String> = walker
        .resources
        .values()
        .filter(|r| r.resource_type == "network/subnet")
        .map(|r| r.ocid.clone())
        .collect();

    let mut reachable = 0usize;
    let total = subnet_ocids.len();

    for ocid in &subnet_ocids {
        if cancel.is_cancelled() {
            return unknown_result("cancelled");
        }

        let Some(subnet) = walker.resource(ocid).copied() else { continue };
        let vcn_id = subnet.raw_data.get("vcnId").and_then(Value::as_str).map(str::to_string);
        let vcn = vcn_id.as_deref().and_then(|id| walker.resource(id)).copied();
        let dest_subnet_here = if dest_is_internet { None } else { find_subnet_containing_ip(&walker.resources, dest_ip) };
        let intra = dest_subnet_here
            .map(|d| d.raw_data.get("vcnId").and_then(Value::as_str) == vcn_id.as_deref())
            .unwrap_or(false);
        let candidate_source_ip = subnet
            .raw_data
            .get("cidrBlock")
            .and_then(Value::as_str)
            .map(|cidr| cidr.split('/').next().unwrap_or(cidr).to_string())
            .unwrap_or_default();

        let sub_hop = walker.push_hop(
            HopType::Sub,
            subnet.display_name.clone().unwrap_or_else(|| "subnet".to_string()),
            Some(subnet),
            HopStatus::Allow,
            None,
        );

        let mut visited = HashSet::new();
        if let Some(id) = &vcn_id {
            visited.insert(id.clone());
        }
        let route_table = route_table_for_subnet(&walker, subnet, vcn);
        let has_route = route_table
            .map(|rt| {
                let routes = route_targets(rt);
                longest_prefix_match(effective_dest, &routes).is_some() || intra
            })
            .unwrap_or(intra);

        let outcome = if has_route {
            walk_branch(
                &mut walker,
                subnet,
                &candidate_source_ip,
                effective_dest,
                if intra { dest_subnet_here } else { None },
                protocol,
                port,
                &mut visited,
            )
        } else {
            BranchOutcome { allow: false, partial: false }
        };

        if outcome.allow {
            reachable += 1;
        }
        walker.link(&sub_hop, &dst_hop, None);
    }

    let verdict = if total == 0 {
        Verdict::Unknown
    } else if reachable == total {
        Verdict::Reachable
    } else if reachable == 0 {
        Verdict::Blocked
    } else {
        Verdict::Partial
    };

    ReachabilityResult {
        hops: walker.hops,
        links: walker.links,
        verdict,
        verdict_detail: format!("{reachable}/{total} subnets reachable"),
    }
}
