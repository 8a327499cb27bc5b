//! Auto-detect order: signature checks, then OCID-prefix fallback, then the
//! generic parser. See `mod.rs` for the public entry point.

use serde_json::Value;

fn has(item: &Value, key: &str) -> bool {
    item.get(key).is_some()
}

fn lacks(item: &Value, key: &str) -> bool {
    !has(item, key)
}

mod compute {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "shape") && has(item, "imageId") && lacks(item, "databaseEdition") && lacks(item, "containerCount") {
            return Some("compute/instance");
        }
        if has(item, "shape") && has(item, "containerCount") {
            return Some("compute/container-instance");
        }
        if has(item, "imageOsVersion") || (has(item, "operatingSystem") && has(item, "launchMode")) {
            return Some("compute/image");
        }
        if has(item, "sizeInMBs") && (has(item, "isHydrated") || has(item, "vpusPerGB")) {
            return Some("compute/block-volume");
        }
        if has(item, "bootVolumeReplicas") || (has(item, "sizeInGBs") && has(item, "imageId")) {
            return Some("compute/boot-volume");
        }
        None
    }
}

mod network {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "cidrBlock") && has(item, "defaultRouteTableId") {
            return Some("network/vcn");
        }
        if has(item, "cidrBlock") && has(item, "vcnId") && has(item, "prohibitInternetIngress") {
            return Some("network/subnet");
        }
        if has(item, "routeRules") {
            return Some("network/route-table");
        }
        if has(item, "ingressSecurityRules") || has(item, "egressSecurityRules") {
            return Some("network/security-list");
        }
        if has(item, "securityRules") && has(item, "vcnId") {
            return Some("network/nsg");
        }
        if has(item, "isEnabled") && has(item, "vcnId") && lacks(item, "blockTraffic") {
            return Some("network/internet-gateway");
        }
        if has(item, "blockTraffic") && has(item, "natIp") {
            return Some("network/nat-gateway");
        }
        if has(item, "blockTraffic") && has(item, "serviceId") {
            return Some("network/service-gateway");
        }
        if has(item, "peeringStatus") && has(item, "peerId") {
            return Some("network/local-peering-gateway");
        }
        if has(item, "isCrossTenancy") {
            return Some("network/drg");
        }
        if has(item, "vnicAttachmentId") || (has(item, "privateIp") && has(item, "subnetId") && has(item, "macAddress")) {
            return Some("network/vnic");
        }
        if has(item, "ipAddress") && has(item, "isPrivate") && has(item, "shapeName") {
            return Some("network/load-balancer");
        }
        if has(item, "backendSets") {
            return Some("network/load-balancer");
        }
        None
    }
}

mod database {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "databaseEdition") && has(item, "shape") {
            return Some("database/db-system");
        }
        if has(item, "dbName") && has(item, "dbUniqueName") {
            return Some("database/database");
        }
        if has(item, "cpuCoreCount") && has(item, "dbWorkload") {
            return Some("database/autonomous-database");
        }
        if has(item, "nodeCount") && has(item, "engineVersion") {
            return Some("database/nosql-table");
        }
        None
    }
}

mod storage {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "namespace") && has(item, "publicAccessType") {
            return Some("storage/bucket");
        }
        if has(item, "exportSetId") || (has(item, "meteredBytes") && lacks(item, "publicAccessType")) {
            return Some("storage/file-system");
        }
        None
    }
}

mod container {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "kubernetesVersion") && has(item, "endpointConfig") {
            return Some("container/cluster");
        }
        if has(item, "nodeConfigDetails") || (has(item, "nodeShape") && has(item, "clusterId")) {
            return Some("container/node-pool");
        }
        None
    }
}

mod serverless {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "applicationId") && has(item, "image") {
            return Some("serverless/function");
        }
        if has(item, "idleTimeoutInSeconds") || (has(item, "subnetIds") && has(item, "networkSecurityGroupIds") && lacks(item, "image")) {
            return Some("serverless/application");
        }
        if has(item, "specifications") && has(item, "endpoints") {
            return Some("serverless/api-gateway");
        }
        None
    }
}

mod iam {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "isAccessible") && lacks(item, "policyStatements") {
            return Some("iam/compartment");
        }
        if has(item, "statements") {
            return Some("iam/policy");
        }
        if has(item, "matchingRule") {
            return Some("iam/dynamic-group");
        }
        if has(item, "description") && has(item, "name") && lacks(item, "statements") && has(item, "inactiveStatus") && lacks(item, "matchingRule") {
            return Some("iam/group");
        }
        if has(item, "email") && has(item, "lastSuccessfulLoginTime") {
            return Some("iam/user");
        }
        None
    }
}

mod security {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "vaultType") && has(item, "cryptoEndpoint") {
            return Some("security/vault");
        }
        if has(item, "algorithm") && has(item, "protectionMode") {
            return Some("security/key");
        }
        if has(item, "targetResourceType") && has(item, "triggers") {
            return Some("security/cloud-guard-detector");
        }
        None
    }
}

mod observability {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "namespace") && has(item, "metricCompartmentId") {
            return Some("observability/alarm");
        }
        if has(item, "logGroupId") && has(item, "logType") {
            return Some("observability/log");
        }
        if has(item, "retentionDuration") && lacks(item, "logType") {
            return Some("observability/log-group");
        }
        None
    }
}

mod dns {
    use super::*;

    pub fn detect(item: &Value) -> Option<&'static str> {
        if has(item, "zoneType") && (has(item, "dnssecState") || has(item, "serial")) {
            return Some("dns/zone");
        }
        if has(item, "rtype") && has(item, "rdata") {
            return Some("dns/record");
        }
        None
    }
}

/// Run every family's signature checks in the fixed, documented order.
pub fn detect_by_signature(item: &Value) -> Option<&'static str> {
    compute::detect(item)
        .or_else(|| network::detect(item))
        .or_else(|| database::detect(item))
        .or_else(|| storage::detect(item))
        .or_else(|| container::detect(item))
        .or_else(|| serverless::detect(item))
        .or_else(|| iam::detect(item))
        .or_else(|| security::detect(item))
        .or_else(|| observability::detect(item))
        .or_else(|| dns::detect(item))
}

/// Closed OCID-prefix-token fallback map: `ocid1.<token>.oc1...` -> type.
const OCID_PREFIX_MAP: &[(&str, &str)] = &[
    ("instance", "compute/instance"),
    ("image", "compute/image"),
    ("volume", "compute/block-volume"),
    ("bootvolume", "compute/boot-volume"),
    ("vcn", "network/vcn"),
    ("subnet", "network/subnet"),
    ("routetable", "network/route-table"),
    ("securitylist", "network/security-list"),
    ("networksecuritygroup", "network/nsg"),
    ("internetgateway", "network/internet-gateway"),
    ("natgateway", "network/nat-gateway"),
    ("servicegateway", "network/service-gateway"),
    ("localpeeringgateway", "network/local-peering-gateway"),
    ("drg", "network/drg"),
    ("vnic", "network/vnic"),
    ("loadbalancer", "network/load-balancer"),
    ("dbsystem", "database/db-system"),
    ("database", "database/database"),
    ("autonomousdatabase", "database/autonomous-database"),
    ("bucket", "storage/bucket"),
    ("filesystem", "storage/file-system"),
    ("cluster", "container/cluster"),
    ("nodepool", "container/node-pool"),
    ("fnapp", "serverless/application"),
    ("fnfunc", "serverless/function"),
    ("apigateway", "serverless/api-gateway"),
    ("compartment", "iam/compartment"),
    ("policy", "iam/policy"),
    ("dynamicgroup", "iam/dynamic-group"),
    ("group", "iam/group"),
    ("user", "iam/user"),
    ("vault", "security/vault"),
    ("key", "security/key"),
    ("alarm", "observability/alarm"),
    ("loggroup", "observability/log-group"),
    ("log", "observability/log"),
    ("dns-zone", "dns/zone"),
];

/// Second-tier fallback: split the `id`/`ocid` field on `.` and look up
/// token index 1 in the closed mapping table.
pub fn detect_by_ocid_prefix(ocid: &str) -> Option<&'static str> {
    let token = ocid.split('.').nth(1)?;
    OCID_PREFIX_MAP
        .iter()
        .find(|(prefix, _)| *prefix == token)
        .map(|(_, ty)| *ty)
}

/// Resource-type slug used by the generic third-tier fallback, derived from
/// the OCID prefix token when present.
pub fn generic_type_for(ocid: Option<&str>) -> String {
    match ocid.and_then(|o| o.split('.').nth(1)) {
        Some(token) if !token.is_empty() => format!("generic/{token}"),
        _ => "generic/unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!({"shape": "VM.Standard2.1", "imageId": "ocid1.image.1"}), Some("compute/instance") ; "plain instance")]
    #[test_case(json!({"shape": "VM.Standard2.1", "imageId": "ocid1.image.1", "databaseEdition": "ENTERPRISE"}), None ; "db guard excludes instance")]
    #[test_case(json!({"shape": "CI.Standard.1", "containerCount": 2}), Some("compute/container-instance") ; "container instance guard")]
    #[test_case(json!({"cidrBlock": "10.0.0.0/16", "defaultRouteTableId": "ocid1.rt.1"}), Some("network/vcn") ; "vcn")]
    #[test_case(json!({"cidrBlock": "10.0.1.0/24", "vcnId": "ocid1.vcn.1", "prohibitInternetIngress": true}), Some("network/subnet") ; "subnet")]
    #[test_case(json!({"databaseEdition": "ENTERPRISE", "shape": "VM.Standard2.1"}), Some("database/db-system") ; "db system")]
    #[test_case(json!({"namespace": "ns1", "publicAccessType": "NoPublicAccess"}), Some("storage/bucket") ; "bucket")]
    #[test_case(json!({"isAccessible": true}), Some("iam/compartment") ; "compartment")]
    #[test_case(json!({"unrelated": "field"}), None ; "no signature matches")]
    fn test_detect_by_signature(item: Value, expected: Option<&'static str>) {
        assert_eq!(detect_by_signature(&item), expected);
    }

    #[test_case("ocid1.vcn.oc1.phx.abc", Some("network/vcn") ; "vcn prefix")]
    #[test_case("ocid1.fnapp.oc1.phx.abc", Some("serverless/application") ; "fnapp prefix")]
    #[test_case("ocid1.nosuchtype.oc1.phx.abc", None ; "unknown prefix")]
    #[test_case("not-an-ocid", None ; "too few tokens")]
    fn test_detect_by_ocid_prefix(ocid: &str, expected: Option<&'static str>) {
        assert_eq!(detect_by_ocid_prefix(ocid), expected);
    }

    #[test]
    fn generic_type_uses_prefix_token() {
        assert_eq!(generic_type_for(Some("ocid1.weirdthing.oc1..x")), "generic/weirdthing");
        assert_eq!(generic_type_for(Some("synthetic.generic.ab")), "generic/generic");
    }

    #[test]
    fn generic_type_falls_back_when_no_ocid() {
        assert_eq!(generic_type_for(None), "generic/unknown");
    }
}
