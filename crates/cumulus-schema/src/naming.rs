//! Logical resource names.
//!
//! Every name is the capitalized entity name followed by a resource-kind
//! suffix, so names stay unique as long as entity names are.

/// `"web-front"` -> `"WebFront"`.
pub fn logical_id(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn suffixed(name: &str, suffix: &str) -> String {
    format!("{}{suffix}", logical_id(name))
}

pub fn vpc(network: &str) -> String {
    suffixed(network, "VPC")
}

pub fn internet_gateway(network: &str) -> String {
    suffixed(network, "IGW")
}

pub fn gateway_attachment(network: &str) -> String {
    suffixed(network, "IGWAttachment")
}

pub fn route_table(network: &str) -> String {
    suffixed(network, "RouteTable")
}

pub fn default_route(network: &str) -> String {
    suffixed(network, "DefaultRoute")
}

/// One subnet resource per zone: `AppPublicSubnetA`.
pub fn subnet(network: &str, subnet: &str, zone: &str) -> String {
    format!(
        "{}{}Subnet{}",
        logical_id(network),
        logical_id(subnet),
        logical_id(zone)
    )
}

/// `"us-east-1a"` in `us-east-1` -> `"a"`; bare suffixes pass through.
pub fn zone_suffix<'z>(region: &str, zone: &'z str) -> &'z str {
    zone.strip_prefix(region).filter(|s| !s.is_empty()).unwrap_or(zone)
}

pub fn route_table_association(subnet_resource: &str) -> String {
    format!("{subnet_resource}RouteTableAssociation")
}

pub fn role_sg(role: &str) -> String {
    suffixed(role, "SG")
}

pub fn iam_role(role: &str) -> String {
    suffixed(role, "Role")
}

pub fn policy(role: &str) -> String {
    suffixed(role, "Policy")
}

pub fn instance_profile(role: &str) -> String {
    suffixed(role, "InstanceProfile")
}

pub fn autoscaling_group(role: &str) -> String {
    suffixed(role, "ASG")
}

pub fn launch_template(role: &str) -> String {
    suffixed(role, "LaunchTemplate")
}

/// Standalone ingress for a role reaching itself: `WebSGTCP9300`.
///
/// Protocol `-1` (all traffic) renders as `ALL`.
pub fn intracluster_ingress(role: &str, protocol: &str, port: u16) -> String {
    let protocol = if protocol.trim() == "-1" {
        "ALL".to_owned()
    } else {
        logical_id(protocol).to_uppercase()
    };
    format!("{}{protocol}{port}", role_sg(role))
}

pub fn load_balancer(lb: &str) -> String {
    suffixed(lb, "ELB")
}

pub fn load_balancer_sg(lb: &str) -> String {
    suffixed(lb, "ELBSG")
}

pub fn dns_record(lb: &str, record: &str) -> String {
    format!("{}{}DNS", logical_id(lb), logical_id(record))
}

pub fn cache(cache: &str) -> String {
    suffixed(cache, "Cache")
}

pub fn cache_sg(cache: &str) -> String {
    suffixed(cache, "CacheSG")
}

pub fn cache_subnet_group(cache: &str) -> String {
    suffixed(cache, "SubnetGroup")
}

pub fn bucket(bucket: &str) -> String {
    suffixed(bucket, "Bucket")
}
