//! Reference resolution: literal id, then local declaration, then inventory.

use crate::naming;
use crate::template::ref_to;
use crate::CompileError;
use cumulus_provider::Inventory;
use cumulus_schema::{Network, Stack, Subnet};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const VPC_PREFIX: &str = "vpc-";
const SUBNET_PREFIX: &str = "subnet-";
const SG_PREFIX: &str = "sg-";

/// Is `designator` an id-shaped literal such as `sg-0a1b2c`?
fn is_literal(designator: &str, prefix: &str) -> bool {
    designator
        .strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// A network designator after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkRef {
    /// Declared in this stack; rendered as a `Ref` to its VPC resource.
    Local(String),
    /// Already provisioned; rendered as the literal id.
    External(String),
}

impl NetworkRef {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Local(name) => ref_to(&naming::vpc(name)),
            Self::External(id) => Value::String(id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TagKind {
    Subnet,
    SecurityGroup,
}

/// Resolves designators for one compile.
///
/// Inventory answers are memoized for the lifetime of the resolver, so each
/// distinct external lookup is issued at most once per compile.
pub struct Resolver<'a> {
    stack: &'a Stack,
    inventory: &'a dyn Inventory,
    networks: HashMap<String, NetworkRef>,
    tagged: HashMap<(TagKind, String, String), Vec<String>>,
    zones: HashMap<String, Vec<String>>,
    hosted_zones: HashMap<String, String>,
}

impl<'a> Resolver<'a> {
    pub fn new(stack: &'a Stack, inventory: &'a dyn Inventory) -> Self {
        Self {
            stack,
            inventory,
            networks: HashMap::new(),
            tagged: HashMap::new(),
            zones: HashMap::new(),
            hosted_zones: HashMap::new(),
        }
    }

    pub fn resolve_network(&mut self, designator: &str) -> Result<NetworkRef, CompileError> {
        if is_literal(designator, VPC_PREFIX) {
            return Ok(NetworkRef::External(designator.to_owned()));
        }
        if self.stack.network(designator).is_some() {
            return Ok(NetworkRef::Local(designator.to_owned()));
        }
        if let Some(hit) = self.networks.get(designator) {
            debug!("network '{designator}' resolved from cache");
            return Ok(hit.clone());
        }
        let id = self
            .inventory
            .find_network_by_name(designator)?
            .ok_or_else(|| CompileError::UnresolvableReference {
                kind: "network",
                name: designator.to_owned(),
            })?;
        debug!("network '{designator}' resolved to {id}");
        let resolved = NetworkRef::External(id);
        self.networks.insert(designator.to_owned(), resolved.clone());
        Ok(resolved)
    }

    /// Zones a local subnet spans: its own list, else the network's, else
    /// every zone the inventory reports for the region.
    pub fn subnet_zones(
        &mut self,
        network: &Network,
        subnet: &Subnet,
    ) -> Result<Vec<String>, CompileError> {
        if !subnet.azs.is_empty() {
            return Ok(subnet.azs.clone());
        }
        if !network.azs.is_empty() {
            return Ok(network.azs.clone());
        }
        if let Some(hit) = self.zones.get(&network.region) {
            return Ok(hit.clone());
        }
        let zones = self.inventory.availability_zones(&network.region)?;
        if zones.is_empty() {
            return Err(CompileError::UnresolvableReference {
                kind: "availability zones for region",
                name: network.region.clone(),
            });
        }
        self.zones.insert(network.region.clone(), zones.clone());
        Ok(zones)
    }

    /// One handle per zone for every named subnet, in the order given.
    pub fn resolve_subnets(
        &mut self,
        network: &str,
        names: &[String],
    ) -> Result<Vec<Value>, CompileError> {
        let resolved = self.resolve_network(network)?;
        let mut out = Vec::new();
        for name in names {
            if is_literal(name, SUBNET_PREFIX) {
                out.push(Value::String(name.clone()));
                continue;
            }
            match &resolved {
                NetworkRef::Local(net_name) => {
                    let stack = self.stack;
                    let (net, subnet) = stack
                        .network(net_name)
                        .and_then(|n| n.subnet(name).map(|s| (n, s)))
                        .ok_or_else(|| CompileError::UnresolvableReference {
                            kind: "subnet",
                            name: format!("{net_name}/{name}"),
                        })?;
                    for zone in self.subnet_zones(net, subnet)? {
                        let zone = zone_suffix(&net.region, &zone);
                        out.push(ref_to(&naming::subnet(net_name, name, zone)));
                    }
                }
                NetworkRef::External(id) => {
                    let ids = self.lookup_tagged(TagKind::Subnet, id, name)?;
                    out.extend(ids.into_iter().map(Value::String));
                }
            }
        }
        Ok(out)
    }

    /// Handles for security groups named by literal id, by a role, cache or
    /// load balancer declared on the same network, or by inventory tag.
    pub fn resolve_security_groups(
        &mut self,
        network: &str,
        names: &[String],
    ) -> Result<Vec<Value>, CompileError> {
        let resolved = self.resolve_network(network)?;
        let mut out = Vec::new();
        for name in names {
            if is_literal(name, SG_PREFIX) {
                out.push(Value::String(name.clone()));
                continue;
            }
            if let Some(local) = self.local_security_group(network, name) {
                out.push(ref_to(&local));
                continue;
            }
            match &resolved {
                NetworkRef::Local(_) => {
                    return Err(CompileError::UnresolvableReference {
                        kind: "security group",
                        name: name.clone(),
                    })
                }
                NetworkRef::External(id) => {
                    let ids = self.lookup_tagged(TagKind::SecurityGroup, id, name)?;
                    out.extend(ids.into_iter().map(Value::String));
                }
            }
        }
        Ok(out)
    }

    fn local_security_group(&self, network: &str, name: &str) -> Option<String> {
        let stack = self.stack;
        if let Some(role) = stack.role(name).filter(|r| r.network == network) {
            return Some(naming::role_sg(&role.name));
        }
        if let Some(cache) = stack.cache(name).filter(|c| c.network == network) {
            return Some(naming::cache_sg(&cache.name));
        }
        stack
            .load_balancers()
            .find(|(role, lb)| lb.name == name && role.network == network)
            .map(|(_, lb)| naming::load_balancer_sg(&lb.name))
    }

    pub fn hosted_zone(&mut self, dns_name: &str) -> Result<String, CompileError> {
        if let Some(hit) = self.hosted_zones.get(dns_name) {
            return Ok(hit.clone());
        }
        let zone = self.inventory.hosted_zone_for(dns_name)?.ok_or_else(|| {
            CompileError::UnresolvableReference {
                kind: "hosted zone",
                name: dns_name.to_owned(),
            }
        })?;
        self.hosted_zones.insert(dns_name.to_owned(), zone.clone());
        Ok(zone)
    }

    fn lookup_tagged(
        &mut self,
        kind: TagKind,
        network_id: &str,
        tag: &str,
    ) -> Result<Vec<String>, CompileError> {
        let key = (kind, network_id.to_owned(), tag.to_owned());
        if let Some(hit) = self.tagged.get(&key) {
            debug!("{kind:?} '{tag}' in {network_id} resolved from cache");
            return Ok(hit.clone());
        }
        let ids = match kind {
            TagKind::Subnet => self.inventory.find_subnets_by_tag(network_id, tag)?,
            TagKind::SecurityGroup => self.inventory.find_security_groups_by_tag(network_id, tag)?,
        };
        if ids.is_empty() {
            return Err(CompileError::UnresolvableReference {
                kind: match kind {
                    TagKind::Subnet => "subnet",
                    TagKind::SecurityGroup => "security group",
                },
                name: tag.to_owned(),
            });
        }
        debug!("{kind:?} '{tag}' in {network_id} resolved to {ids:?}");
        self.tagged.insert(key, ids.clone());
        Ok(ids)
    }
}

pub use cumulus_schema::naming::zone_suffix;

/// `"a"` in `us-east-1` -> `"us-east-1a"`; full zone names pass through.
pub fn zone_name(region: &str, zone: &str) -> String {
    if zone.starts_with(region) {
        zone.to_owned()
    } else {
        format!("{region}{zone}")
    }
}
