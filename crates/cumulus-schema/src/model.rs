//! The in-memory Stack Model.
//!
//! Networks, caches, buckets and load balancers deserialize straight from the
//! Stackfile; roles are produced by [`crate::normalize`] after profile merging.

use crate::types::ImageId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A fully loaded, profile-merged and validated stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub description: String,
    pub tags: BTreeMap<String, String>,
    pub vars: BTreeMap<String, String>,
    pub networks: Vec<Network>,
    pub roles: Vec<Role>,
    pub profiles: Vec<crate::manifest::RoleProfile>,
    pub caches: Vec<Cache>,
    pub buckets: Vec<Bucket>,
}

impl Stack {
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn role_mut(&mut self, name: &str) -> Option<&mut Role> {
        self.roles.iter_mut().find(|r| r.name == name)
    }

    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn cache(&self, name: &str) -> Option<&Cache> {
        self.caches.iter().find(|c| c.name == name)
    }

    pub fn load_balancers(&self) -> impl Iterator<Item = (&Role, &LoadBalancer)> {
        self.roles
            .iter()
            .flat_map(|r| r.load_balancers.iter().map(move |lb| (r, lb)))
    }

    /// Roles that still lack an image from the bake pipeline.
    pub fn unbaked_roles(&self) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|r| r.image.is_none())
            .map(|r| r.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Network {
    pub name: String,
    pub region: String,
    #[serde(default = "default_cidr")]
    pub cidr: String,
    /// Host bits of each per-AZ subnet block (8 carves /24s out of a /16).
    #[serde(default = "default_subnet_bits")]
    pub subnet_bits: u8,
    #[serde(default = "default_true")]
    pub igw: bool,
    #[serde(default = "default_true")]
    pub dns: bool,
    #[serde(default = "default_true")]
    pub dns_hostnames: bool,
    #[serde(default)]
    pub azs: Vec<String>,
    #[serde(default, rename = "subnet")]
    pub subnets: Vec<Subnet>,
}

impl Network {
    pub fn subnet(&self, name: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Subnet {
    pub name: String,
    /// Empty means every zone the network (or its region) offers.
    #[serde(default)]
    pub azs: Vec<String>,
    #[serde(default = "default_true")]
    pub igw: bool,
    #[serde(default)]
    pub public_ip: Option<bool>,
}

impl Subnet {
    pub fn maps_public_ip(&self) -> bool {
        self.public_ip.unwrap_or(self.igw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub min_size: u32,
    pub max_size: u32,
    pub target_size: u32,
    pub update_policy: UpdatePolicy,
    pub instance_type: String,
    pub key_pair: Option<String>,
    pub block_devices: Vec<BlockDevice>,
    pub network: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub policy_statements: Vec<PolicyStatement>,
    pub allow: Vec<Allow>,
    pub provisioners: Vec<Provisioner>,
    pub base_image: Option<String>,
    pub vars: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub load_balancers: Vec<LoadBalancer>,
    /// Set by the bake pipeline (or pinned in the Stackfile) before compilation.
    pub image: Option<ImageId>,
}

impl Role {
    pub fn set_image(&mut self, image: ImageId) {
        self.image = Some(image);
    }

    /// Add a policy statement unless an identical one is already present.
    pub fn grant(&mut self, statement: PolicyStatement) -> bool {
        if self.policy_statements.contains(&statement) {
            return false;
        }
        self.policy_statements.push(statement);
        true
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UpdatePolicy {
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub max_batch: Option<u32>,
    #[serde(default)]
    pub min_in_service: Option<u32>,
    #[serde(default)]
    pub pause_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlockDevice {
    pub device: String,
    pub size: u32,
    #[serde(default = "default_volume_type")]
    pub volume_type: String,
    #[serde(default = "default_true")]
    pub delete_on_termination: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PolicyStatement {
    #[serde(default = "default_effect")]
    pub effect: String,
    #[serde(deserialize_with = "one_or_many")]
    pub action: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub resource: Vec<String>,
    #[serde(default)]
    pub condition: Option<serde_json::Value>,
}

impl PolicyStatement {
    pub fn allow(action: &[&str], resource: &[&str]) -> Self {
        Self {
            effect: default_effect(),
            action: action.iter().map(|s| (*s).to_owned()).collect(),
            resource: resource.iter().map(|s| (*s).to_owned()).collect(),
            condition: None,
        }
    }
}

/// "Instances of role `source` may reach `target` on `ports`."
///
/// In the Stackfile the source is spelled `role` and the target is implied by
/// the entity the rule is declared on; normalization fills in `target`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Allow {
    #[serde(rename = "role")]
    pub source: String,
    #[serde(skip)]
    pub target: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub ports: Vec<u16>,
}

impl Allow {
    pub fn is_intracluster(&self) -> bool {
        self.source == self.target
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Provisioner {
    File {
        source: String,
        destination: String,
    },
    Chef {
        #[serde(deserialize_with = "one_or_many")]
        run_list: Vec<String>,
    },
    Shell {
        #[serde(deserialize_with = "one_or_many")]
        inline: Vec<String>,
    },
    Ansible {
        playbook: String,
        #[serde(default)]
        extra_vars: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancer {
    pub name: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
    #[serde(default)]
    pub connection_settings: Option<ConnectionSettings>,
    #[serde(default)]
    pub internal: bool,
    /// Empty falls back to the owning role's subnets.
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub dns_records: Vec<DnsRecord>,
    #[serde(default)]
    pub allow: Vec<Allow>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Listener {
    pub port: u16,
    #[serde(default)]
    pub instance_port: Option<u16>,
    #[serde(default)]
    pub lb_port: Option<u16>,
    #[serde(default = "default_listener_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub certificate: Option<String>,
}

impl Listener {
    pub fn instance_port(&self) -> u16 {
        self.instance_port.unwrap_or(self.port)
    }

    pub fn lb_port(&self) -> u16 {
        self.lb_port.unwrap_or(self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HealthCheck {
    pub target: String,
    #[serde(default)]
    pub healthy_threshold: Option<u32>,
    #[serde(default)]
    pub unhealthy_threshold: Option<u32>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub idle_timeout: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DnsRecord {
    pub name: String,
    /// Hosted zone id; looked up from the inventory when absent.
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheEngine {
    #[default]
    Redis,
    Memcached,
}

impl CacheEngine {
    pub fn default_port(self) -> u16 {
        match self {
            Self::Redis => 6379,
            Self::Memcached => 11211,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memcached => "memcached",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Cache {
    pub name: String,
    #[serde(default)]
    pub engine: CacheEngine,
    #[serde(default = "default_cache_node_type")]
    pub node_type: String,
    #[serde(default = "default_nodes")]
    pub nodes: u32,
    #[serde(default)]
    pub port: Option<u16>,
    pub network: String,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub allow: Vec<Allow>,
}

impl Cache {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub access_control: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Accept either a scalar or a list, e.g. `ports = 9200` or `ports = [80, 443]`.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(v) => vec![v],
        OneOrMany::Many(v) => v,
    })
}

fn default_true() -> bool {
    true
}

fn default_cidr() -> String {
    "10.0.0.0/16".to_owned()
}

fn default_subnet_bits() -> u8 {
    8
}

fn default_volume_type() -> String {
    "gp3".to_owned()
}

fn default_effect() -> String {
    "Allow".to_owned()
}

pub(crate) fn default_protocol() -> String {
    "tcp".to_owned()
}

fn default_listener_protocol() -> String {
    "HTTP".to_owned()
}

fn default_cache_node_type() -> String {
    "cache.t3.micro".to_owned()
}

fn default_nodes() -> u32 {
    1
}
