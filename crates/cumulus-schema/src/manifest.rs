use crate::model::{
    Allow, BlockDevice, Bucket, Cache, LoadBalancer, Network, PolicyStatement, Provisioner,
    UpdatePolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("failed to read stackfile: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse stackfile: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("role '{role}' includes undeclared profile '{profile}'")]
    UndeclaredProfile { role: String, profile: String },
    #[error("profile '{0}' must not include other profiles")]
    NestedProfile(String),
    #[error("{referrer} allows undeclared role '{role}'")]
    UndeclaredRoleReference { referrer: String, role: String },
    #[error("role '{0}' has no network (set `network` on the role or a profile)")]
    MissingNetwork(String),
    #[error("{referrer} allow rule for '{source_role}' declares no ports")]
    MissingPorts {
        referrer: String,
        source_role: String,
    },
    #[error("role '{role}' capacity must satisfy min <= target <= max (got {min}/{target}/{max})")]
    InvalidCapacity {
        role: String,
        min: u32,
        target: u32,
        max: u32,
    },
    #[error("load balancer '{0}' declares no listeners")]
    NoListeners(String),
    #[error("{first} and {second} both produce resource name '{name}' (rename one of them)")]
    LogicalIdCollision {
        name: String,
        first: String,
        second: String,
    },
}

/// The Stackfile document as written by hand.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StackManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default, rename = "network")]
    pub networks: Vec<Network>,
    #[serde(default, rename = "profile")]
    pub profiles: Vec<RoleProfile>,
    #[serde(default, rename = "role")]
    pub roles: Vec<PartialRole>,
    #[serde(default, rename = "cache")]
    pub caches: Vec<Cache>,
    #[serde(default, rename = "bucket")]
    pub buckets: Vec<Bucket>,
}

/// A role as declared, before profiles are merged and defaults resolved.
///
/// Profiles share this shape: a profile is a partial role that gets merged
/// into every role that lists it in `include_profiles`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PartialRole {
    pub name: String,
    #[serde(default)]
    pub include_profiles: Vec<String>,
    #[serde(default)]
    pub min_size: Option<u32>,
    #[serde(default)]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub target_size: Option<u32>,
    #[serde(default)]
    pub update_policy: Option<UpdatePolicy>,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub key_pair: Option<String>,
    #[serde(default)]
    pub block_devices: Vec<BlockDevice>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub policy_statements: Vec<PolicyStatement>,
    #[serde(default)]
    pub allow: Vec<Allow>,
    #[serde(default)]
    pub provisioners: Vec<Provisioner>,
    #[serde(default)]
    pub base_image: Option<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "load_balancer")]
    pub load_balancers: Vec<LoadBalancer>,
}

pub type RoleProfile = PartialRole;

pub fn parse_stack_str(input: &str) -> Result<StackManifest, StackError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_stack_file(path: impl AsRef<Path>) -> Result<StackManifest, StackError> {
    let content = fs::read_to_string(path)?;
    parse_stack_str(&content)
}
