//! Stackfile parsing, the Stack Model, profile merging and the images lock for Cumulus.
//!
//! This crate defines the schema layer: TOML Stackfile parsing (`StackManifest`),
//! the validated in-memory model (`Stack`) produced by `StackManifest::normalize`,
//! role-profile merging, provisioning digests, the images lock written by the
//! bake step, and built-in starter stacks.

pub mod identity;
pub mod lock;
pub mod manifest;
pub mod model;
pub mod naming;
pub mod normalize;
pub mod preset;
pub mod profile;
pub mod types;

pub use identity::provisioning_digest;
pub use lock::{ImageLock, LockError, LockedImage};
pub use manifest::{
    parse_stack_file, parse_stack_str, PartialRole, RoleProfile, StackError, StackManifest,
};
pub use model::{
    Allow, BlockDevice, Bucket, Cache, CacheEngine, ConnectionSettings, DnsRecord, HealthCheck,
    Listener, LoadBalancer, Network, PolicyStatement, Provisioner, Role, Stack, Subnet,
    UpdatePolicy,
};
pub use normalize::SELF_ROLE;
pub use preset::{get_preset, list_presets, Preset, BUILTIN_PRESETS};
pub use types::{ImageId, ShortId, TemplateId};

/// Parse and normalize a Stackfile in one step.
pub fn load_stack(path: impl AsRef<std::path::Path>) -> Result<Stack, StackError> {
    parse_stack_file(path)?.normalize()
}
