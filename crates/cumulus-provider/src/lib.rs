//! External collaborators of the Cumulus compiler.
//!
//! This crate defines the provider boundary: the `Inventory` trait the resolver
//! queries for already-provisioned networks, subnets, security groups and
//! hosted zones; the `ImageBaker` trait and its bake lifecycle state machine;
//! an offline `StaticInventory` backed by a TOML snapshot; a deterministic
//! `MockBaker`; and the provider configuration file.

pub mod bake;
pub mod config;
pub mod inventory;
pub mod mock;
pub mod snapshot;

pub use bake::{
    bake_stack, select_baker, validate_transition, BakePhase, BakeRequest, BakeSession,
    ImageBaker,
};
pub use config::ProviderConfig;
pub use inventory::{open_inventory, Inventory};
pub use mock::MockBaker;
pub use snapshot::{InventorySnapshot, StaticInventory};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse inventory snapshot: {0}")]
    Snapshot(#[from] toml::de::Error),
    #[error("provider config error: {0}")]
    Config(String),
    #[error("baker '{0}' is not available")]
    BakerUnavailable(String),
    #[error("invalid bake transition: {from} -> {to}")]
    InvalidTransition { from: BakePhase, to: BakePhase },
    #[error("bake step failed: {0}")]
    StepFailed(String),
    #[error("failed to bake image for role '{role}' during {phase}: {reason}")]
    BakeFailed {
        role: String,
        phase: BakePhase,
        reason: String,
    },
}
