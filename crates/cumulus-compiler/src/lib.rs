//! The Cumulus infrastructure manifest compiler.
//!
//! This crate turns a normalized [`cumulus_schema::Stack`] into a
//! dependency-ordered provisioning template. It owns the CIDR allocator, the
//! reference resolver (literal id, local declaration, or inventory lookup),
//! the security rule synthesizer, the cross-cutting grant annotation pass,
//! and the resource graph builder that ties them together.

pub mod annotate;
pub mod cidr;
pub mod compiler;
pub mod graph;
pub mod identity;
pub mod resolve;
mod role;
pub mod security;
pub mod template;

pub use annotate::{apply_grants, validate_references, CACHE_DESCRIBE_ACTION};
pub use cidr::{CidrAllocator, Ipv4Cidr};
pub use cumulus_schema::naming;
pub use compiler::{compile_file, Compiled, Compiler};
pub use graph::GraphBuilder;
pub use identity::{compute_template_identity, TemplateIdentity};
pub use naming::logical_id;
pub use resolve::{NetworkRef, Resolver};
pub use template::{get_att, ref_to, Resource, Template, FORMAT_VERSION};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("stack error: {0}")]
    Stack(#[from] cumulus_schema::StackError),
    #[error("images lock error: {0}")]
    Lock(#[from] cumulus_schema::LockError),
    #[error("provider error: {0}")]
    Provider(#[from] cumulus_provider::ProviderError),
    #[error("unresolvable {kind} reference '{name}': nothing declared locally or found in the inventory")]
    UnresolvableReference { kind: &'static str, name: String },
    #[error("{referrer} allows traffic from undeclared role '{role}'")]
    UndeclaredRoleReference { referrer: String, role: String },
    #[error("address space of network '{network}' ({cidr}) exhausted carving {bits}-bit subnets")]
    AddressSpaceExhausted {
        network: String,
        cidr: String,
        bits: u8,
    },
    #[error("invalid CIDR block '{0}'")]
    InvalidCidr(String),
    #[error("role '{0}' has no image; run 'cumulus bake' or pin one in the Stackfile")]
    MissingImage(String),
    #[error("'{0}' names no subnets and its network is not declared in this stack")]
    NoSubnets(String),
    #[error("duplicate resource name '{0}'")]
    DuplicateResource(String),
    #[error("resource '{from}' references '{to}', which is not in the template")]
    DanglingReference { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
