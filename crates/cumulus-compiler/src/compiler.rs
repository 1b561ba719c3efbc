use crate::annotate::apply_grants;
use crate::graph::GraphBuilder;
use crate::identity::{compute_template_identity, TemplateIdentity};
use crate::template::Template;
use crate::CompileError;
use cumulus_provider::Inventory;
use cumulus_schema::{ImageLock, Stack};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// A compiled stack: the template plus its content address.
#[derive(Debug, Clone, Serialize)]
pub struct Compiled {
    pub template: Template,
    pub identity: TemplateIdentity,
}

/// Entry point of the compiler.
///
/// One `Compiler` may run many compiles; every compile gets its own resolver
/// and output document, so concurrent compiles of independent stacks never
/// share mutable state.
pub struct Compiler<'a> {
    inventory: &'a dyn Inventory,
}

impl<'a> Compiler<'a> {
    pub fn new(inventory: &'a dyn Inventory) -> Self {
        Self { inventory }
    }

    /// Compile `stack` into a template. Every role must already have an image.
    ///
    /// Either the whole template is produced or nothing is: any unresolvable
    /// reference, exhausted address space or dangling reference aborts.
    pub fn compile(&self, stack: &Stack) -> Result<Compiled, CompileError> {
        info!(
            "compiling stack '{}' ({} networks, {} caches, {} buckets, {} roles) against {} inventory",
            stack.name,
            stack.networks.len(),
            stack.caches.len(),
            stack.buckets.len(),
            stack.roles.len(),
            self.inventory.name()
        );

        if let Some(role) = stack.unbaked_roles().first() {
            return Err(CompileError::MissingImage((*role).to_owned()));
        }

        let annotated = apply_grants(stack)?;
        let template = GraphBuilder::new(&annotated, self.inventory).build()?;

        if let Some((from, to)) = template.dangling_references().into_iter().next() {
            return Err(CompileError::DanglingReference { from, to });
        }

        let identity = compute_template_identity(&template)?;
        info!(
            "compiled stack '{}': {} resources, template {}",
            stack.name,
            template.len(),
            identity.short_id
        );
        Ok(Compiled { template, identity })
    }
}

/// Load a Stackfile, apply an images lock if one is given, and compile.
pub fn compile_file(
    stackfile: &Path,
    images_lock: Option<&Path>,
    inventory: &dyn Inventory,
) -> Result<Compiled, CompileError> {
    let mut stack = cumulus_schema::load_stack(stackfile)?;
    if let Some(path) = images_lock {
        let lock = ImageLock::read_from_file(path)?;
        let applied = lock.apply(&mut stack)?;
        debug!("applied {applied} images from {}", path.display());
    }
    Compiler::new(inventory).compile(&stack)
}
