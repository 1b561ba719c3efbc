use crate::template::Template;
use crate::CompileError;
use cumulus_schema::{ShortId, TemplateId};
use serde::Serialize;

/// Content address of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateIdentity {
    pub template_id: TemplateId,
    pub short_id: ShortId,
}

/// Hash the canonical (compact) JSON form of `template`.
///
/// Resources serialize in emission order and property objects with sorted
/// keys, so equal templates always hash equally.
pub fn compute_template_identity(template: &Template) -> Result<TemplateIdentity, CompileError> {
    let canonical = serde_json::to_vec(template)?;
    let hex = blake3::hash(&canonical).to_hex().to_string();
    let short = hex[..12].to_owned();
    Ok(TemplateIdentity {
        template_id: TemplateId::new(hex),
        short_id: ShortId::new(short),
    })
}
