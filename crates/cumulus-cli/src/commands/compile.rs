use super::{
    colorize_kind, compile_error, json_pretty, sibling_lock, spin_fail, spin_ok, spinner,
    EXIT_SUCCESS,
};
use cumulus_compiler::compile_file;
use cumulus_provider::{open_inventory, ProviderConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An explicit `--images` path must exist; the sibling lock is optional.
fn images_lock(stackfile: &Path, images: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = images {
        return Some(path.to_path_buf());
    }
    let sibling = sibling_lock(stackfile);
    sibling.exists().then_some(sibling)
}

pub fn run(
    stackfile: &Path,
    images: Option<&Path>,
    inventory: Option<&Path>,
    out: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let config = ProviderConfig::load_default().map_err(|e| e.to_string())?;
    let inventory_path = inventory.map(Path::to_path_buf).or(config.inventory);
    let inventory = open_inventory(inventory_path.as_deref()).map_err(|e| e.to_string())?;
    let lock = images_lock(stackfile, images);
    debug!(
        "compiling {} with images lock {:?} and {} inventory",
        stackfile.display(),
        lock,
        inventory.name()
    );

    let pb = if json || out.is_none() {
        None
    } else {
        Some(spinner("compiling stack..."))
    };
    let compiled = match compile_file(stackfile, lock.as_deref(), inventory.as_ref()) {
        Ok(c) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "stack compiled");
            }
            c
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "compile failed");
            }
            return Err(compile_error(&e));
        }
    };

    let template = compiled
        .template
        .to_json_pretty()
        .map_err(|e| compile_error(&e))?;

    match out {
        Some(path) => {
            std::fs::write(path, format!("{template}\n"))
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            if json {
                let payload = serde_json::json!({
                    "template_id": compiled.identity.template_id,
                    "short_id": compiled.identity.short_id,
                    "resources": compiled.template.len(),
                    "path": path.display().to_string(),
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                for (name, resource) in &compiled.template.resources {
                    println!("  {name:<40} {}", colorize_kind(&resource.kind));
                }
                println!(
                    "wrote {} resources to {} (template {})",
                    compiled.template.len(),
                    path.display(),
                    compiled.identity.short_id
                );
            }
        }
        None if json => {
            let payload = serde_json::json!({
                "template_id": compiled.identity.template_id,
                "short_id": compiled.identity.short_id,
                "resources": compiled.template.len(),
                "template": compiled.template,
            });
            println!("{}", json_pretty(&payload)?);
        }
        None => {
            println!("{template}");
            eprintln!("template {}", compiled.identity.template_id);
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_images_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let stackfile = dir.path().join("Stackfile.toml");
        let explicit = dir.path().join("other.lock");
        assert_eq!(images_lock(&stackfile, Some(explicit.as_path())), Some(explicit));
    }

    #[test]
    fn sibling_lock_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let stackfile = dir.path().join("Stackfile.toml");
        assert_eq!(images_lock(&stackfile, None), None);
        std::fs::write(dir.path().join("images.lock"), "").unwrap();
        assert_eq!(
            images_lock(&stackfile, None),
            Some(dir.path().join("images.lock"))
        );
    }
}
