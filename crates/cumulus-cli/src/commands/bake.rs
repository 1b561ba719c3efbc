use super::{json_pretty, sibling_lock, spin_fail, spin_ok, spinner, stack_error, EXIT_SUCCESS};
use cumulus_provider::{bake_stack, select_baker, ProviderConfig};
use cumulus_schema::ImageLock;
use std::path::Path;

pub fn run(stackfile: &Path, images: Option<&Path>, json: bool) -> Result<u8, String> {
    let mut stack = cumulus_schema::load_stack(stackfile).map_err(|e| stack_error(&e))?;
    let config = ProviderConfig::load_default().map_err(|e| e.to_string())?;
    let baker = select_baker(&config.baker).map_err(|e| e.to_string())?;
    let lock_path = images.map_or_else(|| sibling_lock(stackfile), Path::to_path_buf);

    let pb = if json {
        None
    } else {
        Some(spinner(&format!(
            "baking {} roles with {}...",
            stack.roles.len(),
            baker.name()
        )))
    };

    let baked = match bake_stack(&mut stack, baker.as_ref()) {
        Ok(images) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "images baked");
            }
            images
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "bake failed");
            }
            return Err(e.to_string());
        }
    };

    let lock = ImageLock::from_images(&stack, &baked);
    lock.write_to_file(&lock_path).map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({
            "stack": stack.name,
            "baker": baker.name(),
            "images": baked,
            "lock": lock_path.display().to_string(),
            "digest": lock.digest,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for (role, image) in &baked {
            println!("  {role}: {image}");
        }
        println!("wrote {}", lock_path.display());
    }
    Ok(EXIT_SUCCESS)
}
