use super::{json_pretty, stack_error, EXIT_SUCCESS};
use cumulus_schema::{get_preset, list_presets, parse_stack_str};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DEST_STACKFILE: &str = "Stackfile.toml";
const DEFAULT_TEMPLATE: &str = "minimal";

/// Render the named starter stack under a new stack name.
fn render_template(template: &str, name: &str) -> Result<String, String> {
    let preset = get_preset(template).ok_or_else(|| {
        let known: Vec<&str> = list_presets().iter().map(|p| p.name).collect();
        format!(
            "unknown template '{template}' (expected: {})",
            known.join(", ")
        )
    })?;
    let body = preset
        .stackfile
        .split_once('\n')
        .filter(|(first, _)| first.starts_with("name ="))
        .map(|(_, rest)| rest)
        .ok_or_else(|| format!("template '{template}' does not start with a stack name"))?;
    let quoted = toml::Value::String(name.to_owned()).to_string();
    let rendered = format!("name = {quoted}\n{body}");

    parse_stack_str(&rendered)
        .and_then(|manifest| manifest.normalize())
        .map_err(|e| stack_error(&e))?;
    Ok(rendered)
}

fn write_atomic(dest: &Path, content: &str) -> Result<(), String> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| format!("write temp file: {e}"))?;
    use std::io::Write;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist stackfile: {}", e.error))?;
    Ok(())
}

fn print_result(name: &str, template: &str, json: bool) -> Result<(), String> {
    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": format!("./{DEST_STACKFILE}"),
            "name": name,
            "template": template,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote ./{DEST_STACKFILE} for '{name}'");
        println!("template: {template}");
    }
    Ok(())
}

pub fn run(name: &str, template: Option<&str>, force: bool, json: bool) -> Result<u8, String> {
    let dest = Path::new(DEST_STACKFILE);
    let template = template.unwrap_or(DEFAULT_TEMPLATE);
    let rendered = render_template(template, name)?;
    if dest.exists() && !force {
        return Err(format!(
            "refusing to overwrite existing ./{DEST_STACKFILE} (pass --force)"
        ));
    }
    write_atomic(dest, &rendered)?;
    print_result(name, template, json)?;
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_renders() {
        for preset in list_presets() {
            let rendered = render_template(preset.name, "shop").unwrap();
            let stack = parse_stack_str(&rendered).unwrap().normalize().unwrap();
            assert_eq!(stack.name, "shop");
        }
    }

    #[test]
    fn name_is_quoted() {
        let rendered = render_template("minimal", "say \"hi\"").unwrap();
        let manifest = parse_stack_str(&rendered).unwrap();
        assert_eq!(manifest.name, "say \"hi\"");
    }

    #[test]
    fn unknown_template_lists_choices() {
        let err = render_template("nope", "x").unwrap_err();
        assert!(err.contains("minimal"));
        assert!(err.contains("logging"));
    }

    #[test]
    fn empty_name_is_a_stack_error() {
        let err = render_template("minimal", "  ").unwrap_err();
        assert!(err.starts_with("stack error:"));
    }
}
