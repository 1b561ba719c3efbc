pub mod bake;
pub mod compile;
pub mod completions;
pub mod man_pages;
pub mod new;
pub mod validate;

use cumulus_compiler::CompileError;
use cumulus_schema::StackError;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_STACK_ERROR: u8 = 2;
pub const EXIT_COMPILE_ERROR: u8 = 3;

pub const IMAGES_LOCK: &str = "images.lock";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Color a resource kind by service for human output.
pub fn colorize_kind(kind: &str) -> String {
    use console::Style;
    let service = kind.split("::").nth(1).unwrap_or("");
    match service {
        "EC2" => Style::new().cyan().apply_to(kind).to_string(),
        "IAM" => Style::new().yellow().apply_to(kind).to_string(),
        "AutoScaling" => Style::new().green().apply_to(kind).to_string(),
        "ElasticLoadBalancing" | "Route53" => Style::new().blue().apply_to(kind).to_string(),
        "ElastiCache" | "S3" => Style::new().magenta().apply_to(kind).to_string(),
        _ => kind.to_owned(),
    }
}

pub fn stack_error(e: &StackError) -> String {
    format!("stack error: {e}")
}

/// Stack errors keep their own prefix; everything else is a compile failure.
pub fn compile_error(e: &CompileError) -> String {
    match e {
        CompileError::Stack(inner) => stack_error(inner),
        other => format!("compile error: {other}"),
    }
}

/// `images.lock` in the same directory as `stackfile`.
pub fn sibling_lock(stackfile: &Path) -> PathBuf {
    stackfile
        .parent()
        .map_or_else(|| PathBuf::from(IMAGES_LOCK), |dir| dir.join(IMAGES_LOCK))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_kind_keeps_text() {
        for kind in [
            "AWS::EC2::VPC",
            "AWS::IAM::Role",
            "AWS::AutoScaling::AutoScalingGroup",
            "AWS::S3::Bucket",
        ] {
            assert!(colorize_kind(kind).contains(kind));
        }
        assert_eq!(colorize_kind("Custom"), "Custom");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_STACK_ERROR);
        assert_ne!(EXIT_STACK_ERROR, EXIT_COMPILE_ERROR);
    }

    #[test]
    fn compile_error_prefixes() {
        let stack = CompileError::Stack(StackError::NoListeners("web".into()));
        assert!(compile_error(&stack).starts_with("stack error:"));
        let missing = CompileError::MissingImage("web".into());
        assert!(compile_error(&missing).starts_with("compile error:"));
    }

    #[test]
    fn sibling_lock_sits_next_to_stackfile() {
        assert_eq!(
            sibling_lock(Path::new("stacks/web/Stackfile.toml")),
            PathBuf::from("stacks/web/images.lock")
        );
        assert_eq!(
            sibling_lock(Path::new("Stackfile.toml")),
            PathBuf::from("images.lock")
        );
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
    }

    #[test]
    fn spinner_fail_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
