use crate::bake::{BakePhase, BakeRequest, BakeSession, ImageBaker};
use crate::ProviderError;
use cumulus_schema::{provisioning_digest, ImageId};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Deterministic in-process baker.
///
/// Image ids derive from the stack, role and provisioning digest, so the same
/// Stackfile always bakes to the same ids.
pub struct MockBaker {
    fail_at: Option<BakePhase>,
    sessions: Mutex<BTreeMap<String, Vec<BakePhase>>>,
}

impl Default for MockBaker {
    fn default() -> Self {
        Self {
            fail_at: None,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }
}

impl MockBaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A baker whose every bake fails when it reaches `phase`.
    pub fn failing_at(phase: BakePhase) -> Self {
        Self {
            fail_at: Some(phase),
            ..Self::default()
        }
    }

    pub fn baked_roles(&self) -> Vec<String> {
        self.sessions
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Phases the last bake of `role` went through.
    pub fn history(&self, role: &str) -> Option<Vec<BakePhase>> {
        self.sessions.lock().ok()?.get(role).cloned()
    }
}

impl ImageBaker for MockBaker {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn bake(&self, request: &BakeRequest<'_>) -> Result<ImageId, ProviderError> {
        let role = request.role;
        let mut session = BakeSession::new(&role.name);
        let result = session.run(|phase| {
            if self.fail_at == Some(phase) {
                return Err(ProviderError::StepFailed(format!("injected failure at {phase}")));
            }
            Ok(())
        });

        self.sessions
            .lock()
            .map_err(|e| ProviderError::StepFailed(format!("mutex poisoned: {e}")))?
            .insert(role.name.clone(), session.history().to_vec());
        result?;

        let digest = blake3::hash(
            format!(
                "mock-bake:{}:{}:{}",
                request.stack,
                role.name,
                provisioning_digest(role)
            )
            .as_bytes(),
        )
        .to_hex();
        Ok(ImageId::new(format!("ami-{}", &digest.as_str()[..17])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> cumulus_schema::Stack {
        cumulus_schema::parse_stack_str(
            r#"
name = "s"

[[network]]
name = "n"
region = "us-east-1"

[[role]]
name = "web"
network = "n"
provisioners = [{ type = "shell", inline = "echo hi" }]
"#,
        )
        .unwrap()
        .normalize()
        .unwrap()
    }

    #[test]
    fn bake_is_deterministic() {
        let stack = stack();
        let role = stack.role("web").unwrap();
        let req = BakeRequest { stack: "s", role };
        let a = MockBaker::new().bake(&req).unwrap();
        let b = MockBaker::new().bake(&req).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), "ami-".len() + 17);
    }

    #[test]
    fn image_changes_with_provisioners() {
        let mut stack = stack();
        let before = MockBaker::new()
            .bake(&BakeRequest {
                stack: "s",
                role: stack.role("web").unwrap(),
            })
            .unwrap();
        stack.role_mut("web").unwrap().provisioners.clear();
        let after = MockBaker::new()
            .bake(&BakeRequest {
                stack: "s",
                role: stack.role("web").unwrap(),
            })
            .unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn records_full_history() {
        let stack = stack();
        let baker = MockBaker::new();
        baker
            .bake(&BakeRequest {
                stack: "s",
                role: stack.role("web").unwrap(),
            })
            .unwrap();
        let history = baker.history("web").unwrap();
        assert_eq!(history.first(), Some(&BakePhase::Pending));
        assert_eq!(history.last(), Some(&BakePhase::Released));
        assert!(!history.contains(&BakePhase::Failed));
    }
}
