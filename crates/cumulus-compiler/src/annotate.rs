//! Validation and cross-cutting annotation, run before any resource is emitted.
//!
//! Granting a role access to a cache is a side effect on the role's policy.
//! Doing it here, on a copy of the stack, keeps the graph builder a pure
//! emission pass that never depends on which entity it visited first.

use crate::CompileError;
use cumulus_schema::{Allow, PolicyStatement, Stack};
use std::collections::BTreeSet;
use tracing::debug;

/// Action granted to every role a cache allows in.
pub const CACHE_DESCRIBE_ACTION: &str = "elasticache:Describe*";

/// Every allow rule in the stack must name a declared role.
pub fn validate_references(stack: &Stack) -> Result<(), CompileError> {
    let declared: BTreeSet<&str> = stack.roles.iter().map(|r| r.name.as_str()).collect();
    let check = |referrer: String, rules: &[Allow]| -> Result<(), CompileError> {
        match rules.iter().find(|r| !declared.contains(r.source.as_str())) {
            Some(rule) => Err(CompileError::UndeclaredRoleReference {
                referrer,
                role: rule.source.clone(),
            }),
            None => Ok(()),
        }
    };
    for role in &stack.roles {
        check(format!("role '{}'", role.name), &role.allow)?;
        for lb in &role.load_balancers {
            check(format!("load balancer '{}'", lb.name), &lb.allow)?;
        }
    }
    for cache in &stack.caches {
        check(format!("cache '{}'", cache.name), &cache.allow)?;
    }
    Ok(())
}

/// Validate references and return a copy of `stack` with cache access grants
/// applied to the policies of the roles each cache allows.
pub fn apply_grants(stack: &Stack) -> Result<Stack, CompileError> {
    validate_references(stack)?;
    let mut annotated = stack.clone();
    for cache in &stack.caches {
        for rule in &cache.allow {
            let Some(role) = annotated.role_mut(&rule.source) else {
                continue;
            };
            if role.grant(PolicyStatement::allow(&[CACHE_DESCRIBE_ACTION], &["*"])) {
                debug!("cache '{}' grants describe access to role '{}'", cache.name, role.name);
            }
        }
    }
    Ok(annotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_schema::Allow;

    fn stack() -> Stack {
        cumulus_schema::parse_stack_str(
            r#"
name = "s"

[[network]]
name = "app"
region = "us-east-1"

[[role]]
name = "web"
network = "app"

[[role]]
name = "worker"
network = "app"

[[cache]]
name = "a"
network = "app"
allow = [{ role = "web" }, { role = "worker" }]

[[cache]]
name = "b"
network = "app"
allow = [{ role = "web" }]
"#,
        )
        .unwrap()
        .normalize()
        .unwrap()
    }

    #[test]
    fn grants_once_per_role() {
        let original = stack();
        let annotated = apply_grants(&original).unwrap();
        let web = annotated.role("web").unwrap();
        assert_eq!(web.policy_statements.len(), 1);
        assert_eq!(web.policy_statements[0].action, vec![CACHE_DESCRIBE_ACTION]);
        assert_eq!(annotated.role("worker").unwrap().policy_statements.len(), 1);
        // the input is left untouched
        assert!(original.role("web").unwrap().policy_statements.is_empty());
    }

    #[test]
    fn rejects_hand_built_undeclared_sources() {
        let mut s = stack();
        s.caches[1].allow.push(Allow {
            source: "ghost".into(),
            target: "b".into(),
            protocol: "tcp".into(),
            ports: vec![6379],
        });
        let err = apply_grants(&s).unwrap_err();
        match err {
            CompileError::UndeclaredRoleReference { referrer, role } => {
                assert_eq!(referrer, "cache 'b'");
                assert_eq!(role, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
