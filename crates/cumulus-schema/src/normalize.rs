use crate::manifest::{PartialRole, StackError, StackManifest};
use crate::model::{Allow, Role, Stack};
use crate::naming;
use crate::types::ImageId;
use std::collections::{BTreeSet, HashMap};

/// Keyword for "the entity this rule is declared on" in an allow rule's `role`.
pub const SELF_ROLE: &str = "self";

const DEFAULT_INSTANCE_TYPE: &str = "t3.micro";

impl StackManifest {
    /// Merge profiles, resolve defaults and validate every cross reference.
    ///
    /// The result is the read-only model the compiler consumes; any undeclared
    /// role in an allow rule is rejected here rather than silently dropped.
    pub fn normalize(&self) -> Result<Stack, StackError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(StackError::EmptyName { kind: "stack" });
        }

        ensure_unique("network", self.networks.iter().map(|n| n.name.as_str()))?;
        for network in &self.networks {
            ensure_unique("subnet", network.subnets.iter().map(|s| s.name.as_str()))?;
        }
        ensure_unique("profile", self.profiles.iter().map(|p| p.name.as_str()))?;
        ensure_unique("role", self.roles.iter().map(|r| r.name.as_str()))?;
        ensure_unique("cache", self.caches.iter().map(|c| c.name.as_str()))?;
        ensure_unique("bucket", self.buckets.iter().map(|b| b.name.as_str()))?;

        let profiles: HashMap<&str, &PartialRole> = self
            .profiles
            .iter()
            .map(|p| (p.name.as_str(), p))
            .collect();
        for profile in &self.profiles {
            if !profile.include_profiles.is_empty() {
                return Err(StackError::NestedProfile(profile.name.clone()));
            }
        }

        let mut roles = Vec::with_capacity(self.roles.len());
        for declared in &self.roles {
            let mut merged = declared.clone();
            for include in &declared.include_profiles {
                let profile = profiles.get(include.as_str()).ok_or_else(|| {
                    StackError::UndeclaredProfile {
                        role: declared.name.clone(),
                        profile: include.clone(),
                    }
                })?;
                merged.apply_profile(profile);
            }
            roles.push(resolve_role(merged)?);
        }

        // Load balancer names share one namespace across the whole stack.
        ensure_unique(
            "load balancer",
            roles
                .iter()
                .flat_map(|r| r.load_balancers.iter().map(|lb| lb.name.as_str())),
        )?;

        let declared: BTreeSet<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        for role in &roles {
            check_sources(&format!("role '{}'", role.name), &role.allow, &declared)?;
            for lb in &role.load_balancers {
                check_sources(&format!("load balancer '{}'", lb.name), &lb.allow, &declared)?;
            }
        }

        let mut caches = self.caches.clone();
        for cache in &mut caches {
            cache.name = cache.name.trim().to_owned();
            if cache.name.is_empty() {
                return Err(StackError::EmptyName { kind: "cache" });
            }
            let port = cache.port();
            let target = cache.name.clone();
            for rule in &mut cache.allow {
                rule.source = rule.source.trim().to_owned();
                rule.target.clone_from(&target);
                rule.protocol = normalize_protocol(&rule.protocol);
                rule.ports = vec![port];
            }
            check_sources(&format!("cache '{}'", cache.name), &cache.allow, &declared)?;
        }

        let mut networks = self.networks.clone();
        for network in &mut networks {
            network.name = network.name.trim().to_owned();
            for subnet in &mut network.subnets {
                subnet.name = subnet.name.trim().to_owned();
            }
        }

        let stack = Stack {
            name,
            description: self.description.trim().to_owned(),
            tags: self.tags.clone(),
            vars: self.vars.clone(),
            networks,
            roles,
            profiles: self.profiles.clone(),
            caches,
            buckets: self.buckets.clone(),
        };
        check_logical_ids(&stack)?;
        Ok(stack)
    }
}

/// Resource names already handed out, keyed to the entity that claimed them.
#[derive(Default)]
struct NameClaims {
    owners: HashMap<String, String>,
}

impl NameClaims {
    fn claim(&mut self, name: String, owner: &str) -> Result<(), StackError> {
        match self.owners.get(&name) {
            Some(first) if first != owner => Err(StackError::LogicalIdCollision {
                name,
                first: first.clone(),
                second: owner.to_owned(),
            }),
            Some(_) => Ok(()),
            None => {
                self.owners.insert(name, owner.to_owned());
                Ok(())
            }
        }
    }
}

/// Distinct entity names can still flatten to the same resource name
/// (`web-app` and `web_app`, or role `web-cache` next to cache `web`).
///
/// Subnets whose zones come from the inventory are skipped.
fn check_logical_ids(stack: &Stack) -> Result<(), StackError> {
    let mut claims = NameClaims::default();

    for network in &stack.networks {
        let owner = format!("network '{}'", network.name);
        claims.claim(naming::vpc(&network.name), &owner)?;
        if network.igw {
            claims.claim(naming::internet_gateway(&network.name), &owner)?;
            claims.claim(naming::gateway_attachment(&network.name), &owner)?;
            claims.claim(naming::route_table(&network.name), &owner)?;
            claims.claim(naming::default_route(&network.name), &owner)?;
        }
        for subnet in &network.subnets {
            let zones = if subnet.azs.is_empty() {
                &network.azs
            } else {
                &subnet.azs
            };
            for zone in zones {
                let owner = format!(
                    "subnet '{}/{}' in zone '{zone}'",
                    network.name, subnet.name
                );
                let suffix = naming::zone_suffix(&network.region, zone);
                let name = naming::subnet(&network.name, &subnet.name, suffix);
                if network.igw && subnet.igw {
                    claims.claim(naming::route_table_association(&name), &owner)?;
                }
                claims.claim(name, &owner)?;
            }
        }
    }

    for cache in &stack.caches {
        let owner = format!("cache '{}'", cache.name);
        claims.claim(naming::cache(&cache.name), &owner)?;
        claims.claim(naming::cache_sg(&cache.name), &owner)?;
        claims.claim(naming::cache_subnet_group(&cache.name), &owner)?;
    }

    for bucket in &stack.buckets {
        claims.claim(naming::bucket(&bucket.name), &format!("bucket '{}'", bucket.name))?;
    }

    for role in &stack.roles {
        let owner = format!("role '{}'", role.name);
        for name in [
            naming::iam_role(&role.name),
            naming::policy(&role.name),
            naming::instance_profile(&role.name),
            naming::autoscaling_group(&role.name),
            naming::launch_template(&role.name),
            naming::role_sg(&role.name),
        ] {
            claims.claim(name, &owner)?;
        }
        for rule in role.allow.iter().filter(|r| r.is_intracluster()) {
            for port in &rule.ports {
                claims.claim(
                    naming::intracluster_ingress(&role.name, &rule.protocol, *port),
                    &owner,
                )?;
            }
        }
        for lb in &role.load_balancers {
            let owner = format!("load balancer '{}'", lb.name);
            claims.claim(naming::load_balancer(&lb.name), &owner)?;
            claims.claim(naming::load_balancer_sg(&lb.name), &owner)?;
            for record in &lb.dns_records {
                claims.claim(naming::dns_record(&lb.name, &record.name), &owner)?;
            }
        }
    }
    Ok(())
}

fn resolve_role(partial: PartialRole) -> Result<Role, StackError> {
    let name = partial.name.trim().to_owned();
    if name.is_empty() {
        return Err(StackError::EmptyName { kind: "role" });
    }

    let network = partial
        .network
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StackError::MissingNetwork(name.clone()))?;

    let min_size = partial.min_size.unwrap_or(1);
    let max_size = partial.max_size.unwrap_or(min_size);
    let target_size = partial.target_size.unwrap_or(min_size);
    if !(min_size <= target_size && target_size <= max_size) {
        return Err(StackError::InvalidCapacity {
            role: name,
            min: min_size,
            target: target_size,
            max: max_size,
        });
    }

    let referrer = format!("role '{name}'");
    let mut allow = Vec::with_capacity(partial.allow.len());
    for rule in partial.allow {
        let rule = normalize_allow(rule, &name, &name);
        if rule.ports.is_empty() {
            return Err(StackError::MissingPorts {
                referrer,
                source_role: rule.source,
            });
        }
        allow.push(rule);
    }

    let mut load_balancers = partial.load_balancers;
    for lb in &mut load_balancers {
        lb.name = lb.name.trim().to_owned();
        if lb.name.is_empty() {
            return Err(StackError::EmptyName {
                kind: "load balancer",
            });
        }
        if lb.listeners.is_empty() {
            return Err(StackError::NoListeners(lb.name.clone()));
        }
        let target = lb.name.clone();
        lb.allow = std::mem::take(&mut lb.allow)
            .into_iter()
            .map(|rule| normalize_allow(rule, &name, &target))
            .collect();
    }

    Ok(Role {
        name,
        min_size,
        max_size,
        target_size,
        update_policy: partial.update_policy.unwrap_or_default(),
        instance_type: partial
            .instance_type
            .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_owned()),
        key_pair: partial.key_pair,
        block_devices: partial.block_devices,
        network,
        subnets: partial.subnets,
        security_groups: partial.security_groups,
        policy_statements: partial.policy_statements,
        allow,
        provisioners: partial.provisioners,
        base_image: partial.base_image,
        vars: partial.vars,
        tags: partial.tags,
        load_balancers,
        image: partial.image.map(ImageId::new),
    })
}

/// `owner` is the role that declared the rule, `target` the entity it protects.
fn normalize_allow(mut rule: Allow, owner: &str, target: &str) -> Allow {
    let source = rule.source.trim();
    rule.source = if source == SELF_ROLE {
        owner.to_owned()
    } else {
        source.to_owned()
    };
    target.clone_into(&mut rule.target);
    rule.protocol = normalize_protocol(&rule.protocol);
    let mut seen = BTreeSet::new();
    rule.ports.retain(|p| seen.insert(*p));
    rule
}

fn normalize_protocol(protocol: &str) -> String {
    let p = protocol.trim().to_lowercase();
    if p.is_empty() {
        crate::model::default_protocol()
    } else {
        p
    }
}

fn check_sources(
    referrer: &str,
    rules: &[Allow],
    declared: &BTreeSet<&str>,
) -> Result<(), StackError> {
    for rule in rules {
        if !declared.contains(rule.source.as_str()) {
            return Err(StackError::UndeclaredRoleReference {
                referrer: referrer.to_owned(),
                role: rule.source.clone(),
            });
        }
    }
    Ok(())
}

fn ensure_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), StackError> {
    let mut seen = BTreeSet::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StackError::EmptyName { kind });
        }
        if !seen.insert(trimmed) {
            return Err(StackError::DuplicateName {
                kind,
                name: trimmed.to_owned(),
            });
        }
    }
    Ok(())
}
