//! Expands allow intents and listeners into concrete ingress rules.
//!
//! Rules that fit inside a security group's own declaration are returned as
//! plain JSON objects; a role reaching itself cannot be declared in-line (the
//! group would reference itself while being defined) and becomes a standalone
//! `AWS::EC2::SecurityGroupIngress` resource instead.

use crate::naming;
use crate::template::{ref_to, Resource};
use cumulus_schema::{Allow, Cache, LoadBalancer, Role};
use serde_json::{json, Value};

/// Port of the administrative rule every role group carries.
pub const ADMIN_PORT: u16 = 22;
pub const ANYWHERE: &str = "0.0.0.0/0";

pub const INGRESS_KIND: &str = "AWS::EC2::SecurityGroupIngress";

pub fn ingress_from_cidr(protocol: &str, port: u16, cidr: &str) -> Value {
    json!({
        "IpProtocol": protocol,
        "FromPort": port,
        "ToPort": port,
        "CidrIp": cidr,
    })
}

pub fn ingress_from_group(protocol: &str, port: u16, group: Value) -> Value {
    json!({
        "IpProtocol": protocol,
        "FromPort": port,
        "ToPort": port,
        "SourceSecurityGroupId": group,
    })
}

/// Ordered, duplicate-free rule list.
#[derive(Debug, Default)]
struct RuleSet(Vec<Value>);

impl RuleSet {
    fn push(&mut self, rule: Value) {
        if !self.0.contains(&rule) {
            self.0.push(rule);
        }
    }

    fn extend_from_allow(&mut self, rule: &Allow, ports: &[u16]) {
        let source = ref_to(&naming::role_sg(&rule.source));
        for port in ports {
            self.push(ingress_from_group(&rule.protocol, *port, source.clone()));
        }
    }
}

/// In-line ingress for a role's own group: the admin rule, every allow from
/// another role, and every listener of the load balancers in front of it.
pub fn role_ingress(role: &Role) -> Vec<Value> {
    let mut rules = RuleSet::default();
    rules.push(ingress_from_cidr("tcp", ADMIN_PORT, ANYWHERE));
    for rule in role.allow.iter().filter(|r| !r.is_intracluster()) {
        rules.extend_from_allow(rule, &rule.ports);
    }
    for lb in &role.load_balancers {
        let source = ref_to(&naming::load_balancer_sg(&lb.name));
        for listener in &lb.listeners {
            rules.push(ingress_from_group(
                "tcp",
                listener.instance_port(),
                source.clone(),
            ));
        }
    }
    rules.0
}

/// Standalone resources for every role-to-itself allow rule, one per port.
pub fn intracluster_rules(role: &Role) -> Vec<(String, Resource)> {
    let group = naming::role_sg(&role.name);
    let mut out: Vec<(String, Resource)> = Vec::new();
    for rule in role.allow.iter().filter(|r| r.is_intracluster()) {
        for port in &rule.ports {
            let name = naming::intracluster_ingress(&role.name, &rule.protocol, *port);
            if out.iter().any(|(n, _)| *n == name) {
                continue;
            }
            let resource = Resource::new(
                INGRESS_KIND,
                json!({
                    "GroupId": ref_to(&group),
                    "IpProtocol": rule.protocol,
                    "FromPort": port,
                    "ToPort": port,
                    "SourceSecurityGroupId": ref_to(&group),
                }),
            );
            out.push((name, resource));
        }
    }
    out
}

/// In-line ingress for a load balancer's group: each listener port open to
/// the world, plus each allow entry sourced from the named role's group.
///
/// An allow entry without ports opens every listener port.
pub fn load_balancer_ingress(lb: &LoadBalancer) -> Vec<Value> {
    let mut rules = RuleSet::default();
    let listener_ports: Vec<u16> = lb.listeners.iter().map(|l| l.lb_port()).collect();
    for port in &listener_ports {
        rules.push(ingress_from_cidr("tcp", *port, ANYWHERE));
    }
    for rule in &lb.allow {
        let ports = if rule.ports.is_empty() {
            &listener_ports
        } else {
            &rule.ports
        };
        rules.extend_from_allow(rule, ports);
    }
    rules.0
}

/// In-line ingress for a cache's group: each allowed role on the engine port.
pub fn cache_ingress(cache: &Cache) -> Vec<Value> {
    let mut rules = RuleSet::default();
    for rule in &cache.allow {
        rules.extend_from_allow(rule, &[cache.port()]);
    }
    rules.0
}
