use crate::graph::GraphBuilder;
use crate::security;
use crate::template::{get_att, ref_to, Resource};
use crate::{naming, CompileError};
use cumulus_schema::{HealthCheck, LoadBalancer, PolicyStatement, Role};
use serde_json::{json, Map, Value};
use tracing::debug;

const HEALTHY_THRESHOLD: u32 = 3;
const UNHEALTHY_THRESHOLD: u32 = 5;
const HEALTH_CHECK_INTERVAL: u32 = 90;
const HEALTH_CHECK_TIMEOUT: u32 = 60;
const IDLE_TIMEOUT: u32 = 60;
const MAX_BATCH_SIZE: u32 = 1;

/// Launch template metadata key carrying the merged template variables.
pub const VARS_METADATA_KEY: &str = "Cumulus::Vars";

pub(crate) fn health_check(check: &HealthCheck) -> Value {
    json!({
        "Target": check.target,
        "HealthyThreshold": check.healthy_threshold.unwrap_or(HEALTHY_THRESHOLD),
        "UnhealthyThreshold": check.unhealthy_threshold.unwrap_or(UNHEALTHY_THRESHOLD),
        "Interval": check.interval.unwrap_or(HEALTH_CHECK_INTERVAL),
        "Timeout": check.timeout.unwrap_or(HEALTH_CHECK_TIMEOUT),
    })
}

/// `None` when the role opts out of rolling updates entirely.
pub(crate) fn rolling_update(role: &Role) -> Option<Value> {
    let policy = &role.update_policy;
    if policy.disable {
        return None;
    }
    let mut update = json!({
        "MaxBatchSize": policy.max_batch.unwrap_or(MAX_BATCH_SIZE),
        "MinInstancesInService": policy.min_in_service.unwrap_or(role.min_size),
    });
    if let Some(pause) = &policy.pause_time {
        update["PauseTime"] = json!(pause);
    }
    Some(json!({ "AutoScalingRollingUpdate": update }))
}

fn policy_statement(statement: &PolicyStatement) -> Value {
    let mut out = json!({
        "Effect": statement.effect,
        "Action": statement.action,
        "Resource": statement.resource,
    });
    if let Some(condition) = &statement.condition {
        out["Condition"] = condition.clone();
    }
    out
}

impl GraphBuilder<'_> {
    pub(crate) fn emit_role(&mut self, role: &Role) -> Result<(), CompileError> {
        debug!("emitting role '{}'", role.name);
        let image = role
            .image
            .as_ref()
            .ok_or_else(|| CompileError::MissingImage(role.name.clone()))?;

        for lb in &role.load_balancers {
            self.emit_load_balancer(role, lb)?;
        }

        let iam_role = naming::iam_role(&role.name);
        self.insert(
            iam_role.clone(),
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": {
                        "Statement": [{
                            "Effect": "Allow",
                            "Principal": { "Service": ["ec2.amazonaws.com"] },
                            "Action": ["sts:AssumeRole"],
                        }],
                    },
                    "Path": "/",
                }),
            ),
        )?;

        // A role needs more than one statement before it gets a policy.
        if role.policy_statements.len() > 1 {
            let policy = naming::policy(&role.name);
            let statements: Vec<Value> =
                role.policy_statements.iter().map(policy_statement).collect();
            self.insert(
                policy.clone(),
                Resource::new(
                    "AWS::IAM::Policy",
                    json!({
                        "PolicyName": policy,
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": statements,
                        },
                        "Roles": [ref_to(&iam_role)],
                    }),
                ),
            )?;
        }

        let profile = naming::instance_profile(&role.name);
        self.insert(
            profile.clone(),
            Resource::new(
                "AWS::IAM::InstanceProfile",
                json!({ "Path": "/", "Roles": [ref_to(&iam_role)] }),
            ),
        )?;

        let launch_template = naming::launch_template(&role.name);
        let subnets = self.subnets_for(&role.name, &role.network, &role.subnets)?;
        let mut asg_tags = self.tags(&role.name, &role.tags);
        if let Value::Array(tags) = &mut asg_tags {
            for tag in tags {
                tag["PropagateAtLaunch"] = json!(true);
            }
        }
        let lb_names: Vec<Value> = role
            .load_balancers
            .iter()
            .map(|lb| ref_to(&naming::load_balancer(&lb.name)))
            .collect();
        self.insert(
            naming::autoscaling_group(&role.name),
            Resource::new(
                "AWS::AutoScaling::AutoScalingGroup",
                json!({
                    "LaunchTemplate": {
                        "LaunchTemplateId": ref_to(&launch_template),
                        "Version": get_att(&launch_template, "LatestVersionNumber"),
                    },
                    "MinSize": role.min_size,
                    "MaxSize": role.max_size,
                    "DesiredCapacity": role.target_size,
                    "LoadBalancerNames": lb_names,
                    "VPCZoneIdentifier": subnets,
                    "Tags": asg_tags,
                }),
            )
            .with_update_policy(rolling_update(role)),
        )?;

        let role_sg = naming::role_sg(&role.name);
        let mut groups = vec![ref_to(&role_sg)];
        groups.extend(
            self.resolver
                .resolve_security_groups(&role.network, &role.security_groups)?,
        );
        let mut data = json!({
            "ImageId": image.as_str(),
            "InstanceType": role.instance_type,
            "IamInstanceProfile": { "Arn": get_att(&profile, "Arn") },
            "SecurityGroupIds": groups,
        });
        if let Some(key) = &role.key_pair {
            data["KeyName"] = json!(key);
        }
        if !role.block_devices.is_empty() {
            data["BlockDeviceMappings"] = role
                .block_devices
                .iter()
                .map(|d| {
                    json!({
                        "DeviceName": d.device,
                        "Ebs": {
                            "VolumeSize": d.size,
                            "VolumeType": d.volume_type,
                            "DeleteOnTermination": d.delete_on_termination,
                        },
                    })
                })
                .collect();
        }
        let mut vars = self.stack.vars.clone();
        vars.extend(role.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        let metadata = (!vars.is_empty()).then(|| {
            let mut m = Map::new();
            m.insert(VARS_METADATA_KEY.to_owned(), json!(vars));
            Value::Object(m)
        });
        self.insert(
            launch_template,
            Resource::new(
                "AWS::EC2::LaunchTemplate",
                json!({
                    "LaunchTemplateName": format!("{}-{}", self.stack.name, role.name),
                    "LaunchTemplateData": data,
                }),
            )
            .with_metadata(metadata),
        )?;

        let vpc = self.network_value(&role.network)?;
        self.insert(
            role_sg,
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("{} security group", role.name),
                    "VpcId": vpc,
                    "SecurityGroupIngress": security::role_ingress(role),
                    "Tags": self.tags(&role.name, &role.tags),
                }),
            ),
        )?;

        for (name, resource) in security::intracluster_rules(role) {
            self.insert(name, resource)?;
        }
        Ok(())
    }

    fn emit_load_balancer(&mut self, role: &Role, lb: &LoadBalancer) -> Result<(), CompileError> {
        let name = naming::load_balancer(&lb.name);
        let sg = naming::load_balancer_sg(&lb.name);
        let subnet_names = if lb.subnets.is_empty() {
            &role.subnets
        } else {
            &lb.subnets
        };
        let subnets = self.subnets_for(&lb.name, &role.network, subnet_names)?;
        let mut groups = vec![ref_to(&sg)];
        groups.extend(
            self.resolver
                .resolve_security_groups(&role.network, &lb.security_groups)?,
        );

        let listeners: Vec<Value> = lb
            .listeners
            .iter()
            .map(|l| {
                let mut listener = json!({
                    "LoadBalancerPort": l.lb_port(),
                    "InstancePort": l.instance_port(),
                    "Protocol": l.protocol,
                });
                if let Some(cert) = &l.certificate {
                    listener["SSLCertificateId"] = json!(cert);
                }
                listener
            })
            .collect();

        let mut properties = Map::new();
        properties.insert("Listeners".into(), Value::Array(listeners));
        properties.insert("CrossZone".into(), json!(true));
        properties.insert("Subnets".into(), Value::Array(subnets));
        properties.insert("SecurityGroups".into(), Value::Array(groups));
        if let Some(check) = &lb.health_check {
            properties.insert("HealthCheck".into(), health_check(check));
        }
        if let Some(settings) = &lb.connection_settings {
            properties.insert(
                "ConnectionSettings".into(),
                json!({ "IdleTimeout": settings.idle_timeout.unwrap_or(IDLE_TIMEOUT) }),
            );
        }
        if lb.internal {
            properties.insert("Scheme".into(), json!("internal"));
        }
        self.insert(
            name.clone(),
            Resource::new(
                "AWS::ElasticLoadBalancing::LoadBalancer",
                Value::Object(properties),
            ),
        )?;

        let vpc = self.network_value(&role.network)?;
        self.insert(
            sg,
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("{} load balancer security group", lb.name),
                    "VpcId": vpc,
                    "SecurityGroupIngress": security::load_balancer_ingress(lb),
                    "Tags": self.tags(&lb.name, &role.tags),
                }),
            ),
        )?;

        for record in &lb.dns_records {
            let zone = match &record.zone {
                Some(zone) => zone.clone(),
                None => self.resolver.hosted_zone(&record.name)?,
            };
            self.insert(
                naming::dns_record(&lb.name, &record.name),
                Resource::new(
                    "AWS::Route53::RecordSet",
                    json!({
                        "HostedZoneId": zone,
                        "Name": record.name,
                        "Type": "A",
                        "AliasTarget": {
                            "HostedZoneId": get_att(&name, "CanonicalHostedZoneNameID"),
                            "DNSName": get_att(&name, "DNSName"),
                        },
                    }),
                ),
            )?;
        }
        Ok(())
    }
}
