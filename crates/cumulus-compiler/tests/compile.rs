//! Whole-stack compile tests: end-to-end scenario, determinism, reference
//! closure, address allocation and security rule synthesis.

use cumulus_compiler::{CompileError, Compiled, Compiler, Ipv4Cidr, Template};
use cumulus_provider::{bake_stack, MockBaker, StaticInventory};
use cumulus_schema::{parse_stack_str, Stack};
use serde_json::{json, Value};

fn load(stackfile: &str) -> Stack {
    let mut stack = parse_stack_str(stackfile).unwrap().normalize().unwrap();
    bake_stack(&mut stack, &MockBaker::new()).unwrap();
    stack
}

fn compile(stackfile: &str) -> Compiled {
    let stack = load(stackfile);
    let inventory = StaticInventory::default();
    Compiler::new(&inventory).compile(&stack).unwrap()
}

fn ingress(template: &Template, group: &str) -> Vec<Value> {
    template.get(group).unwrap().properties["SecurityGroupIngress"]
        .as_array()
        .unwrap()
        .clone()
}

const WEB: &str = r#"
name = "web"
description = "single web role"

[[network]]
name = "app"
region = "us-east-1"

[[network.subnet]]
name = "public"
azs = ["a", "b"]

[[role]]
name = "web"
network = "app"
subnets = ["public"]
min_size = 1
max_size = 2
target_size = 1
allow = [{ role = "web", ports = 22 }]

[[role.load_balancer]]
name = "web"
listeners = [{ port = 80 }]
"#;

#[test]
fn end_to_end_web_scenario() {
    let compiled = compile(WEB);
    let t = &compiled.template;

    assert_eq!(t.description, "single web role");
    assert_eq!(t.of_kind("AWS::EC2::Subnet").count(), 2);
    assert_eq!(
        t.of_kind("AWS::ElasticLoadBalancing::LoadBalancer").count(),
        1
    );

    assert_eq!(
        ingress(t, "WebELBSG"),
        vec![json!({ "IpProtocol": "tcp", "FromPort": 80, "ToPort": 80, "CidrIp": "0.0.0.0/0" })]
    );
    assert_eq!(
        ingress(t, "WebSG"),
        vec![
            json!({ "IpProtocol": "tcp", "FromPort": 22, "ToPort": 22, "CidrIp": "0.0.0.0/0" }),
            json!({
                "IpProtocol": "tcp",
                "FromPort": 80,
                "ToPort": 80,
                "SourceSecurityGroupId": { "Ref": "WebELBSG" }
            }),
        ]
    );

    let standalone: Vec<&str> = t
        .of_kind("AWS::EC2::SecurityGroupIngress")
        .map(|(n, _)| n)
        .collect();
    assert_eq!(standalone, vec!["WebSGTCP22"]);

    let asg = t.get("WebASG").unwrap();
    assert_eq!(asg.properties["MinSize"], 1);
    assert_eq!(asg.properties["MaxSize"], 2);
    assert_eq!(asg.properties["DesiredCapacity"], 1);
    assert_eq!(asg.properties["LoadBalancerNames"], json!([{ "Ref": "WebELB" }]));
    assert_eq!(
        asg.properties["VPCZoneIdentifier"],
        json!([{ "Ref": "AppPublicSubnetA" }, { "Ref": "AppPublicSubnetB" }])
    );

    let lt = t.get("WebLaunchTemplate").unwrap();
    let image = lt.properties["LaunchTemplateData"]["ImageId"].as_str().unwrap();
    assert!(image.starts_with("ami-"));

    let elb = t.get("WebELB").unwrap();
    assert!(elb.property("HealthCheck").is_none());
    assert!(elb.property("ConnectionSettings").is_none());
}

#[test]
fn emission_order_follows_entity_order() {
    let compiled = compile(WEB);
    let names: Vec<&str> = compiled.template.names().collect();
    let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
    assert!(pos("AppVPC") < pos("AppPublicSubnetA"));
    assert!(pos("AppPublicSubnetB") < pos("WebELB"));
    assert!(pos("WebELB") < pos("WebELBSG"));
    assert!(pos("WebELBSG") < pos("WebRole"));
    assert!(pos("WebRole") < pos("WebInstanceProfile"));
    assert!(pos("WebInstanceProfile") < pos("WebASG"));
    assert!(pos("WebASG") < pos("WebLaunchTemplate"));
    assert!(pos("WebLaunchTemplate") < pos("WebSG"));
    assert!(pos("WebSG") < pos("WebSGTCP22"));
}

#[test]
fn compiling_twice_is_byte_identical() {
    let stack = load(cumulus_schema::get_preset("logging").unwrap().stackfile);
    let inventory = StaticInventory::default();
    let compiler = Compiler::new(&inventory);
    let a = compiler.compile(&stack).unwrap();
    let b = compiler.compile(&stack).unwrap();
    assert_eq!(
        a.template.to_json_pretty().unwrap(),
        b.template.to_json_pretty().unwrap()
    );
    assert_eq!(a.identity, b.identity);
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                out.push(target.clone());
            }
            map.values().for_each(|v| collect_refs(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

#[test]
fn every_ref_names_a_resource_in_the_document() {
    for preset in cumulus_schema::list_presets() {
        let compiled = compile(preset.stackfile);
        let document: Value =
            serde_json::from_str(&compiled.template.to_json_pretty().unwrap()).unwrap();
        let resources = document["Resources"].as_object().unwrap();
        let mut refs = Vec::new();
        collect_refs(&document["Resources"], &mut refs);
        assert!(!refs.is_empty());
        for target in refs {
            assert!(
                resources.contains_key(&target),
                "preset '{}': dangling Ref to {target}",
                preset.name
            );
        }
    }
}

#[test]
fn subnet_blocks_are_disjoint_ascending_and_contained() {
    let compiled = compile(
        r#"
name = "net"

[[network]]
name = "app"
region = "us-east-1"
cidr = "10.20.0.0/16"
subnet_bits = 10
azs = ["a", "b", "c"]

[[network.subnet]]
name = "public"

[[network.subnet]]
name = "private"
igw = false

[[network.subnet]]
name = "data"
azs = ["a"]
igw = false
"#,
    );
    let parent: Ipv4Cidr = "10.20.0.0/16".parse().unwrap();
    let blocks: Vec<Ipv4Cidr> = compiled
        .template
        .of_kind("AWS::EC2::Subnet")
        .map(|(_, r)| r.properties["CidrBlock"].as_str().unwrap().parse().unwrap())
        .collect();
    assert_eq!(blocks.len(), 7);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.prefix(), 22);
        assert!(parent.contains(block));
        for later in &blocks[i + 1..] {
            assert!(block < later);
            assert!(!block.overlaps(later));
        }
    }
    // all zones of the first subnet come before any of the second
    assert_eq!(
        compiled.template.get("AppPrivateSubnetA").unwrap().properties["CidrBlock"],
        "10.20.12.0/22"
    );
}

#[test]
fn intracluster_allow_yields_one_standalone_rule() {
    let compiled = compile(
        r#"
name = "search"

[[network]]
name = "app"
region = "us-east-1"
azs = ["a"]

[[network.subnet]]
name = "public"

[[role]]
name = "cache"
network = "app"
allow = [{ role = "cache", ports = 9200 }]
"#,
    );
    let t = &compiled.template;
    let rules: Vec<_> = t.of_kind("AWS::EC2::SecurityGroupIngress").collect();
    assert_eq!(rules.len(), 1);
    let (name, rule) = rules[0];
    assert_eq!(name, "CacheSGTCP9200");
    assert_eq!(rule.properties["GroupId"], json!({ "Ref": "CacheSG" }));
    assert_eq!(rule.properties["SourceSecurityGroupId"], json!({ "Ref": "CacheSG" }));
    assert_eq!(rule.properties["IpProtocol"], "tcp");
    assert_eq!(rule.properties["FromPort"], 9200);
    assert_eq!(rule.properties["ToPort"], 9200);
    // only the admin rule is declared in-line
    assert_eq!(ingress(t, "CacheSG").len(), 1);
}

#[test]
fn health_check_and_connection_defaults() {
    let compiled = compile(
        r#"
name = "lb"

[[network]]
name = "app"
region = "us-east-1"
azs = ["a"]

[[network.subnet]]
name = "public"

[[role]]
name = "api"
network = "app"

[[role.load_balancer]]
name = "api"
listeners = [{ port = 443, instance_port = 8080, protocol = "HTTPS", certificate = "arn:aws:acm:cert" }]
health_check = { target = "HTTP:8080/health" }
connection_settings = {}
internal = true
"#,
    );
    let elb = compiled.template.get("ApiELB").unwrap();
    assert_eq!(
        elb.properties["HealthCheck"],
        json!({
            "Target": "HTTP:8080/health",
            "HealthyThreshold": 3,
            "UnhealthyThreshold": 5,
            "Interval": 90,
            "Timeout": 60,
        })
    );
    assert_eq!(elb.properties["ConnectionSettings"], json!({ "IdleTimeout": 60 }));
    assert_eq!(elb.properties["Scheme"], "internal");
    assert_eq!(
        elb.properties["Listeners"],
        json!([{
            "LoadBalancerPort": 443,
            "InstancePort": 8080,
            "Protocol": "HTTPS",
            "SSLCertificateId": "arn:aws:acm:cert",
        }])
    );
    let role_rules = ingress(&compiled.template, "ApiSG");
    assert_eq!(role_rules[1]["FromPort"], 8080);
    assert_eq!(role_rules[1]["SourceSecurityGroupId"], json!({ "Ref": "ApiELBSG" }));
}

#[test]
fn disabled_rolling_update_emits_no_update_policy() {
    let base = r#"
name = "ru"

[[network]]
name = "app"
region = "us-east-1"
azs = ["a"]

[[network.subnet]]
name = "public"

[[role]]
name = "batch"
network = "app"
min_size = 2
max_size = 3
"#;
    let enabled = compile(base);
    assert_eq!(
        enabled.template.get("BatchASG").unwrap().update_policy,
        Some(json!({
            "AutoScalingRollingUpdate": { "MaxBatchSize": 1, "MinInstancesInService": 2 }
        }))
    );

    let disabled = compile(&format!("{base}update_policy = {{ disable = true }}\n"));
    let asg = disabled.template.get("BatchASG").unwrap();
    assert!(asg.update_policy.is_none());
    let json = disabled.template.to_json_pretty().unwrap();
    assert!(!json.contains("UpdatePolicy"));
}

#[test]
fn cache_access_grants_describe_policy() {
    let stackfile = cumulus_schema::get_preset("web").unwrap().stackfile.replace(
        "provisioners = [",
        "policy_statements = [{ action = \"s3:GetObject\", resource = \"arn:aws:s3:::assets/*\" }]\nprovisioners = [",
    );
    let compiled = compile(&stackfile);
    let t = &compiled.template;
    let policy = t.get("WebPolicy").unwrap();
    assert_eq!(
        policy.properties["PolicyDocument"]["Statement"],
        json!([
            { "Effect": "Allow", "Action": ["s3:GetObject"], "Resource": ["arn:aws:s3:::assets/*"] },
            { "Effect": "Allow", "Action": ["elasticache:Describe*"], "Resource": ["*"] }
        ])
    );
    assert_eq!(
        ingress(t, "SessionsCacheSG"),
        vec![json!({
            "IpProtocol": "tcp",
            "FromPort": 6379,
            "ToPort": 6379,
            "SourceSecurityGroupId": { "Ref": "WebSG" }
        })]
    );
    let names: Vec<&str> = t.names().collect();
    let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
    assert!(pos("SessionsCache") < pos("AssetsBucket"));
    assert!(pos("AssetsBucket") < pos("WebELB"));
}

#[test]
fn policy_is_omitted_without_statements() {
    let compiled = compile(WEB);
    assert!(!compiled.template.contains("WebPolicy"));
    assert!(compiled.template.contains("WebRole"));
}

#[test]
fn policy_is_omitted_for_a_single_statement() {
    let one = WEB.replace(
        "allow = [{ role = \"web\", ports = 22 }]",
        "allow = [{ role = \"web\", ports = 22 }]\npolicy_statements = [{ action = \"s3:GetObject\", resource = \"*\" }]",
    );
    let compiled = compile(&one);
    assert!(!compiled.template.contains("WebPolicy"));

    // The cache grant alone is one statement too.
    let cached = compile(cumulus_schema::get_preset("web").unwrap().stackfile);
    assert!(!cached.template.contains("WebPolicy"));
}

#[test]
fn policy_is_emitted_for_two_statements() {
    let two = WEB.replace(
        "allow = [{ role = \"web\", ports = 22 }]",
        "allow = [{ role = \"web\", ports = 22 }]\npolicy_statements = [\n    { action = \"s3:GetObject\", resource = \"*\" },\n    { action = \"s3:PutObject\", resource = \"*\" },\n]",
    );
    let compiled = compile(&two);
    let policy = compiled.template.get("WebPolicy").unwrap();
    assert_eq!(
        policy.properties["PolicyDocument"]["Statement"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
    assert_eq!(policy.properties["Roles"], json!([{ "Ref": "WebRole" }]));
}

#[test]
fn template_vars_surface_as_launch_metadata() {
    let compiled = compile(&format!(
        "{}\n[vars]\nenv = \"prod\"\nregion = \"us\"\n",
        WEB.replace(
            "allow = [{ role = \"web\", ports = 22 }]",
            "allow = [{ role = \"web\", ports = 22 }]\nvars = { env = \"staging\", tier = \"front\" }"
        )
    ));
    let lt = compiled.template.get("WebLaunchTemplate").unwrap();
    assert_eq!(
        lt.metadata,
        Some(json!({ "Cumulus::Vars": { "env": "staging", "region": "us", "tier": "front" } }))
    );
}

const INVENTORY: &str = r#"
[[network]]
id = "vpc-0shared"
name = "shared"

[[network.subnet]]
id = "subnet-0a"
tag = "private"
az = "us-east-1a"

[[network.subnet]]
id = "subnet-0b"
tag = "private"
az = "us-east-1b"

[[network.security_group]]
id = "sg-0bastion"
tag = "bastion"

[[zone]]
id = "ZEXAMPLE"
name = "example.com"
"#;

const EXTERNAL: &str = r#"
name = "ext"

[[role]]
name = "worker"
network = "shared"
subnets = ["private", "subnet-0c"]
security_groups = ["bastion", "sg-0literal"]

[[role.load_balancer]]
name = "worker"
listeners = [{ port = 80 }]
subnets = ["private"]
dns_records = [{ name = "worker.example.com" }, { name = "alt.example.org", zone = "ZPINNED" }]

[[role]]
name = "reporter"
network = "shared"
subnets = ["private"]
"#;

#[test]
fn resolves_external_references_through_the_inventory() {
    let stack = load(EXTERNAL);
    let inventory = StaticInventory::from_toml(INVENTORY).unwrap();
    let compiled = Compiler::new(&inventory).compile(&stack).unwrap();
    let t = &compiled.template;

    let asg = t.get("WorkerASG").unwrap();
    assert_eq!(
        asg.properties["VPCZoneIdentifier"],
        json!(["subnet-0a", "subnet-0b", "subnet-0c"])
    );
    let lt = t.get("WorkerLaunchTemplate").unwrap();
    assert_eq!(
        lt.properties["LaunchTemplateData"]["SecurityGroupIds"],
        json!([{ "Ref": "WorkerSG" }, "sg-0bastion", "sg-0literal"])
    );
    assert_eq!(t.get("WorkerSG").unwrap().properties["VpcId"], "vpc-0shared");

    let dns = t.get("WorkerWorkerExampleComDNS").unwrap();
    assert_eq!(dns.properties["HostedZoneId"], "ZEXAMPLE");
    assert_eq!(
        dns.properties["AliasTarget"]["DNSName"],
        json!({ "Fn::GetAtt": ["WorkerELB", "DNSName"] })
    );
    let pinned = t.get("WorkerAltExampleOrgDNS").unwrap();
    assert_eq!(pinned.properties["HostedZoneId"], "ZPINNED");

    // network, subnet tag, security group tag and hosted zone: once each
    assert_eq!(inventory.lookup_count(), 4);
}

#[test]
fn unknown_external_network_is_unresolvable() {
    let stack = load(EXTERNAL);
    let inventory = StaticInventory::default();
    let err = Compiler::new(&inventory).compile(&stack).unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnresolvableReference { kind: "network", ref name } if name == "shared"
    ));
}

#[test]
fn undeclared_role_in_hand_built_stack_is_rejected() {
    let mut stack = load(WEB);
    stack.roles[0].allow[0].source = "ghost".into();
    let inventory = StaticInventory::default();
    let err = Compiler::new(&inventory).compile(&stack).unwrap_err();
    assert!(matches!(err, CompileError::UndeclaredRoleReference { .. }));
}

#[test]
fn exhausted_network_aborts_whole_compile() {
    let stack = load(
        r#"
name = "tiny"

[[network]]
name = "app"
region = "us-east-1"
cidr = "192.168.0.0/24"
subnet_bits = 7
azs = ["a", "b", "c"]

[[network.subnet]]
name = "public"
"#,
    );
    let inventory = StaticInventory::default();
    assert!(matches!(
        Compiler::new(&inventory).compile(&stack),
        Err(CompileError::AddressSpaceExhausted { .. })
    ));
}
