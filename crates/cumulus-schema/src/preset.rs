use serde::Serialize;

/// A starter Stackfile shipped with the binary, used by `cumulus new`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub stackfile: &'static str,
}

pub const BUILTIN_PRESETS: &[Preset] = &[
    Preset {
        name: "minimal",
        description: "One network and a single role with no load balancer",
        stackfile: r#"name = "minimal"
description = "Minimal single-role stack"

[[network]]
name = "main"
region = "us-east-1"
azs = ["a", "b"]

[[network.subnet]]
name = "public"

[[role]]
name = "app"
network = "main"
subnets = ["public"]
instance_type = "t3.micro"
"#,
    },
    Preset {
        name: "web",
        description: "Load-balanced web tier with a redis cache and an asset bucket",
        stackfile: r#"name = "web"
description = "Load-balanced web tier"

[[network]]
name = "app"
region = "us-east-1"

[[network.subnet]]
name = "public"
azs = ["a", "b"]

[[network.subnet]]
name = "private"
azs = ["a", "b"]
igw = false

[[role]]
name = "web"
network = "app"
subnets = ["public"]
min_size = 2
max_size = 4
target_size = 2
provisioners = [{ type = "shell", inline = ["apt-get install -y nginx"] }]

[[role.load_balancer]]
name = "web"
listeners = [{ port = 80 }]
health_check = { target = "HTTP:80/" }

[[cache]]
name = "sessions"
network = "app"
subnets = ["private"]
allow = [{ role = "web" }]

[[bucket]]
name = "assets"
access_control = "Private"
"#,
    },
    Preset {
        name: "logging",
        description: "Log shipping and search cluster with intracluster traffic",
        stackfile: r#"name = "logs"
description = "logstash cluster"

[[network]]
name = "logs"
region = "ap-southeast-2"

[[network.subnet]]
name = "public"
azs = ["a", "b"]

[[profile]]
name = "ec2_discovery"
policy_statements = [{ action = "ec2:DescribeInstances", resource = "*" }]

[[role]]
name = "logstash"
include_profiles = ["ec2_discovery"]
network = "logs"
subnets = ["public"]
min_size = 2
max_size = 4
target_size = 2
update_policy = { pause_time = "PT5M" }
provisioners = [{ type = "chef", run_list = "logstash" }]

[[role.load_balancer]]
name = "logstash"
listeners = [{ port = 80 }, { port = 9000, protocol = "TCP" }]
health_check = { target = "HTTP:80/health" }

[[role]]
name = "elasticsearch"
include_profiles = ["ec2_discovery"]
network = "logs"
subnets = ["public"]
min_size = 3
max_size = 5
target_size = 3
update_policy = { pause_time = "PT10M", min_in_service = 3 }
provisioners = [{ type = "chef", run_list = "elasticsearch" }]
allow = [
  { role = "logstash", ports = 9200 },
  { role = "elasticsearch", ports = [9200, 9300] },
]
"#,
    },
];

pub fn get_preset(name: &str) -> Option<&'static Preset> {
    BUILTIN_PRESETS.iter().find(|p| p.name == name)
}

pub fn list_presets() -> &'static [Preset] {
    BUILTIN_PRESETS
}
