//! The resource graph builder.
//!
//! Entities are emitted in a fixed order: networks, caches, buckets, roles.
//! Anything a later resource refers to has already been declared or is
//! resolvable through the inventory by the time it is needed.

use crate::cidr::{CidrAllocator, Ipv4Cidr};
use crate::resolve::{zone_name, zone_suffix, Resolver};
use crate::security;
use crate::template::{ref_to, Resource, Template};
use crate::{naming, CompileError};
use cumulus_provider::Inventory;
use cumulus_schema::{Bucket, Cache, Network, Stack};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub struct GraphBuilder<'a> {
    pub(crate) stack: &'a Stack,
    pub(crate) resolver: Resolver<'a>,
    pub(crate) template: Template,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(stack: &'a Stack, inventory: &'a dyn Inventory) -> Self {
        Self {
            stack,
            resolver: Resolver::new(stack, inventory),
            template: Template::new(&stack.description),
        }
    }

    pub fn build(mut self) -> Result<Template, CompileError> {
        let stack = self.stack;
        for network in &stack.networks {
            self.emit_network(network)?;
        }
        for cache in &stack.caches {
            self.emit_cache(cache)?;
        }
        for bucket in &stack.buckets {
            self.emit_bucket(bucket)?;
        }
        for role in &stack.roles {
            self.emit_role(role)?;
        }
        Ok(self.template)
    }

    pub(crate) fn insert(&mut self, name: String, resource: Resource) -> Result<(), CompileError> {
        debug!("emit {} {name}", resource.kind);
        self.template.insert(name, resource)
    }

    /// Stack tags, then `extra`, then a `Name` tag, as a provider tag list.
    pub(crate) fn tags(&self, name: &str, extra: &BTreeMap<String, String>) -> Value {
        let mut merged = self.stack.tags.clone();
        merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.insert("Name".to_owned(), format!("{}-{name}", self.stack.name));
        Value::Array(
            merged
                .into_iter()
                .map(|(k, v)| json!({ "Key": k, "Value": v }))
                .collect(),
        )
    }

    /// Subnet handles for an entity; an empty list means every subnet of its
    /// network, which only works when the network is declared locally.
    pub(crate) fn subnets_for(
        &mut self,
        owner: &str,
        network: &str,
        names: &[String],
    ) -> Result<Vec<Value>, CompileError> {
        if !names.is_empty() {
            return self.resolver.resolve_subnets(network, names);
        }
        let stack = self.stack;
        let all: Vec<String> = stack
            .network(network)
            .map(|n| n.subnets.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default();
        if all.is_empty() {
            return Err(CompileError::NoSubnets(owner.to_owned()));
        }
        self.resolver.resolve_subnets(network, &all)
    }

    fn emit_network(&mut self, network: &Network) -> Result<(), CompileError> {
        debug!("emitting network '{}'", network.name);
        let vpc = naming::vpc(&network.name);
        let cidr: Ipv4Cidr = network.cidr.parse()?;
        let no_tags = BTreeMap::new();

        self.insert(
            vpc.clone(),
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": cidr.to_string(),
                    "EnableDnsSupport": network.dns,
                    "EnableDnsHostnames": network.dns_hostnames,
                    "Tags": self.tags(&network.name, &no_tags),
                }),
            ),
        )?;

        let route_table = naming::route_table(&network.name);
        if network.igw {
            let igw = naming::internet_gateway(&network.name);
            let attachment = naming::gateway_attachment(&network.name);
            self.insert(
                igw.clone(),
                Resource::new(
                    "AWS::EC2::InternetGateway",
                    json!({ "Tags": self.tags(&network.name, &no_tags) }),
                ),
            )?;
            self.insert(
                attachment.clone(),
                Resource::new(
                    "AWS::EC2::VPCGatewayAttachment",
                    json!({
                        "VpcId": ref_to(&vpc),
                        "InternetGatewayId": ref_to(&igw),
                    }),
                ),
            )?;
            self.insert(
                route_table.clone(),
                Resource::new("AWS::EC2::RouteTable", json!({ "VpcId": ref_to(&vpc) })),
            )?;
            self.insert(
                naming::default_route(&network.name),
                Resource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": ref_to(&route_table),
                        "DestinationCidrBlock": security::ANYWHERE,
                        "GatewayId": ref_to(&igw),
                    }),
                )
                .depends_on(&attachment),
            )?;
        }

        let mut blocks = CidrAllocator::new(cidr, network.subnet_bits);
        for subnet in &network.subnets {
            for zone in self.resolver.subnet_zones(network, subnet)? {
                let block = blocks
                    .next()
                    .ok_or_else(|| CompileError::AddressSpaceExhausted {
                        network: network.name.clone(),
                        cidr: cidr.to_string(),
                        bits: network.subnet_bits,
                    })?;
                let suffix = zone_suffix(&network.region, &zone);
                let name = naming::subnet(&network.name, &subnet.name, suffix);
                let tag_name = format!("{}-{}{suffix}", network.name, subnet.name);
                self.insert(
                    name.clone(),
                    Resource::new(
                        "AWS::EC2::Subnet",
                        json!({
                            "VpcId": ref_to(&vpc),
                            "CidrBlock": block.to_string(),
                            "AvailabilityZone": zone_name(&network.region, &zone),
                            "MapPublicIpOnLaunch": subnet.maps_public_ip(),
                            "Tags": self.tags(&tag_name, &no_tags),
                        }),
                    ),
                )?;
                if network.igw && subnet.igw {
                    self.insert(
                        naming::route_table_association(&name),
                        Resource::new(
                            "AWS::EC2::SubnetRouteTableAssociation",
                            json!({
                                "SubnetId": ref_to(&name),
                                "RouteTableId": ref_to(&route_table),
                            }),
                        ),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn emit_cache(&mut self, cache: &Cache) -> Result<(), CompileError> {
        debug!("emitting cache '{}'", cache.name);
        let sg = naming::cache_sg(&cache.name);
        let subnet_group = naming::cache_subnet_group(&cache.name);
        let vpc = self.resolver.resolve_network(&cache.network)?;
        let subnets = self.subnets_for(&cache.name, &cache.network, &cache.subnets)?;

        self.insert(
            sg.clone(),
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("{} cache security group", cache.name),
                    "VpcId": vpc.to_value(),
                    "SecurityGroupIngress": security::cache_ingress(cache),
                    "Tags": self.tags(&cache.name, &BTreeMap::new()),
                }),
            ),
        )?;
        self.insert(
            subnet_group.clone(),
            Resource::new(
                "AWS::ElastiCache::SubnetGroup",
                json!({
                    "Description": format!("{} cache subnets", cache.name),
                    "SubnetIds": subnets,
                }),
            ),
        )?;
        self.insert(
            naming::cache(&cache.name),
            Resource::new(
                "AWS::ElastiCache::CacheCluster",
                json!({
                    "Engine": cache.engine.as_str(),
                    "CacheNodeType": cache.node_type,
                    "NumCacheNodes": cache.nodes,
                    "Port": cache.port(),
                    "CacheSubnetGroupName": ref_to(&subnet_group),
                    "VpcSecurityGroupIds": [ref_to(&sg)],
                }),
            ),
        )
    }

    fn emit_bucket(&mut self, bucket: &Bucket) -> Result<(), CompileError> {
        debug!("emitting bucket '{}'", bucket.name);
        let mut properties = json!({ "Tags": self.tags(&bucket.name, &BTreeMap::new()) });
        if let Some(name) = &bucket.bucket_name {
            properties["BucketName"] = json!(name);
        }
        if let Some(acl) = &bucket.access_control {
            properties["AccessControl"] = json!(acl);
        }
        self.insert(
            naming::bucket(&bucket.name),
            Resource::new("AWS::S3::Bucket", properties),
        )
    }

    /// Network handle for a role or load balancer security group.
    pub(crate) fn network_value(&mut self, network: &str) -> Result<Value, CompileError> {
        Ok(self.resolver.resolve_network(network)?.to_value())
    }
}
