use crate::inventory::Inventory;
use crate::ProviderError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Offline picture of an account's existing infrastructure.
///
/// ```toml
/// [[network]]
/// id = "vpc-0a1b"
/// name = "shared"
///
/// [[network.subnet]]
/// id = "subnet-11"
/// tag = "public"
/// az = "us-east-1a"
///
/// [[network.security_group]]
/// id = "sg-22"
/// tag = "bastion"
///
/// [[zone]]
/// id = "Z123"
/// name = "example.com"
///
/// [regions]
/// us-east-1 = ["a", "b", "c"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InventorySnapshot {
    #[serde(default, rename = "network")]
    pub networks: Vec<SnapshotNetwork>,
    #[serde(default, rename = "zone")]
    pub zones: Vec<SnapshotZone>,
    #[serde(default)]
    pub regions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotNetwork {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "subnet")]
    pub subnets: Vec<SnapshotSubnet>,
    #[serde(default, rename = "security_group")]
    pub security_groups: Vec<SnapshotSecurityGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSubnet {
    pub id: String,
    pub tag: String,
    #[serde(default)]
    pub az: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSecurityGroup {
    pub id: String,
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotZone {
    pub id: String,
    pub name: String,
}

/// [`Inventory`] answering from an [`InventorySnapshot`].
///
/// Every query bumps a counter so callers can check how many lookups a
/// compile actually issued.
#[derive(Debug, Default)]
pub struct StaticInventory {
    snapshot: InventorySnapshot,
    lookups: AtomicUsize,
}

impl StaticInventory {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self {
            snapshot,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ProviderError> {
        let snapshot: InventorySnapshot = toml::from_str(content)?;
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn network(&self, network_id: &str) -> Option<&SnapshotNetwork> {
        self.snapshot.networks.iter().find(|n| n.id == network_id)
    }

    fn record(&self, kind: &str, key: &str) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        debug!("inventory lookup: {kind} '{key}'");
    }
}

impl Inventory for StaticInventory {
    fn name(&self) -> &str {
        "static"
    }

    fn find_network_by_name(&self, tag: &str) -> Result<Option<String>, ProviderError> {
        self.record("network", tag);
        Ok(self
            .snapshot
            .networks
            .iter()
            .find(|n| n.name == tag)
            .map(|n| n.id.clone()))
    }

    fn find_subnets_by_tag(
        &self,
        network_id: &str,
        tag: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.record("subnet", tag);
        Ok(self
            .network(network_id)
            .map(|n| {
                n.subnets
                    .iter()
                    .filter(|s| s.tag == tag)
                    .map(|s| s.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_security_groups_by_tag(
        &self,
        network_id: &str,
        tag: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.record("security group", tag);
        Ok(self
            .network(network_id)
            .map(|n| {
                n.security_groups
                    .iter()
                    .filter(|g| g.tag == tag)
                    .map(|g| g.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn hosted_zone_for(&self, dns_name: &str) -> Result<Option<String>, ProviderError> {
        self.record("hosted zone", dns_name);
        let name = dns_name.trim_end_matches('.');
        let best = self
            .snapshot
            .zones
            .iter()
            .filter(|z| {
                let zone = z.name.trim_end_matches('.');
                name == zone || name.ends_with(&format!(".{zone}"))
            })
            .max_by_key(|z| z.name.trim_end_matches('.').split('.').count());
        Ok(best.map(|z| z.id.clone()))
    }

    fn availability_zones(&self, region: &str) -> Result<Vec<String>, ProviderError> {
        self.record("availability zones", region);
        Ok(self.snapshot.regions.get(region).cloned().unwrap_or_default())
    }
}
