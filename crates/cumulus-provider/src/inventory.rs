use crate::snapshot::StaticInventory;
use crate::ProviderError;
use std::path::Path;

/// Read-only lookups against infrastructure that already exists.
///
/// Implementations return "nothing found" as `None` or an empty vector; it is
/// up to the caller to decide whether an empty answer is fatal. Retries for
/// transient failures belong inside the implementation.
pub trait Inventory: Send + Sync {
    fn name(&self) -> &str;

    /// Network id of the network tagged `Name=<tag>`.
    fn find_network_by_name(&self, tag: &str) -> Result<Option<String>, ProviderError>;

    /// Ids of every subnet in `network_id` tagged `Name=<tag>`, one per zone.
    fn find_subnets_by_tag(
        &self,
        network_id: &str,
        tag: &str,
    ) -> Result<Vec<String>, ProviderError>;

    fn find_security_groups_by_tag(
        &self,
        network_id: &str,
        tag: &str,
    ) -> Result<Vec<String>, ProviderError>;

    /// Id of the most specific hosted zone that can hold `dns_name`.
    fn hosted_zone_for(&self, dns_name: &str) -> Result<Option<String>, ProviderError>;

    /// Zone suffixes (`a`, `b`, ...) offered by `region`.
    fn availability_zones(&self, region: &str) -> Result<Vec<String>, ProviderError>;
}

/// Open the inventory a compile should query: the snapshot at `path` when one
/// is given, otherwise an empty inventory (every external lookup misses).
pub fn open_inventory(path: Option<&Path>) -> Result<Box<dyn Inventory>, ProviderError> {
    match path {
        Some(p) => Ok(Box::new(StaticInventory::load(p)?)),
        None => Ok(Box::new(StaticInventory::default())),
    }
}
