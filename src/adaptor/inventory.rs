//! Inventory reporting
//!
//! Read-only views over the catalog and the ledger for the API and the CLI.

use serde::Serialize;

use super::{Adaptor, AdaptorError};
use crate::inventory::{
    free_nodes_in_pool, validate_inventory, AllocationLedger, Interface, InventoryIssue,
    ResourceCatalog,
};

/// Counts of one resource pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourcePoolInfo {
    #[serde(rename = "resourcePoolId")]
    pub id: String,
    pub total: usize,
    pub free: usize,
    pub allocated: usize,
}

/// One catalog node and its allocation, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceInfo {
    pub name: String,

    #[serde(rename = "resourcePoolId")]
    pub resource_pool_id: String,

    #[serde(rename = "bmcAddress")]
    pub bmc_address: String,

    pub interfaces: Vec<Interface>,

    #[serde(rename = "cloudID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,

    #[serde(rename = "groupName")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

impl ResourceInfo {
    pub fn is_allocated(&self) -> bool {
        self.cloud_id.is_some()
    }
}

/// Summarize every resource pool
pub fn resource_pools(catalog: &ResourceCatalog, ledger: &AllocationLedger) -> Vec<ResourcePoolInfo> {
    catalog
        .pool_ids()
        .map(|id| {
            let total = catalog.pool_members(id).len();
            let free = free_nodes_in_pool(catalog, ledger, id).len();
            ResourcePoolInfo {
                id: id.to_string(),
                total,
                free,
                allocated: total - free,
            }
        })
        .collect()
}

/// List every catalog node, by pool, in allocation order
pub fn resources(catalog: &ResourceCatalog, ledger: &AllocationLedger) -> Vec<ResourceInfo> {
    catalog
        .pool_ids()
        .flat_map(|id| catalog.pool_members(id).iter().map(move |name| (id, name)))
        .map(|(id, name)| {
            let info = catalog.node(name);
            let owner = ledger.owner_of(name);
            ResourceInfo {
                name: name.clone(),
                resource_pool_id: id.to_string(),
                bmc_address: info.map(|i| i.bmc.address.clone()).unwrap_or_default(),
                interfaces: info.map(|i| i.interfaces.clone()).unwrap_or_default(),
                cloud_id: owner.map(|(cloud, _)| cloud.to_string()),
                group_name: owner.map(|(_, group)| group.to_string()),
            }
        })
        .collect()
}

impl Adaptor {
    pub async fn get_resource_pools(&self) -> Result<Vec<ResourcePoolInfo>, AdaptorError> {
        let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
        Ok(resource_pools(&snapshot.catalog, &snapshot.ledger))
    }

    pub async fn get_resources(&self) -> Result<Vec<ResourceInfo>, AdaptorError> {
        let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
        Ok(resources(&snapshot.catalog, &snapshot.ledger))
    }

    /// Free nodes of a resource pool; `None` for an unknown pool
    pub async fn free_nodes(&self, pool_id: &str) -> Result<Option<Vec<String>>, AdaptorError> {
        let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
        if !snapshot.catalog.resourcepools.contains_key(pool_id) {
            return Ok(None);
        }
        Ok(Some(free_nodes_in_pool(
            &snapshot.catalog,
            &snapshot.ledger,
            pool_id,
        )))
    }

    /// Consistency problems of the current inventory
    pub async fn validate_inventory(&self) -> Result<Vec<InventoryIssue>, AdaptorError> {
        let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
        Ok(validate_inventory(&snapshot.catalog, &snapshot.ledger))
    }
}
