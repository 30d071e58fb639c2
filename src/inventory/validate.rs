//! Consistency checks between the catalog and the ledger

use std::collections::HashMap;
use std::fmt;

use super::catalog::ResourceCatalog;
use super::ledger::AllocationLedger;

/// A single inconsistency found in the inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryIssue {
    /// A pool lists a node that has no node details
    MissingNodeInfo { pool: String, node: String },

    /// A node is listed in more than one pool
    NodeInManyPools { node: String, pools: Vec<String> },

    /// The ledger references a node the catalog does not know
    UnknownAllocatedNode {
        cloud: String,
        group: String,
        node: String,
    },

    /// The ledger assigns the same node more than once
    DoubleAllocation { node: String, count: usize },
}

impl fmt::Display for InventoryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNodeInfo { pool, node } => {
                write!(f, "node {} in pool {} has no node info", node, pool)
            }
            Self::NodeInManyPools { node, pools } => {
                write!(f, "node {} is listed in pools {}", node, pools.join(", "))
            }
            Self::UnknownAllocatedNode { cloud, group, node } => write!(
                f,
                "node {} allocated to {}/{} is not in the catalog",
                node, cloud, group
            ),
            Self::DoubleAllocation { node, count } => {
                write!(f, "node {} is allocated {} times", node, count)
            }
        }
    }
}

/// Check catalog and ledger invariants, returning every issue found
pub fn validate_inventory(
    catalog: &ResourceCatalog,
    ledger: &AllocationLedger,
) -> Vec<InventoryIssue> {
    let mut issues = Vec::new();

    let mut pools_by_node: HashMap<&str, Vec<String>> = HashMap::new();
    for (pool, members) in &catalog.resourcepools {
        for node in members {
            if !catalog.nodes.contains_key(node) {
                issues.push(InventoryIssue::MissingNodeInfo {
                    pool: pool.clone(),
                    node: node.clone(),
                });
            }
            pools_by_node.entry(node).or_default().push(pool.clone());
        }
    }

    let mut many: Vec<_> = pools_by_node
        .into_iter()
        .filter(|(_, pools)| pools.len() > 1)
        .collect();
    many.sort();
    issues.extend(many.into_iter().map(|(node, pools)| {
        InventoryIssue::NodeInManyPools {
            node: node.to_string(),
            pools,
        }
    }));

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for cloud in &ledger.clouds {
        for (group, node) in cloud.nodes() {
            *counts.entry(node).or_insert(0) += 1;
            if catalog.pool_of(node).is_none() {
                issues.push(InventoryIssue::UnknownAllocatedNode {
                    cloud: cloud.cloud_id.clone(),
                    group: group.to_string(),
                    node: node.to_string(),
                });
            }
        }
    }

    let mut doubles: Vec<_> = counts.into_iter().filter(|(_, c)| *c > 1).collect();
    doubles.sort();
    issues.extend(
        doubles
            .into_iter()
            .map(|(node, count)| InventoryIssue::DoubleAllocation {
                node: node.to_string(),
                count,
            }),
    );

    issues
}
