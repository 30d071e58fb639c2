//! Free-node selection
//!
//! Pure function over a catalog/ledger snapshot. The result keeps catalog
//! order so that taking the first entry gives a reproducible allocation order.

use std::collections::HashSet;

use super::catalog::ResourceCatalog;
use super::ledger::AllocationLedger;

/// Nodes of a resource pool that are not present in any ledger entry
pub fn free_nodes_in_pool(
    catalog: &ResourceCatalog,
    ledger: &AllocationLedger,
    pool_id: &str,
) -> Vec<String> {
    let allocated: HashSet<&str> = ledger.all_nodes().collect();

    catalog
        .pool_members(pool_id)
        .iter()
        .filter(|name| !allocated.contains(name.as_str()))
        .cloned()
        .collect()
}
