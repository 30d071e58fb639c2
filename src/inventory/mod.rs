//! # Inventory
//!
//! The hardware inventory is one keyed record with two YAML sub-documents:
//!
//! - `resources`: the [`ResourceCatalog`] of physical nodes, grouped by
//!   resource pool. Provisioned by an operator, never written by the adaptor.
//! - `allocations`: the [`AllocationLedger`] of which nodes are assigned to
//!   which cloud and node group. Rewritten as a whole after every change.
//!
//! Pure functions over a snapshot (free-node selection, validation) live
//! next to the store that produces the snapshot.

pub mod catalog;
pub mod ledger;
pub mod selector;
pub mod store;
pub mod validate;

pub use catalog::{BmcInfo, Interface, NodeInfo, ResourceCatalog};
pub use ledger::{AllocationLedger, CloudAllocation};
pub use selector::free_nodes_in_pool;
pub use store::{
    FileInventoryStore, InventoryRecord, InventorySnapshot, InventoryStore,
    MemoryInventoryStore, VersionToken,
};
pub use validate::{validate_inventory, InventoryIssue};

use thiserror::Error;

/// Name of the keyed inventory record
pub const INVENTORY_RECORD: &str = "hwpool-nodelist";

/// Key of the catalog sub-document
pub const RESOURCES_KEY: &str = "resources";

/// Key of the ledger sub-document
pub const ALLOCATIONS_KEY: &str = "allocations";

/// Errors reading or writing the inventory record
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Inventory record not found: {0}")]
    RecordNotFound(String),

    #[error("Inventory record has no '{0}' key")]
    MissingKey(&'static str),

    #[error("Failed to parse '{key}': {source}")]
    Parse {
        key: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize inventory: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Inventory I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Allocations changed concurrently (expected {expected}, found {found})")]
    Conflict { expected: String, found: String },
}

impl InventoryError {
    /// Whether retrying the read-modify-write cycle can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Io(_))
    }
}
