//! Shared fixtures for adaptor tests

use std::sync::Arc;

use super::{Adaptor, AllocationPolicy, NoLatency, ShortagePolicy};
use crate::cluster::{MemoryResourceStore, RetryPolicy, DEFAULT_NAMESPACE};
use crate::inventory::{
    AllocationLedger, InventoryStore, MemoryInventoryStore, NodeInfo, ResourceCatalog,
};

const RETRY_STEPS: u32 = 3;

/// `P1 = [n1, n2, n3]`, `P2 = [m1]`; every node has `admin`/`secret`
pub(crate) fn catalog() -> ResourceCatalog {
    let node = |i: u8| {
        NodeInfo::new(format!("10.16.231.{}", i), "YWRtaW4=", "c2VjcmV0").with_interface(
            "eno1",
            "bootable-interface",
            format!("c6:b6:13:a0:02:{:02x}", i),
        )
    };

    ResourceCatalog::default()
        .with_node("P1", "n1", node(1))
        .with_node("P1", "n2", node(2))
        .with_node("P1", "n3", node(3))
        .with_node("P2", "m1", node(4))
}

pub(crate) struct Fixture {
    pub adaptor: Adaptor,
    pub store: Arc<MemoryResourceStore>,
    pub inventory: Arc<MemoryInventoryStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(catalog(), AllocationPolicy::default())
    }

    pub fn with_catalog(catalog: ResourceCatalog) -> Self {
        Self::build(catalog, AllocationPolicy::default())
    }

    pub fn with_shortage_policy(shortage: ShortagePolicy) -> Self {
        Self::build(
            catalog(),
            AllocationPolicy {
                shortage,
                ..AllocationPolicy::default()
            },
        )
    }

    fn build(catalog: ResourceCatalog, policy: AllocationPolicy) -> Self {
        let store = Arc::new(MemoryResourceStore::new(DEFAULT_NAMESPACE));
        let inventory = Arc::new(
            MemoryInventoryStore::from_parts(&catalog, &AllocationLedger::default()).unwrap(),
        );

        let adaptor = Adaptor::new(inventory.clone(), store.clone())
            .with_latency(NoLatency)
            .with_policy(policy)
            .with_retry_policy(RetryPolicy::immediate(RETRY_STEPS));

        Self {
            adaptor,
            store,
            inventory,
        }
    }

    /// Attempts a retried store call makes before giving up
    pub fn retry_steps(&self) -> u32 {
        RETRY_STEPS
    }

    pub async fn ledger(&self) -> AllocationLedger {
        self.inventory.load().await.unwrap().ledger
    }
}
