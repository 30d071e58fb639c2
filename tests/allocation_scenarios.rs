//! Integration tests for allocating and releasing nodes
//!
//! These drive the adaptor through its public entry points against the
//! in-memory inventory and resource stores.

use std::sync::Arc;

use async_trait::async_trait;
use hwpool::adaptor::{
    determine_action, Adaptor, AdaptorError, AllocationPolicy, GroupOutcome, NoLatency,
    NodePoolAction, ShortagePolicy,
};
use hwpool::cluster::{
    bmc_secret_name, MemoryResourceStore, NodePool, ResourceStore, RetryPolicy, StoreError,
};
use hwpool::inventory::{
    validate_inventory, AllocationLedger, InventoryError, InventorySnapshot, InventoryStore,
    MemoryInventoryStore, NodeInfo, ResourceCatalog, VersionToken,
};

fn catalog() -> ResourceCatalog {
    let node = |i: u8| {
        NodeInfo::new(format!("10.16.231.{}", i), "YWRtaW4=", "c2VjcmV0")
            .with_interface("eth0", "base-interface", format!("c6:b6:13:a0:02:0{}", i))
    };
    ResourceCatalog::default()
        .with_node("P1", "n1", node(1))
        .with_node("P1", "n2", node(2))
        .with_node("P1", "n3", node(3))
        .with_node("P2", "m1", node(4))
}

/// Hands control back to the scheduler after every load, so two allocation
/// calls joined on one task both read before either writes
struct YieldingInventory {
    inner: Arc<MemoryInventoryStore>,
}

#[async_trait]
impl InventoryStore for YieldingInventory {
    async fn load(&self) -> Result<InventorySnapshot, InventoryError> {
        let snapshot = self.inner.load().await?;
        tokio::task::yield_now().await;
        Ok(snapshot)
    }

    async fn save(
        &self,
        ledger: &AllocationLedger,
        token: &VersionToken,
    ) -> Result<VersionToken, InventoryError> {
        self.inner.save(ledger, token).await
    }
}

struct Harness {
    inventory: Arc<MemoryInventoryStore>,
    store: Arc<MemoryResourceStore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_ledger(AllocationLedger::default())
    }

    fn with_ledger(ledger: AllocationLedger) -> Self {
        Self {
            inventory: Arc::new(MemoryInventoryStore::from_parts(&catalog(), &ledger).unwrap()),
            store: Arc::new(MemoryResourceStore::new("hwpool")),
        }
    }

    fn adaptor(&self) -> Adaptor {
        Adaptor::new(self.inventory.clone(), self.store.clone())
            .with_latency(NoLatency)
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    fn interleaving_adaptor(&self) -> Adaptor {
        let inventory = YieldingInventory {
            inner: self.inventory.clone(),
        };
        Adaptor::new(Arc::new(inventory), self.store.clone())
            .with_latency(NoLatency)
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    async fn ledger(&self) -> AllocationLedger {
        self.inventory.load().await.unwrap().ledger
    }
}

#[tokio::test]
async fn test_group_converges_one_node_per_invocation() {
    let h = Harness::new();
    let adaptor = h.adaptor();
    let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 2, "dummy-sp-64g");

    let first = adaptor.allocate_nodes(&pool).await.unwrap();
    assert_eq!(first.allocated_nodes(), ["n1"]);
    assert_eq!(h.ledger().await.group_nodes("cloud-a", "g1"), ["n1"]);
    assert_eq!(h.store.list_nodes().await.unwrap().len(), 1);

    let second = adaptor.allocate_nodes(&pool).await.unwrap();
    assert_eq!(second.allocated_nodes(), ["n2"]);
    assert_eq!(h.ledger().await.group_nodes("cloud-a", "g1"), ["n1", "n2"]);

    let third = adaptor.allocate_nodes(&pool).await.unwrap();
    assert!(third.is_noop());
    assert_eq!(
        third.outcomes,
        vec![GroupOutcome::Satisfied {
            group: "g1".to_string()
        }]
    );
    assert_eq!(h.ledger().await.group_nodes("cloud-a", "g1"), ["n1", "n2"]);
    assert_eq!(h.store.list_nodes().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_allocated_node_is_published() {
    let h = Harness::new();
    let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "dummy-sp-64g");
    h.adaptor().allocate_nodes(&pool).await.unwrap();

    let node = h.store.get_node("n1").await.unwrap();
    assert!(node.is_provisioned());
    assert_eq!(node.spec.node_pool, "cloud-a");
    assert_eq!(node.spec.group_name, "g1");
    assert_eq!(node.status.hw_profile, "dummy-sp-64g");

    let bmc = node.status.bmc.as_ref().unwrap();
    assert_eq!(bmc.address, "10.16.231.1");
    assert_eq!(bmc.credentials_name, bmc_secret_name("n1"));
    assert_eq!(node.status.interfaces[0].mac_address, "c6:b6:13:a0:02:01");

    let secret = h.store.get_secret(&bmc_secret_name("n1")).await.unwrap();
    assert_eq!(secret.username(), Some(&b"admin"[..]));
    assert_eq!(secret.password(), Some(&b"secret"[..]));
}

#[tokio::test]
async fn test_insufficient_group_is_not_recorded() {
    let mut ledger = AllocationLedger::default();
    ledger.allocate("cloud-b", "g1", "n1");
    ledger.allocate("cloud-b", "g1", "n2");
    let h = Harness::with_ledger(ledger);

    let pool = NodePool::new("np1", "cloud-a").with_group("g2", "P1", 5, "hw");
    let err = h.adaptor().allocate_nodes(&pool).await.unwrap_err();

    assert!(matches!(
        err,
        AdaptorError::InsufficientResources {
            requested: 5,
            available: 1,
            ..
        }
    ));
    let ledger = h.ledger().await;
    assert!(ledger.cloud("cloud-a").is_none());
    assert_eq!(ledger.group_nodes("cloud-b", "g1"), ["n1", "n2"]);
    assert!(h.store.list_nodes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_evaluate_all_reports_every_group() {
    let h = Harness::new();
    let adaptor = h.adaptor().with_policy(AllocationPolicy {
        shortage: ShortagePolicy::EvaluateAll,
        ..AllocationPolicy::default()
    });
    let pool = NodePool::new("np1", "cloud-a")
        .with_group("g1", "P2", 3, "hw")
        .with_group("g2", "P1", 1, "hw");

    let report = adaptor.allocate_nodes(&pool).await.unwrap();

    assert_eq!(report.shortages().count(), 1);
    assert_eq!(report.allocated_nodes(), ["n1"]);
    assert!(h.ledger().await.group_nodes("cloud-a", "g1").is_empty());
}

#[tokio::test]
async fn test_deletion_releases_everything() {
    let h = Harness::new();
    let adaptor = h.adaptor();
    let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 2, "hw");
    adaptor.allocate_nodes(&pool).await.unwrap();
    adaptor.allocate_nodes(&pool).await.unwrap();
    assert_eq!(h.ledger().await.group_nodes("cloud-a", "g1"), ["n1", "n2"]);

    let result = adaptor.handle_node_pool_deletion(&pool).await.unwrap();
    assert!(!result.requeue());

    assert!(h.ledger().await.cloud("cloud-a").is_none());
    assert!(h.store.list_nodes().await.unwrap().is_empty());
    assert_eq!(h.store.secret_count(), 0);
    for node in ["n1", "n2"] {
        let err = h.store.get_secret(&bmc_secret_name(node)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
    assert_eq!(
        adaptor.free_nodes("P1").await.unwrap(),
        Some(vec!["n1".to_string(), "n2".to_string(), "n3".to_string()])
    );
}

#[tokio::test]
async fn test_requests_never_share_nodes() {
    let h = Harness::new();
    let a = h.interleaving_adaptor();
    let b = h.interleaving_adaptor();
    let pool_a = NodePool::new("np-a", "cloud-a").with_group("g1", "P1", 2, "hw");
    let pool_b = NodePool::new("np-b", "cloud-b").with_group("g1", "P1", 1, "hw");

    for _ in 0..10 {
        let (ra, rb) = tokio::join!(a.allocate_nodes(&pool_a), b.allocate_nodes(&pool_b));
        for result in [ra, rb] {
            if let Err(e) = result {
                assert!(e.is_retryable(), "unexpected error: {}", e);
            }
        }
    }

    let ledger = h.ledger().await;
    assert_eq!(ledger.group_nodes("cloud-a", "g1").len(), 2);
    assert_eq!(ledger.group_nodes("cloud-b", "g1").len(), 1);
    assert!(validate_inventory(&catalog(), &ledger).is_empty());

    let mut all: Vec<&str> = ledger.all_nodes().collect();
    all.sort_unstable();
    assert_eq!(all, ["n1", "n2", "n3"]);
}

#[tokio::test]
async fn test_concurrent_writers_conflict_instead_of_sharing() {
    let h = Harness::new();
    let a = h.interleaving_adaptor();
    let b = h.interleaving_adaptor();
    let pool_a = NodePool::new("np-a", "cloud-a").with_group("g1", "P1", 2, "hw");
    let pool_b = NodePool::new("np-b", "cloud-b").with_group("g1", "P1", 1, "hw");

    // Both read the same ledger version and pick the same first free node
    let (ra, rb) = tokio::join!(a.allocate_nodes(&pool_a), b.allocate_nodes(&pool_b));
    let errors: Vec<AdaptorError> = [ra, rb].into_iter().filter_map(Result::err).collect();

    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_retryable());
    assert!(matches!(
        errors[0],
        AdaptorError::Persistence {
            ref node,
            source: InventoryError::Conflict { .. },
            ..
        } if node == "n1"
    ));

    let ledger = h.ledger().await;
    assert_eq!(ledger.all_nodes().collect::<Vec<_>>(), ["n1"]);
    assert!(validate_inventory(&catalog(), &ledger).is_empty());

    // Invoking again converges without sharing
    for _ in 0..3 {
        a.allocate_nodes(&pool_a).await.unwrap();
        b.allocate_nodes(&pool_b).await.unwrap();
    }

    let ledger = h.ledger().await;
    assert_eq!(ledger.group_nodes("cloud-a", "g1").len(), 2);
    assert_eq!(ledger.group_nodes("cloud-b", "g1").len(), 1);
    assert!(validate_inventory(&catalog(), &ledger).is_empty());
    assert_eq!(h.store.list_nodes().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_handle_node_pool_walks_lifecycle() {
    let h = Harness::new();
    let adaptor = h.adaptor();
    let mut pool = h
        .store
        .create_node_pool(NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw"))
        .await
        .unwrap();

    let mut actions = Vec::new();
    for _ in 0..5 {
        let action = determine_action(&pool);
        actions.push(action);
        if action == NodePoolAction::Noop {
            break;
        }
        adaptor.handle_node_pool(&pool).await.unwrap();
        pool = h.store.get_node_pool("np1").await.unwrap();
    }

    assert_eq!(
        actions,
        vec![
            NodePoolAction::Create,
            NodePoolAction::Processing,
            NodePoolAction::Processing,
            NodePoolAction::Noop,
        ]
    );
    assert!(pool.is_provisioned());
    assert_eq!(pool.status.observed_generation, pool.metadata.generation);
    assert_eq!(pool.status.properties.node_names, ["n1"]);

    // Reclassifying the same status gives the same answer
    assert_eq!(determine_action(&pool), determine_action(&pool.clone()));
}
