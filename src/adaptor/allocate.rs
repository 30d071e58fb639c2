//! Allocation engine
//!
//! One call walks the request's node groups in declaration order. For each
//! group it compares the ledger with the desired size, picks free nodes from
//! the group's resource pool and, per node:
//!
//! 1. Creates the BMC credentials secret
//! 2. Records the node in the ledger and persists it
//! 3. Creates the Node resource
//! 4. Projects the catalog entry onto the Node status
//!
//! Every step is safe to repeat. Nodes already in the ledger whose Node
//! resource is missing or not yet provisioned are repaired before new nodes
//! are taken, so a call interrupted after the ledger write converges on the
//! next one.

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{debug, info, warn};

use super::latency;
use super::{Adaptor, AdaptorError, ShortagePolicy};
use crate::cluster::retry::{retry_on, retry_on_conflict_or_retriable};
use crate::cluster::{BmcSecret, Node, NodeGroup, NodePool, StoreError};
use crate::inventory::{free_nodes_in_pool, BmcInfo, InventorySnapshot, ResourceCatalog};

/// Result of one node group within an allocation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    /// New nodes were allocated
    Allocated { group: String, nodes: Vec<String> },
    /// The group already has its desired size
    Satisfied { group: String },
    /// Not enough free nodes; only recorded when all groups are evaluated
    Insufficient {
        group: String,
        pool: String,
        requested: usize,
        available: usize,
    },
}

/// What an allocation call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    pub outcomes: Vec<GroupOutcome>,

    /// Already-allocated nodes whose Node resource was recreated or reprojected
    pub repaired: Vec<String>,
}

impl AllocationReport {
    /// Nodes newly allocated by this call
    pub fn allocated_nodes(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                GroupOutcome::Allocated { nodes, .. } => Some(nodes),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Groups that could not be satisfied
    pub fn shortages(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, GroupOutcome::Insufficient { .. }))
    }

    /// Nothing was allocated or repaired
    pub fn is_noop(&self) -> bool {
        self.repaired.is_empty() && self.allocated_nodes().is_empty()
    }
}

impl Adaptor {
    /// Allocate at most the configured number of new nodes per node group
    pub async fn allocate_nodes(&self, pool: &NodePool) -> Result<AllocationReport, AdaptorError> {
        let cloud_id = pool.cloud_id();

        latency::simulate(self.latency.as_ref()).await;

        let InventorySnapshot {
            catalog,
            mut ledger,
            mut token,
        } = self.inventory.load().await.map_err(AdaptorError::Inventory)?;

        let mut report = AllocationReport::default();
        let per_call = self.policy.max_new_allocations_per_invocation.max(1);

        for group in &pool.spec.node_groups {
            let used: Vec<String> = ledger.group_nodes(cloud_id, &group.name).to_vec();
            for nodename in &used {
                if self
                    .repair_allocated_node(cloud_id, group, nodename, &catalog)
                    .await?
                {
                    report.repaired.push(nodename.clone());
                }
            }

            let remaining = group.size.saturating_sub(used.len());
            debug!(
                "Cloud {} group {}: {} used, {} remaining",
                cloud_id,
                group.name,
                used.len(),
                remaining
            );
            if remaining == 0 {
                report.outcomes.push(GroupOutcome::Satisfied {
                    group: group.name.clone(),
                });
                continue;
            }

            let free = free_nodes_in_pool(&catalog, &ledger, &group.resource_pool_id);
            if remaining > free.len() {
                match self.policy.shortage {
                    ShortagePolicy::AbortOnFirst => {
                        return Err(AdaptorError::InsufficientResources {
                            pool: group.resource_pool_id.clone(),
                            group: group.name.clone(),
                            requested: remaining,
                            available: free.len(),
                        });
                    }
                    ShortagePolicy::EvaluateAll => {
                        warn!(
                            "Not enough free nodes in resource pool {} for group {}: need {}, {} free",
                            group.resource_pool_id,
                            group.name,
                            remaining,
                            free.len()
                        );
                        report.outcomes.push(GroupOutcome::Insufficient {
                            group: group.name.clone(),
                            pool: group.resource_pool_id.clone(),
                            requested: remaining,
                            available: free.len(),
                        });
                        continue;
                    }
                }
            }

            let mut allocated = Vec::new();
            for nodename in free.into_iter().take(remaining.min(per_call)) {
                let info = catalog
                    .node(&nodename)
                    .ok_or_else(|| AdaptorError::MissingNodeInfo(nodename.clone()))?;

                self.create_bmc_secret(&nodename, &info.bmc).await?;

                ledger.allocate(cloud_id, &group.name, &nodename);
                token = self.inventory.save(&ledger, &token).await.map_err(|source| {
                    AdaptorError::Persistence {
                        cloud: cloud_id.to_string(),
                        group: group.name.clone(),
                        node: nodename.clone(),
                        source,
                    }
                })?;

                self.create_node(cloud_id, &nodename, &group.name, &group.hw_profile)
                    .await?;
                self.update_node_status(&nodename, info, &group.hw_profile)
                    .await?;

                info!(
                    "Allocated node {} from resource pool {} to {}/{}",
                    nodename, group.resource_pool_id, cloud_id, group.name
                );
                allocated.push(nodename);
            }

            report.outcomes.push(GroupOutcome::Allocated {
                group: group.name.clone(),
                nodes: allocated,
            });
        }

        Ok(report)
    }

    /// Bring an already-allocated node back to a provisioned Node resource
    ///
    /// Returns whether anything had to be done.
    async fn repair_allocated_node(
        &self,
        cloud_id: &str,
        group: &NodeGroup,
        nodename: &str,
        catalog: &ResourceCatalog,
    ) -> Result<bool, AdaptorError> {
        let existing = retry_on(&self.retry, |e| e.is_retriable(), || {
            self.store.get_node(nodename)
        })
        .await;

        match existing {
            Ok(node) if node.is_provisioned() => return Ok(false),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(AdaptorError::store("get Node", nodename, e)),
        }

        warn!(
            "Node {} is allocated to {}/{} but not provisioned, repairing",
            nodename, cloud_id, group.name
        );

        let info = catalog
            .node(nodename)
            .ok_or_else(|| AdaptorError::MissingNodeInfo(nodename.to_string()))?;

        self.create_bmc_secret(nodename, &info.bmc).await?;
        self.create_node(cloud_id, nodename, &group.name, &group.hw_profile)
            .await?;
        self.update_node_status(nodename, info, &group.hw_profile)
            .await?;
        Ok(true)
    }

    /// Create or update the BMC credentials secret of a node
    pub async fn create_bmc_secret(
        &self,
        nodename: &str,
        bmc: &BmcInfo,
    ) -> Result<BmcSecret, AdaptorError> {
        let username = decode_credential(nodename, "username", &bmc.username_base64)?;
        let password = decode_credential(nodename, "password", &bmc.password_base64)?;
        let secret = BmcSecret::new(nodename, self.namespace(), username, password);

        retry_on_conflict_or_retriable(&self.retry, || self.store.apply_secret(secret.clone()))
            .await
            .map_err(|e| AdaptorError::store("create BMC secret", secret.name(), e))
    }

    /// Create the Node resource, reusing an existing one
    pub async fn create_node(
        &self,
        cloud_id: &str,
        nodename: &str,
        group: &str,
        hw_profile: &str,
    ) -> Result<Node, AdaptorError> {
        let node = Node::new(nodename, cloud_id, group, hw_profile).with_namespace(self.namespace());

        let created = retry_on_conflict_or_retriable(&self.retry, || {
            self.store.create_node(node.clone())
        })
        .await;

        match created {
            Ok(node) => {
                debug!("Created Node {}", nodename);
                Ok(node)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                debug!("Node {} already exists", nodename);
                self.get_node(nodename).await
            }
            Err(e) => Err(AdaptorError::store("create Node", nodename, e)),
        }
    }
}

fn decode_credential(
    nodename: &str,
    field: &'static str,
    encoded: &str,
) -> Result<Vec<u8>, AdaptorError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|source| AdaptorError::Decode {
            node: nodename.to_string(),
            field,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptor::testing::Fixture;
    use crate::cluster::{bmc_secret_name, ResourceStore, StoreOp};
    use crate::inventory::{InventoryStore, NodeInfo};

    #[tokio::test]
    async fn test_allocates_one_node_per_group_per_call() {
        let fx = Fixture::new();
        let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 2, "hw");

        let report = fx.adaptor.allocate_nodes(&pool).await.unwrap();
        assert_eq!(report.allocated_nodes(), vec!["n1"]);
        assert_eq!(fx.ledger().await.group_nodes("cloud-a", "g1"), ["n1"]);

        let report = fx.adaptor.allocate_nodes(&pool).await.unwrap();
        assert_eq!(report.allocated_nodes(), vec!["n2"]);

        let report = fx.adaptor.allocate_nodes(&pool).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(
            report.outcomes,
            vec![GroupOutcome::Satisfied {
                group: "g1".to_string()
            }]
        );
        assert_eq!(fx.ledger().await.group_nodes("cloud-a", "g1"), ["n1", "n2"]);
    }

    #[tokio::test]
    async fn test_allocation_creates_secret_and_node() {
        let fx = Fixture::new();
        let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "profile-x");

        fx.adaptor.allocate_nodes(&pool).await.unwrap();

        let secret = fx.store.get_secret(&bmc_secret_name("n1")).await.unwrap();
        assert_eq!(secret.username(), Some(&b"admin"[..]));
        assert_eq!(secret.password(), Some(&b"secret"[..]));

        let node = fx.store.get_node("n1").await.unwrap();
        assert_eq!(node.spec.node_pool, "cloud-a");
        assert_eq!(node.spec.group_name, "g1");
        assert!(node.is_provisioned());
        assert_eq!(node.status.hw_profile, "profile-x");
    }

    #[tokio::test]
    async fn test_insufficient_resources_aborts() {
        let fx = Fixture::new();
        let pool = NodePool::new("np1", "cloud-a")
            .with_group("g1", "P1", 1, "hw")
            .with_group("g2", "P1", 5, "hw")
            .with_group("g3", "P2", 1, "hw");

        let err = fx.adaptor.allocate_nodes(&pool).await.unwrap_err();
        match err {
            AdaptorError::InsufficientResources {
                pool,
                group,
                requested,
                available,
            } => {
                assert_eq!(pool, "P1");
                assert_eq!(group, "g2");
                assert_eq!(requested, 5);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        let ledger = fx.ledger().await;
        assert_eq!(ledger.group_nodes("cloud-a", "g1"), ["n1"]);
        assert!(ledger.group_nodes("cloud-a", "g2").is_empty());
        assert!(ledger.group_nodes("cloud-a", "g3").is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_all_continues_past_shortage() {
        let fx = Fixture::with_shortage_policy(ShortagePolicy::EvaluateAll);
        let pool = NodePool::new("np1", "cloud-a")
            .with_group("g2", "P1", 5, "hw")
            .with_group("g3", "P2", 1, "hw");

        let report = fx.adaptor.allocate_nodes(&pool).await.unwrap();
        assert_eq!(report.shortages().count(), 1);
        assert_eq!(report.allocated_nodes(), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_missing_node_info_fails_before_mutation() {
        let mut catalog = ResourceCatalog::default();
        catalog
            .resourcepools
            .insert("P1".to_string(), vec!["ghost".to_string()]);
        let fx = Fixture::with_catalog(catalog);
        let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw");

        let err = fx.adaptor.allocate_nodes(&pool).await.unwrap_err();
        assert!(matches!(err, AdaptorError::MissingNodeInfo(ref n) if n == "ghost"));
        assert!(fx.ledger().await.clouds.is_empty());
        assert_eq!(fx.store.secret_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_base64_is_decode_error() {
        let fx = Fixture::with_catalog(ResourceCatalog::default().with_node(
            "P1",
            "n1",
            NodeInfo::new("10.0.0.1", "not base64!", "Yg=="),
        ));
        let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw");

        let err = fx.adaptor.allocate_nodes(&pool).await.unwrap_err();
        assert!(matches!(err, AdaptorError::Decode { field: "username", .. }));
        assert!(!err.is_retryable());
        assert!(fx.ledger().await.clouds.is_empty());
    }

    #[tokio::test]
    async fn test_create_node_is_idempotent() {
        let fx = Fixture::new();
        fx.adaptor.create_node("cloud-a", "n1", "g1", "hw").await.unwrap();
        let again = fx.adaptor.create_node("cloud-a", "n1", "g1", "hw").await.unwrap();
        assert_eq!(again.name(), "n1");
        assert_eq!(fx.store.list_nodes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_node_creation_failure_is_repaired_next_call() {
        let fx = Fixture::new();
        let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw");

        for _ in 0..fx.retry_steps() {
            fx.store.inject_failure(
                StoreOp::CreateNode,
                StoreError::Transient("apiserver down".into()),
            );
        }
        let err = fx.adaptor.allocate_nodes(&pool).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(fx.ledger().await.group_nodes("cloud-a", "g1"), ["n1"]);
        assert!(fx.store.get_node("n1").await.is_err());

        let report = fx.adaptor.allocate_nodes(&pool).await.unwrap();
        assert_eq!(report.repaired, vec!["n1".to_string()]);
        assert!(report.allocated_nodes().is_empty());
        assert!(fx.store.get_node("n1").await.unwrap().is_provisioned());
        assert_eq!(fx.ledger().await.group_nodes("cloud-a", "g1"), ["n1"]);
    }

    #[tokio::test]
    async fn test_stale_ledger_write_is_retryable_conflict() {
        let fx = Fixture::new();
        let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw");

        // Another writer commits between our load and save.
        let snapshot = fx.inventory.load().await.unwrap();
        let mut other = snapshot.ledger.clone();
        other.allocate("cloud-b", "g1", "n2");
        fx.inventory.save(&other, &snapshot.token).await.unwrap();

        let stale = fx.inventory.save(&snapshot.ledger, &snapshot.token).await;
        assert!(stale.unwrap_err().is_retryable());

        fx.adaptor.allocate_nodes(&pool).await.unwrap();
        let ledger = fx.ledger().await;
        assert_eq!(ledger.group_nodes("cloud-a", "g1"), ["n1"]);
        assert_eq!(ledger.group_nodes("cloud-b", "g1"), ["n2"]);
    }
}
