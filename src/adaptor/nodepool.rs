//! NodePool handlers
//!
//! One handler per lifecycle action. Each records progress on the NodePool's
//! `Provisioned` condition and tells the caller when to come back.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use super::{Adaptor, AdaptorError, GroupOutcome, ReconcileResult};
use crate::cluster::resources::{
    set_status_condition, ConditionReason, ConditionStatus, ConditionType,
};
use crate::cluster::retry::retry_on_conflict_or_retriable;
use crate::cluster::NodePool;
use crate::inventory::{free_nodes_in_pool, AllocationLedger, ResourceCatalog};

/// Allocation progress of a NodePool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationProgress {
    /// Every group has its desired size and every node is provisioned
    pub complete: bool,

    /// Allocated nodes, grouped in declaration order
    pub node_names: Vec<String>,
}

fn condition_reason(err: &AdaptorError) -> ConditionReason {
    if err.is_insufficient_resources() {
        ConditionReason::InsufficientResources
    } else {
        ConditionReason::Failed
    }
}

/// Nodes of the pool's groups in declaration order
fn allocated_node_names(pool: &NodePool, ledger: &AllocationLedger) -> Vec<String> {
    pool.spec
        .node_groups
        .iter()
        .flat_map(|g| ledger.group_nodes(pool.cloud_id(), &g.name).iter().cloned())
        .collect()
}

/// Check that the catalog can satisfy every group of the pool
///
/// Groups drawing from the same resource pool are checked together.
pub fn check_capacity(
    pool: &NodePool,
    catalog: &ResourceCatalog,
    ledger: &AllocationLedger,
) -> Result<(), AdaptorError> {
    let mut needed: BTreeMap<&str, usize> = BTreeMap::new();

    for group in &pool.spec.node_groups {
        let used = ledger.group_nodes(pool.cloud_id(), &group.name).len();
        let remaining = group.size.saturating_sub(used);
        let total = needed.entry(group.resource_pool_id.as_str()).or_default();
        *total += remaining;

        let available = free_nodes_in_pool(catalog, ledger, &group.resource_pool_id).len();
        if *total > available {
            return Err(AdaptorError::InsufficientResources {
                pool: group.resource_pool_id.clone(),
                group: group.name.clone(),
                requested: *total,
                available,
            });
        }
    }

    Ok(())
}

impl Adaptor {
    /// Handle a NodePool seen for the first time
    pub async fn handle_node_pool_create(
        &self,
        pool: &NodePool,
    ) -> Result<ReconcileResult, AdaptorError> {
        let checked = self.check_node_pool_resources(pool).await;

        let (reason, message) = match &checked {
            Ok(()) => (ConditionReason::InProgress, "Handling creation".to_string()),
            Err(e) => {
                error!("Failed to create NodePool {}: {}", pool.name(), e);
                (condition_reason(e), format!("Creation request failed: {}", e))
            }
        };

        self.update_node_pool_status(pool.name(), |p| {
            set_status_condition(
                &mut p.status.conditions,
                ConditionType::Provisioned,
                reason,
                ConditionStatus::False,
                message.as_str(),
            );
        })
        .await?;

        checked.map(|()| ReconcileResult::requeue_with_short_interval())
    }

    /// Handle a NodePool whose provisioning is underway
    pub async fn handle_node_pool_processing(
        &self,
        pool: &NodePool,
    ) -> Result<ReconcileResult, AdaptorError> {
        let progress = self.allocation_progress(pool).await?;

        if progress.complete {
            let generation = pool.metadata.generation;
            self.update_node_pool_status(pool.name(), |p| {
                set_status_condition(
                    &mut p.status.conditions,
                    ConditionType::Provisioned,
                    ConditionReason::Completed,
                    ConditionStatus::True,
                    "Created",
                );
                p.status.observed_generation = generation;
                p.status.properties.node_names = progress.node_names.clone();
            })
            .await?;

            info!(
                "NodePool {} is provisioned with {} node(s)",
                pool.name(),
                progress.node_names.len()
            );
            return Ok(ReconcileResult::do_not_requeue());
        }

        match self.allocate_nodes(pool).await {
            Ok(report) => {
                let node_names = self.node_pool_node_names(pool).await?;
                let shortage = report
                    .shortages()
                    .filter_map(|o| match o {
                        GroupOutcome::Insufficient {
                            group,
                            pool: resource_pool,
                            requested,
                            available,
                        } => Some(format!(
                            "group {} needs {} from {} ({} free)",
                            group, requested, resource_pool, available
                        )),
                        _ => None,
                    })
                    .collect::<Vec<_>>();

                self.update_node_pool_status(pool.name(), |p| {
                    p.status.properties.node_names = node_names.clone();
                    if !shortage.is_empty() {
                        set_status_condition(
                            &mut p.status.conditions,
                            ConditionType::Provisioned,
                            ConditionReason::InsufficientResources,
                            ConditionStatus::False,
                            format!("Insufficient resources: {}", shortage.join(", ")),
                        );
                    }
                })
                .await?;

                if !shortage.is_empty() && report.is_noop() {
                    warn!(
                        "NodePool {} is waiting for free resources",
                        pool.name()
                    );
                    return Ok(ReconcileResult::requeue_with_medium_interval());
                }
                Ok(ReconcileResult::requeue_with_short_interval())
            }
            Err(e) => {
                error!("Failed to allocate nodes for NodePool {}: {}", pool.name(), e);
                let reason = condition_reason(&e);
                let message = e.to_string();
                self.update_node_pool_status(pool.name(), |p| {
                    set_status_condition(
                        &mut p.status.conditions,
                        ConditionType::Provisioned,
                        reason,
                        ConditionStatus::False,
                        message.as_str(),
                    );
                })
                .await?;
                Err(e)
            }
        }
    }

    /// Handle a provisioned NodePool whose spec changed
    ///
    /// Groups grow toward their new sizes on the following invocations.
    /// Shrinking is not performed.
    pub async fn handle_node_pool_spec_changed(
        &self,
        pool: &NodePool,
    ) -> Result<ReconcileResult, AdaptorError> {
        info!(
            "NodePool {} changed (generation {}, observed {})",
            pool.name(),
            pool.metadata.generation,
            pool.status.observed_generation
        );

        self.update_node_pool_status(pool.name(), |p| {
            set_status_condition(
                &mut p.status.conditions,
                ConditionType::Provisioned,
                ConditionReason::InProgress,
                ConditionStatus::False,
                "Handling spec change",
            );
        })
        .await?;

        Ok(ReconcileResult::requeue_with_short_interval())
    }

    /// Check the catalog can satisfy the whole pool
    pub async fn check_node_pool_resources(&self, pool: &NodePool) -> Result<(), AdaptorError> {
        let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
        check_capacity(pool, &snapshot.catalog, &snapshot.ledger)
    }

    /// Allocated node names of a pool, from the ledger
    pub async fn node_pool_node_names(&self, pool: &NodePool) -> Result<Vec<String>, AdaptorError> {
        let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
        Ok(allocated_node_names(pool, &snapshot.ledger))
    }

    /// Compare the ledger and the Node resources with the pool's groups
    pub async fn allocation_progress(
        &self,
        pool: &NodePool,
    ) -> Result<AllocationProgress, AdaptorError> {
        let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
        let ledger = &snapshot.ledger;

        let sized = pool
            .spec
            .node_groups
            .iter()
            .all(|g| ledger.group_nodes(pool.cloud_id(), &g.name).len() >= g.size);

        let node_names = allocated_node_names(pool, ledger);
        let mut complete = sized;
        if sized {
            for nodename in &node_names {
                match self.store.get_node(nodename).await {
                    Ok(node) if node.is_provisioned() => {}
                    Ok(_) => complete = false,
                    Err(e) if e.is_not_found() => complete = false,
                    Err(e) => return Err(AdaptorError::store("get Node", nodename, e)),
                }
                if !complete {
                    break;
                }
            }
        }

        Ok(AllocationProgress {
            complete,
            node_names,
        })
    }

    /// Refetch the NodePool, apply `mutate` to it and write its status
    ///
    /// Reapplied on conflict.
    pub async fn update_node_pool_status<F>(
        &self,
        name: &str,
        mutate: F,
    ) -> Result<NodePool, AdaptorError>
    where
        F: Fn(&mut NodePool),
    {
        let mutate = &mutate;
        retry_on_conflict_or_retriable(&self.retry, || async move {
            let mut pool = self.store.get_node_pool(name).await?;
            mutate(&mut pool);
            self.store.update_node_pool_status(&pool).await
        })
        .await
        .map_err(|e| AdaptorError::store("update status of NodePool", name, e))
    }
}
