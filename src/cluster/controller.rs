//! NodePool Controller - dispatches NodePools to the adaptor
//!
//! The controller is responsible for:
//! - Validating and storing NodePools submitted through the API
//! - Holding a finalizer on live NodePools so deletion releases hardware
//! - Running at most one reconcile per NodePool at a time
//! - Remembering when each NodePool wants to be reconciled again

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::node::Node;
use super::nodepool::{NodePool, NodePoolSpec, NodePoolStatus};
use super::store::{ResourceStore, StoreError};
use super::NODEPOOL_FINALIZER;
use crate::adaptor::{Adaptor, AdaptorError, ReconcileResult};

/// Errors that can occur in the controller
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("NodePool '{0}' not found")]
    NodePoolNotFound(String),

    #[error("NodePool '{0}' already exists")]
    NodePoolExists(String),

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Adaptor(#[from] AdaptorError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind: "NodePool", name } => Self::NodePoolNotFound(name),
            StoreError::NotFound { kind: "Node", name } => Self::NodeNotFound(name),
            StoreError::AlreadyExists {
                kind: "NodePool",
                name,
            } => Self::NodePoolExists(name),
            other => Self::Store(other),
        }
    }
}

/// When a NodePool is reconciled next
#[derive(Debug, Clone, Copy)]
struct Schedule {
    /// `None` waits for a spec change or a deletion
    next: Option<Instant>,
    generation: i64,
    deleting: bool,
}

impl Schedule {
    fn is_due(&self, pool: &NodePool, now: Instant) -> bool {
        pool.metadata.generation != self.generation
            || pool.metadata.is_being_deleted() != self.deleting
            || self.next.map(|t| t <= now).unwrap_or(false)
    }
}

/// Check a NodePool before it is stored
pub fn validate_node_pool(pool: &NodePool) -> Result<(), ControllerError> {
    if pool.metadata.name.is_empty() {
        return Err(ControllerError::ValidationError(
            "NodePool name must not be empty".to_string(),
        ));
    }
    validate_spec(&pool.spec)
}

fn validate_spec(spec: &NodePoolSpec) -> Result<(), ControllerError> {
    if spec.cloud_id.is_empty() {
        return Err(ControllerError::ValidationError(
            "cloudID must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for group in &spec.node_groups {
        if group.name.is_empty() {
            return Err(ControllerError::ValidationError(
                "node group name must not be empty".to_string(),
            ));
        }
        if group.resource_pool_id.is_empty() {
            return Err(ControllerError::ValidationError(format!(
                "node group '{}' has no resourcePoolId",
                group.name
            )));
        }
        if !seen.insert(group.name.as_str()) {
            return Err(ControllerError::ValidationError(format!(
                "duplicate node group '{}'",
                group.name
            )));
        }
    }

    Ok(())
}

/// Removes a NodePool from the in-flight set when the reconcile ends
struct InFlight<'a> {
    set: &'a DashSet<String>,
    name: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.name);
    }
}

/// The NodePool controller
#[derive(Clone)]
pub struct PoolController {
    adaptor: Arc<Adaptor>,

    store: Arc<dyn ResourceStore>,

    /// NodePools with a reconcile running
    in_flight: Arc<DashSet<String>>,

    /// Requeue schedule by NodePool name
    schedules: Arc<DashMap<String, Schedule>>,
}

impl PoolController {
    /// Create a controller around an adaptor and its resource store
    pub fn new(adaptor: Arc<Adaptor>) -> Self {
        let store = adaptor.store().clone();
        Self {
            adaptor,
            store,
            in_flight: Arc::new(DashSet::new()),
            schedules: Arc::new(DashMap::new()),
        }
    }

    pub fn adaptor(&self) -> &Arc<Adaptor> {
        &self.adaptor
    }

    // =========================================================================
    // NodePool Management
    // =========================================================================

    /// Store a new NodePool; any submitted status is discarded
    pub async fn create_node_pool(&self, mut pool: NodePool) -> Result<NodePool, ControllerError> {
        validate_node_pool(&pool)?;
        pool.status = NodePoolStatus::default();
        pool.metadata.finalizers.clear();
        let created = self.store.create_node_pool(pool).await?;
        info!(
            "NodePool {} created for cloud {}",
            created.name(),
            created.cloud_id()
        );
        self.schedule_now(created.name());
        Ok(created)
    }

    pub async fn get_node_pool(&self, name: &str) -> Result<NodePool, ControllerError> {
        Ok(self.store.get_node_pool(name).await?)
    }

    pub async fn list_node_pools(&self) -> Result<Vec<NodePool>, ControllerError> {
        Ok(self.store.list_node_pools().await?)
    }

    /// Replace the spec of a NodePool
    pub async fn update_node_pool_spec(
        &self,
        name: &str,
        spec: NodePoolSpec,
    ) -> Result<NodePool, ControllerError> {
        validate_spec(&spec)?;
        let updated = self.store.update_node_pool_spec(name, spec).await?;
        self.schedule_now(name);
        Ok(updated)
    }

    /// Request deletion of a NodePool
    pub async fn delete_node_pool(&self, name: &str) -> Result<(), ControllerError> {
        self.store.delete_node_pool(name).await?;
        info!("NodePool {} marked for deletion", name);
        self.schedule_now(name);
        Ok(())
    }

    pub async fn get_node(&self, name: &str) -> Result<Node, ControllerError> {
        Ok(self.store.get_node(name).await?)
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, ControllerError> {
        Ok(self.store.list_nodes().await?)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Forget the schedule of a NodePool so the next pass picks it up
    pub fn schedule_now(&self, name: &str) {
        self.schedules.remove(name);
    }

    /// Reconcile one NodePool
    ///
    /// A NodePool already being reconciled is skipped and retried shortly.
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileResult, ControllerError> {
        if !self.in_flight.insert(name.to_string()) {
            debug!("NodePool {} is already being reconciled", name);
            return Ok(ReconcileResult::requeue_with_short_interval());
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            name: name.to_string(),
        };

        let pool = match self.store.get_node_pool(name).await {
            Ok(pool) => pool,
            Err(e) if e.is_not_found() => {
                debug!("NodePool {} is gone", name);
                self.schedules.remove(name);
                return Ok(ReconcileResult::do_not_requeue());
            }
            Err(e) => return Err(e.into()),
        };

        if pool.metadata.is_being_deleted() {
            return self.finalize(pool).await;
        }

        let pool = if pool.metadata.has_finalizer(NODEPOOL_FINALIZER) {
            pool
        } else {
            let mut finalizers = pool.metadata.finalizers.clone();
            finalizers.push(NODEPOOL_FINALIZER.to_string());
            self.store
                .set_node_pool_finalizers(name, finalizers)
                .await?
                .ok_or_else(|| ControllerError::NodePoolNotFound(name.to_string()))?
        };

        Ok(self.adaptor.handle_node_pool(&pool).await?)
    }

    /// Release the hardware of a deleted NodePool and drop its finalizer
    async fn finalize(&self, pool: NodePool) -> Result<ReconcileResult, ControllerError> {
        if !pool.metadata.has_finalizer(NODEPOOL_FINALIZER) {
            return Ok(ReconcileResult::do_not_requeue());
        }

        self.adaptor.handle_node_pool_deletion(&pool).await?;

        let finalizers = pool
            .metadata
            .finalizers
            .iter()
            .filter(|f| f.as_str() != NODEPOOL_FINALIZER)
            .cloned()
            .collect();
        self.store
            .set_node_pool_finalizers(pool.name(), finalizers)
            .await?;

        info!("NodePool {} released and finalized", pool.name());
        self.schedules.remove(pool.name());
        Ok(ReconcileResult::do_not_requeue())
    }

    /// Reconcile every NodePool that is due, concurrently
    ///
    /// Returns the names of the reconciled NodePools.
    pub async fn reconcile_due(&self) -> Result<Vec<String>, ControllerError> {
        let now = Instant::now();
        let due: Vec<NodePool> = self
            .store
            .list_node_pools()
            .await?
            .into_iter()
            .filter(|pool| {
                self.schedules
                    .get(pool.name())
                    .map(|s| s.is_due(pool, now))
                    .unwrap_or(true)
            })
            .collect();

        let results = join_all(due.iter().map(|pool| async move {
            let result = self.reconcile(pool.name()).await;
            (pool, result)
        }))
        .await;

        let mut reconciled = Vec::with_capacity(results.len());
        for (pool, result) in results {
            let requeue_after = match result {
                Ok(_) if pool.metadata.is_being_deleted() => {
                    // finalized; the object is gone
                    self.schedules.remove(pool.name());
                    reconciled.push(pool.name().to_string());
                    continue;
                }
                Ok(result) => result.requeue_after,
                Err(ControllerError::Adaptor(e)) if !e.is_retryable() => {
                    error!("NodePool {} needs attention: {}", pool.name(), e);
                    None
                }
                Err(e) => {
                    warn!("Reconcile of NodePool {} failed: {}", pool.name(), e);
                    ReconcileResult::requeue_with_medium_interval().requeue_after
                }
            };

            self.schedules.insert(
                pool.name().to_string(),
                Schedule {
                    next: requeue_after.map(|d| Instant::now() + d),
                    generation: pool.metadata.generation,
                    deleting: pool.metadata.is_being_deleted(),
                },
            );
            reconciled.push(pool.name().to_string());
        }

        Ok(reconciled)
    }

    /// Get cluster statistics
    pub async fn cluster_stats(&self) -> Result<ClusterStats, ControllerError> {
        let pools = self.store.list_node_pools().await?;
        let nodes = self.store.list_nodes().await?;
        let resource_pools = self.adaptor.get_resource_pools().await?;

        Ok(ClusterStats {
            total_node_pools: pools.len(),
            provisioned_node_pools: pools.iter().filter(|p| p.is_provisioned()).count(),
            total_nodes: nodes.len(),
            provisioned_nodes: nodes.iter().filter(|n| n.is_provisioned()).count(),
            resource_pools: resource_pools.len(),
            free_nodes: resource_pools.iter().map(|p| p.free).sum(),
        })
    }
}

/// Cluster statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_node_pools: usize,
    pub provisioned_node_pools: usize,
    pub total_nodes: usize,
    pub provisioned_nodes: usize,
    pub resource_pools: usize,
    pub free_nodes: usize,
}
