//! Resource store - CRUD access to NodePools, Nodes and BMC secrets
//!
//! Objects are keyed by name within a single namespace. Every write bumps
//! `metadata.resourceVersion`; status updates carrying a stale version are
//! refused with [`StoreError::Conflict`] so callers can refetch and reapply.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::node::Node;
use super::nodepool::{NodePool, NodePoolSpec};
use super::secret::BmcSecret;

/// Errors returned by a resource store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} '{name}' was modified concurrently")]
    Conflict { kind: &'static str, name: String },

    #[error("Transient store error: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Ignore a not-found error, as deletes do
pub fn ignore_not_found(result: Result<(), StoreError>) -> Result<(), StoreError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// CRUD operations on the objects the adaptor reads and writes
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Namespace all objects live in
    fn namespace(&self) -> &str;

    // NodePools
    async fn create_node_pool(&self, pool: NodePool) -> Result<NodePool, StoreError>;
    async fn get_node_pool(&self, name: &str) -> Result<NodePool, StoreError>;
    async fn list_node_pools(&self) -> Result<Vec<NodePool>, StoreError>;
    /// Replace the spec, bumping the generation when it changed
    async fn update_node_pool_spec(
        &self,
        name: &str,
        spec: NodePoolSpec,
    ) -> Result<NodePool, StoreError>;
    /// Replace the status; refused when the resource version is stale
    async fn update_node_pool_status(&self, pool: &NodePool) -> Result<NodePool, StoreError>;
    /// Replace the finalizers; the object is dropped once it is being
    /// deleted and no finalizer is left
    async fn set_node_pool_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<Option<NodePool>, StoreError>;
    /// Request deletion; objects with finalizers are only marked
    async fn delete_node_pool(&self, name: &str) -> Result<(), StoreError>;

    // Nodes
    async fn create_node(&self, node: Node) -> Result<Node, StoreError>;
    async fn get_node(&self, name: &str) -> Result<Node, StoreError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;
    /// Replace the status; refused when the resource version is stale
    async fn update_node_status(&self, node: &Node) -> Result<Node, StoreError>;
    async fn delete_node(&self, name: &str) -> Result<(), StoreError>;

    // BMC secrets
    /// Create the secret or replace the data of an existing one
    async fn apply_secret(&self, secret: BmcSecret) -> Result<BmcSecret, StoreError>;
    async fn get_secret(&self, name: &str) -> Result<BmcSecret, StoreError>;
    async fn delete_secret(&self, name: &str) -> Result<(), StoreError>;
}

/// Store operations that can have failures injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateNode,
    GetNode,
    UpdateNodeStatus,
    DeleteNode,
    ApplySecret,
    DeleteSecret,
    UpdateNodePoolStatus,
}

const NODE_POOL: &str = "NodePool";
const NODE: &str = "Node";
const SECRET: &str = "Secret";

/// In-memory resource store
pub struct MemoryResourceStore {
    namespace: String,
    node_pools: DashMap<String, NodePool>,
    nodes: DashMap<String, Node>,
    secrets: DashMap<String, BmcSecret>,
    failures: DashMap<StoreOp, VecDeque<StoreError>>,
}

impl MemoryResourceStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            node_pools: DashMap::new(),
            nodes: DashMap::new(),
            secrets: DashMap::new(),
            failures: DashMap::new(),
        }
    }

    /// Make the next call of `op` fail with `error`
    ///
    /// Queued failures are consumed in order, one per call.
    pub fn inject_failure(&self, op: StoreOp, error: StoreError) {
        self.failures.entry(op).or_default().push_back(error);
    }

    fn take_failure(&self, op: StoreOp) -> Result<(), StoreError> {
        match self.failures.get_mut(&op).and_then(|mut q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of stored secrets
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    fn not_found(kind: &'static str, name: &str) -> StoreError {
        StoreError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create_node_pool(&self, mut pool: NodePool) -> Result<NodePool, StoreError> {
        let slot = match self.node_pools.entry(pool.name().to_string()) {
            Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    kind: NODE_POOL,
                    name: pool.name().to_string(),
                })
            }
            Entry::Vacant(slot) => slot,
        };

        pool.metadata.namespace = self.namespace.clone();
        pool.metadata.resource_version = 1;
        pool.metadata.generation = pool.metadata.generation.max(1);
        pool.metadata.deletion_timestamp = None;
        pool.metadata.creation_timestamp.get_or_insert_with(Utc::now);

        slot.insert(pool.clone());
        Ok(pool)
    }

    async fn get_node_pool(&self, name: &str) -> Result<NodePool, StoreError> {
        self.node_pools
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| Self::not_found(NODE_POOL, name))
    }

    async fn list_node_pools(&self) -> Result<Vec<NodePool>, StoreError> {
        let mut pools: Vec<NodePool> = self.node_pools.iter().map(|r| r.clone()).collect();
        pools.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(pools)
    }

    async fn update_node_pool_spec(
        &self,
        name: &str,
        spec: NodePoolSpec,
    ) -> Result<NodePool, StoreError> {
        let mut pool = self
            .node_pools
            .get_mut(name)
            .ok_or_else(|| Self::not_found(NODE_POOL, name))?;

        if pool.spec != spec {
            pool.spec = spec;
            pool.metadata.generation += 1;
        }
        pool.metadata.resource_version += 1;

        Ok(pool.clone())
    }

    async fn update_node_pool_status(&self, update: &NodePool) -> Result<NodePool, StoreError> {
        self.take_failure(StoreOp::UpdateNodePoolStatus)?;

        let mut pool = self
            .node_pools
            .get_mut(update.name())
            .ok_or_else(|| Self::not_found(NODE_POOL, update.name()))?;

        if pool.metadata.resource_version != update.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: NODE_POOL,
                name: update.name().to_string(),
            });
        }

        pool.status = update.status.clone();
        pool.metadata.resource_version += 1;

        Ok(pool.clone())
    }

    async fn set_node_pool_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<Option<NodePool>, StoreError> {
        let remove = {
            let mut pool = self
                .node_pools
                .get_mut(name)
                .ok_or_else(|| Self::not_found(NODE_POOL, name))?;

            pool.metadata.finalizers = finalizers;
            pool.metadata.resource_version += 1;
            pool.metadata.is_being_deleted() && pool.metadata.finalizers.is_empty()
        };

        if remove {
            self.node_pools.remove(name);
            return Ok(None);
        }

        Ok(self.node_pools.get(name).map(|r| r.clone()))
    }

    async fn delete_node_pool(&self, name: &str) -> Result<(), StoreError> {
        let remove = {
            let mut pool = self
                .node_pools
                .get_mut(name)
                .ok_or_else(|| Self::not_found(NODE_POOL, name))?;

            if pool.metadata.finalizers.is_empty() {
                true
            } else {
                pool.metadata
                    .deletion_timestamp
                    .get_or_insert_with(Utc::now);
                pool.metadata.resource_version += 1;
                false
            }
        };

        if remove {
            self.node_pools.remove(name);
        }
        Ok(())
    }

    async fn create_node(&self, mut node: Node) -> Result<Node, StoreError> {
        self.take_failure(StoreOp::CreateNode)?;

        let slot = match self.nodes.entry(node.name().to_string()) {
            Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    kind: NODE,
                    name: node.name().to_string(),
                })
            }
            Entry::Vacant(slot) => slot,
        };

        node.metadata.namespace = self.namespace.clone();
        node.metadata.resource_version = 1;

        slot.insert(node.clone());
        Ok(node)
    }

    async fn get_node(&self, name: &str) -> Result<Node, StoreError> {
        self.take_failure(StoreOp::GetNode)?;

        self.nodes
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| Self::not_found(NODE, name))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let mut nodes: Vec<Node> = self.nodes.iter().map(|r| r.clone()).collect();
        nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(nodes)
    }

    async fn update_node_status(&self, update: &Node) -> Result<Node, StoreError> {
        self.take_failure(StoreOp::UpdateNodeStatus)?;

        let mut node = self
            .nodes
            .get_mut(update.name())
            .ok_or_else(|| Self::not_found(NODE, update.name()))?;

        if node.metadata.resource_version != update.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: NODE,
                name: update.name().to_string(),
            });
        }

        node.status = update.status.clone();
        node.metadata.resource_version += 1;

        Ok(node.clone())
    }

    async fn delete_node(&self, name: &str) -> Result<(), StoreError> {
        self.take_failure(StoreOp::DeleteNode)?;

        self.nodes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(NODE, name))
    }

    async fn apply_secret(&self, mut secret: BmcSecret) -> Result<BmcSecret, StoreError> {
        self.take_failure(StoreOp::ApplySecret)?;

        secret.metadata.namespace = self.namespace.clone();

        let mut entry = self
            .secrets
            .entry(secret.name().to_string())
            .or_insert_with(|| {
                let mut created = secret.clone();
                created.metadata.resource_version = 0;
                created
            });

        entry.data = secret.data;
        entry.metadata.resource_version += 1;

        Ok(entry.clone())
    }

    async fn get_secret(&self, name: &str) -> Result<BmcSecret, StoreError> {
        self.secrets
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| Self::not_found(SECRET, name))
    }

    async fn delete_secret(&self, name: &str) -> Result<(), StoreError> {
        self.take_failure(StoreOp::DeleteSecret)?;

        self.secrets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(SECRET, name))
    }
}
