//! # Loopback Hardware Adaptor
//!
//! Allocates simulated bare-metal nodes to NodePools and releases them.
//!
//! The adaptor owns no state of its own. Every invocation reads the inventory
//! record (catalog + allocation ledger) and the resource store, does at most a
//! bounded amount of work, and tells the caller when to come back:
//!
//! ```text
//!   NodePool ──▶ determine_action ──▶ Create / Processing / SpecChanged
//!                                           │
//!                                           ▼
//!                 free_nodes_in_pool ◀── allocate_nodes ──▶ ledger save
//!                                           │
//!                                           ▼
//!                      BMC secret ──▶ Node ──▶ Node status projection
//! ```
//!
//! Allocation is throttled to one new node per node group per invocation, so
//! a request of size N converges after N invocations.

pub mod allocate;
pub mod error;
pub mod fsm;
pub mod inventory;
pub mod latency;
pub mod nodepool;
pub mod release;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::{NodePool, ResourceStore, RetryPolicy};
use crate::inventory::InventoryStore;

pub use allocate::{AllocationReport, GroupOutcome};
pub use error::AdaptorError;
pub use fsm::{determine_action, NodePoolAction};
pub use inventory::{ResourceInfo, ResourcePoolInfo};
pub use latency::{FixedLatency, NoLatency, ProvisioningLatency};
pub use nodepool::{check_capacity, AllocationProgress};
pub use release::ReleaseReport;

/// Requeue delay after progress was made
pub const SHORT_REQUEUE_INTERVAL: Duration = Duration::from_secs(15);

/// Requeue delay after a failure worth retrying later
pub const MEDIUM_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// Default simulated provisioning latency in seconds
pub const DEFAULT_PROVISIONING_DELAY_SECS: u64 = 10;

// ============================================================================
// Policies
// ============================================================================

/// What to do when a node group cannot be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortagePolicy {
    /// Stop at the first short group; later groups are not evaluated
    #[default]
    AbortOnFirst,
    /// Record the shortage and keep going with the next group
    EvaluateAll,
}

/// Limits applied to a single allocation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    /// New nodes allocated per node group per call
    #[serde(rename = "maxNewAllocationsPerInvocation")]
    #[serde(default = "default_max_new_allocations")]
    pub max_new_allocations_per_invocation: usize,

    #[serde(rename = "shortagePolicy")]
    #[serde(default)]
    pub shortage: ShortagePolicy,
}

fn default_max_new_allocations() -> usize {
    1
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            max_new_allocations_per_invocation: default_max_new_allocations(),
            shortage: ShortagePolicy::default(),
        }
    }
}

// ============================================================================
// Reconcile result
// ============================================================================

/// When the caller should invoke the adaptor again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileResult {
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn do_not_requeue() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue_with_short_interval() -> Self {
        Self {
            requeue_after: Some(SHORT_REQUEUE_INTERVAL),
        }
    }

    pub fn requeue_with_medium_interval() -> Self {
        Self {
            requeue_after: Some(MEDIUM_REQUEUE_INTERVAL),
        }
    }

    pub fn requeue(&self) -> bool {
        self.requeue_after.is_some()
    }
}

// ============================================================================
// Adaptor
// ============================================================================

/// The loopback hardware adaptor
pub struct Adaptor {
    inventory: Arc<dyn InventoryStore>,
    store: Arc<dyn ResourceStore>,
    latency: Arc<dyn ProvisioningLatency>,
    policy: AllocationPolicy,
    retry: RetryPolicy,
}

impl Adaptor {
    /// Create an adaptor with default policies
    pub fn new(inventory: Arc<dyn InventoryStore>, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            inventory,
            store,
            latency: Arc::new(FixedLatency::from_secs(DEFAULT_PROVISIONING_DELAY_SECS)),
            policy: AllocationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_latency(mut self, latency: impl ProvisioningLatency + 'static) -> Self {
        self.latency = Arc::new(latency);
        self
    }

    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Namespace Nodes and secrets are created in
    pub fn namespace(&self) -> &str {
        self.store.namespace()
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn inventory(&self) -> &Arc<dyn InventoryStore> {
        &self.inventory
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// Handle a live NodePool
    pub async fn handle_node_pool(&self, pool: &NodePool) -> Result<ReconcileResult, AdaptorError> {
        let action = determine_action(pool);
        info!(
            "Handling NodePool {} (cloud {}): {}",
            pool.name(),
            pool.cloud_id(),
            action
        );

        match action {
            NodePoolAction::Create => self.handle_node_pool_create(pool).await,
            NodePoolAction::Processing => self.handle_node_pool_processing(pool).await,
            NodePoolAction::SpecChanged => self.handle_node_pool_spec_changed(pool).await,
            NodePoolAction::Noop => Ok(ReconcileResult::do_not_requeue()),
        }
    }

    /// Handle a NodePool that is being deleted
    pub async fn handle_node_pool_deletion(
        &self,
        pool: &NodePool,
    ) -> Result<ReconcileResult, AdaptorError> {
        info!(
            "Releasing hardware of NodePool {} (cloud {})",
            pool.name(),
            pool.cloud_id()
        );
        self.release_node_pool(pool).await?;
        Ok(ReconcileResult::do_not_requeue())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_results() {
        assert!(!ReconcileResult::do_not_requeue().requeue());
        assert_eq!(
            ReconcileResult::requeue_with_short_interval().requeue_after,
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            ReconcileResult::requeue_with_medium_interval().requeue_after,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_policy_defaults() {
        let policy = AllocationPolicy::default();
        assert_eq!(policy.max_new_allocations_per_invocation, 1);
        assert_eq!(policy.shortage, ShortagePolicy::AbortOnFirst);
    }

    #[test]
    fn test_shortage_policy_serde() {
        let policy: ShortagePolicy = serde_yaml::from_str("evaluate-all").unwrap();
        assert_eq!(policy, ShortagePolicy::EvaluateAll);
        assert_eq!(
            serde_yaml::to_string(&ShortagePolicy::AbortOnFirst)
                .unwrap()
                .trim(),
            "abort-on-first"
        );
    }
}
