//! Orchestrator - periodically reconciles NodePools in the background
//!
//! The orchestrator runs as a background task on the control plane. On every
//! tick it asks the controller to reconcile the NodePools that are due; those
//! reconciles run concurrently, one per NodePool.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::controller::PoolController;

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How often to look for due NodePools (seconds)
    #[serde(rename = "reconcileIntervalSecs")]
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_reconcile_interval_secs() -> u64 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

/// Spawn the orchestrator as a background task
///
/// Send on (or drop) the returned channel to stop it.
pub fn spawn_orchestrator(
    controller: PoolController,
    config: OrchestratorConfig,
) -> watch::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.reconcile_interval_secs.max(1)));

        info!(
            "Orchestrator started, reconciling every {}s",
            config.reconcile_interval_secs
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match controller.reconcile_due().await {
                        Ok(reconciled) if !reconciled.is_empty() => {
                            debug!("Reconciled NodePools: {}", reconciled.join(", "));
                        }
                        Ok(_) => {}
                        Err(e) => error!("Failed to list NodePools: {}", e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Orchestrator shutting down");
                    break;
                }
            }
        }
    });

    shutdown_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adaptor::testing::Fixture;
    use crate::adaptor::{Adaptor, NoLatency};
    use crate::cluster::{NodePool, RetryPolicy};

    #[test]
    fn test_default_config() {
        assert_eq!(OrchestratorConfig::default().reconcile_interval_secs, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_provisions_in_background() {
        let fx = Fixture::new();
        let adaptor = Adaptor::new(fx.inventory.clone(), fx.store.clone())
            .with_latency(NoLatency)
            .with_retry_policy(RetryPolicy::immediate(3));
        let controller = PoolController::new(Arc::new(adaptor));
        controller
            .create_node_pool(NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw"))
            .await
            .unwrap();

        let shutdown = spawn_orchestrator(controller.clone(), OrchestratorConfig::default());

        // create, allocate, complete: each requeued 15s later
        for _ in 0..12 {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        let pool = controller.get_node_pool("np1").await.unwrap();
        assert!(pool.is_provisioned());
        assert_eq!(fx.ledger().await.group_nodes("cloud-a", "g1"), ["n1"]);

        shutdown.send(()).unwrap();
    }
}
