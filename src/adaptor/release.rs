//! Release engine
//!
//! Returns every node of a cloud to the free pool: deletes the BMC secret and
//! the Node resource of each ledger entry, then drops the cloud's ledger entry.
//! Objects that are already gone count as deleted, so a release interrupted
//! half-way finishes on the next call. A ledger save that loses a race with
//! another writer reloads the allocations and tries again.

use tracing::{debug, info};

use super::{Adaptor, AdaptorError};
use crate::cluster::retry::retry_on_conflict_or_retriable;
use crate::cluster::{bmc_secret_name, ignore_not_found, NodePool};

/// What a release call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub cloud_id: String,

    /// Released nodes in ledger order
    pub released: Vec<String>,
}

impl Adaptor {
    /// Release all nodes allocated to the pool's cloud
    pub async fn release_node_pool(&self, pool: &NodePool) -> Result<ReleaseReport, AdaptorError> {
        let cloud_id = pool.cloud_id();
        let mut report = ReleaseReport {
            cloud_id: cloud_id.to_string(),
            released: Vec::new(),
        };

        let steps = self.retry.steps.max(1);
        let mut attempt = 0;

        loop {
            let snapshot = self.inventory.load().await.map_err(AdaptorError::Inventory)?;
            let mut ledger = snapshot.ledger;

            let nodes: Vec<String> = match ledger.cloud(cloud_id) {
                Some(cloud) => cloud.nodes().map(|(_, node)| node.to_string()).collect(),
                None if report.released.is_empty() => {
                    info!("No allocated nodes found for cloud {}", cloud_id);
                    return Ok(report);
                }
                None => break,
            };

            for nodename in nodes {
                self.delete_bmc_secret(&nodename).await?;
                self.delete_node(&nodename).await?;
                debug!("Released node {} from cloud {}", nodename, cloud_id);
                if !report.released.contains(&nodename) {
                    report.released.push(nodename);
                }
            }

            ledger.release_cloud(cloud_id);
            match self.inventory.save(&ledger, &snapshot.token).await {
                Ok(_) => break,
                Err(source) if source.is_retryable() && attempt + 1 < steps => {
                    let delay = self.retry.delay(attempt);
                    debug!(
                        "Reloading allocations of cloud {} after {:?}: {}",
                        cloud_id, delay, source
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(AdaptorError::ReleasePersistence {
                        cloud: cloud_id.to_string(),
                        source,
                    })
                }
            }
        }

        info!(
            "Released {} node(s) of cloud {}",
            report.released.len(),
            cloud_id
        );
        Ok(report)
    }

    /// Delete the BMC secret of a node; a missing secret is not an error
    pub async fn delete_bmc_secret(&self, nodename: &str) -> Result<(), AdaptorError> {
        let name = bmc_secret_name(nodename);
        let secret = name.as_str();
        retry_on_conflict_or_retriable(&self.retry, || async move {
            ignore_not_found(self.store.delete_secret(secret).await)
        })
        .await
        .map_err(|e| AdaptorError::store("delete BMC secret", secret, e))
    }

    /// Delete a Node resource; a missing node is not an error
    pub async fn delete_node(&self, nodename: &str) -> Result<(), AdaptorError> {
        retry_on_conflict_or_retriable(&self.retry, || async move {
            ignore_not_found(self.store.delete_node(nodename).await)
        })
        .await
        .map_err(|e| AdaptorError::store("delete Node", nodename, e))
    }
}
