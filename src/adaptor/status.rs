//! Status projection
//!
//! Copies a catalog entry onto an allocated Node's status once the node is
//! ready: BMC address, credentials secret name, interfaces, hardware profile
//! and a `Provisioned` condition.

use tracing::debug;

use super::{Adaptor, AdaptorError};
use crate::cluster::resources::{
    set_status_condition, ConditionReason, ConditionStatus, ConditionType,
};
use crate::cluster::retry::retry_on_conflict_or_retriable_or_not_found;
use crate::cluster::{bmc_secret_name, Bmc, Node, NodeStatus};
use crate::inventory::NodeInfo;

/// Message of the `Provisioned` condition on a ready node
pub const NODE_PROVISIONED_MESSAGE: &str = "Provisioned";

/// Project a catalog entry onto a node status
///
/// Conditions of other types are left untouched.
pub fn project_node_status(
    status: &mut NodeStatus,
    nodename: &str,
    info: &NodeInfo,
    hw_profile: &str,
) {
    status.bmc = Some(Bmc {
        address: info.bmc.address.clone(),
        credentials_name: bmc_secret_name(nodename),
    });
    status.interfaces = info.interfaces.clone();
    status.hw_profile = hw_profile.to_string();
    set_status_condition(
        &mut status.conditions,
        ConditionType::Provisioned,
        ConditionReason::Completed,
        ConditionStatus::True,
        NODE_PROVISIONED_MESSAGE,
    );
}

impl Adaptor {
    /// Fetch a Node, tolerating a freshly created one not being visible yet
    pub async fn get_node(&self, nodename: &str) -> Result<Node, AdaptorError> {
        retry_on_conflict_or_retriable_or_not_found(&self.retry, || {
            self.store.get_node(nodename)
        })
        .await
        .map_err(|e| AdaptorError::store("get Node", nodename, e))
    }

    /// Project the catalog entry onto the Node status
    ///
    /// Refetches and reapplies on conflict, so concurrent writers are never
    /// overwritten with stale data.
    pub async fn update_node_status(
        &self,
        nodename: &str,
        info: &NodeInfo,
        hw_profile: &str,
    ) -> Result<Node, AdaptorError> {
        let updated = retry_on_conflict_or_retriable_or_not_found(&self.retry, || async move {
            let mut node = self.store.get_node(nodename).await?;
            project_node_status(&mut node.status, nodename, info, hw_profile);
            self.store.update_node_status(&node).await
        })
        .await
        .map_err(|e| AdaptorError::store("update status of Node", nodename, e))?;

        debug!("Updated status of Node {}", nodename);
        Ok(updated)
    }
}
