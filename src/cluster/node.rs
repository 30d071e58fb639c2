//! Node resource - one allocated bare-metal machine
//!
//! A Node is created when a catalog entry is assigned to a node group. Its
//! spec records who owns it; its status is projected from the catalog once
//! the node is ready:
//! - BMC address and the name of the credentials secret
//! - Network interfaces
//! - Hardware profile
//! - `Provisioned` condition

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::resources::{find_status_condition, Condition, ConditionType, ObjectMeta};
use super::API_VERSION;
use crate::inventory::Interface;

/// An allocated node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Kind is always "Node"
    pub kind: String,

    pub metadata: ObjectMeta,

    pub spec: NodeSpec,

    #[serde(default)]
    pub status: NodeStatus,
}

/// Ownership of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Cloud id of the owning NodePool
    #[serde(rename = "nodePool")]
    pub node_pool: String,

    #[serde(rename = "groupName")]
    pub group_name: String,

    #[serde(rename = "hwProfile")]
    pub hw_profile: String,
}

/// Observed state of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmc: Option<Bmc>,

    #[serde(default)]
    pub interfaces: Vec<Interface>,

    #[serde(rename = "hwProfile")]
    #[serde(default)]
    pub hw_profile: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// How to reach the node's BMC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bmc {
    pub address: String,

    /// Name of the secret holding the BMC credentials
    #[serde(rename = "credentialsName")]
    pub credentials_name: String,
}

impl Node {
    /// Create a node owned by a cloud's node group
    pub fn new(
        name: impl Into<String>,
        cloud_id: impl Into<String>,
        group_name: impl Into<String>,
        hw_profile: impl Into<String>,
    ) -> Self {
        let mut metadata = ObjectMeta::new(name);
        metadata.creation_timestamp = Some(Utc::now());
        metadata.generation = 1;

        Self {
            api_version: API_VERSION.to_string(),
            kind: "Node".to_string(),
            metadata,
            spec: NodeSpec {
                node_pool: cloud_id.into(),
                group_name: group_name.into(),
                hw_profile: hw_profile.into(),
            },
            status: NodeStatus::default(),
        }
    }

    /// Set the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = namespace.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Check if the node has been provisioned
    pub fn is_provisioned(&self) -> bool {
        find_status_condition(&self.status.conditions, ConditionType::Provisioned)
            .map(|c| c.is_true())
            .unwrap_or(false)
    }
}
