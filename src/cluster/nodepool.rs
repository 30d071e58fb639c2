//! NodePool resource - a request for hardware on behalf of a cloud
//!
//! A NodePool declares, per node group, how many nodes of which resource pool
//! and hardware profile a cloud needs. The adaptor reads the spec and reports
//! progress through the `Provisioned` condition and the observed generation.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::resources::{find_status_condition, Condition, ConditionType, ObjectMeta};
use super::API_VERSION;

/// A request for a set of node groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePool {
    #[serde(rename = "apiVersion")]
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Kind is always "NodePool"
    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    pub spec: NodePoolSpec,

    #[serde(default)]
    pub status: NodePoolStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    "NodePool".to_string()
}

/// Desired node groups of a cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePoolSpec {
    /// Cloud the nodes are allocated to
    #[serde(rename = "cloudID")]
    pub cloud_id: String,

    /// Node groups in declaration order
    #[serde(rename = "nodeGroup")]
    #[serde(default)]
    pub node_groups: Vec<NodeGroup>,
}

/// A named group of identical nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub name: String,

    /// Resource pool the nodes are taken from
    #[serde(rename = "resourcePoolId")]
    pub resource_pool_id: String,

    /// Desired number of nodes
    pub size: usize,

    #[serde(rename = "hwProfile")]
    #[serde(default)]
    pub hw_profile: String,
}

/// Observed state of a NodePool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePoolStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Generation last fully provisioned
    #[serde(rename = "observedGeneration")]
    #[serde(default)]
    pub observed_generation: i64,

    #[serde(default)]
    pub properties: NodePoolProperties,
}

/// Properties published once nodes are allocated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePoolProperties {
    #[serde(rename = "nodeNames")]
    #[serde(default)]
    pub node_names: Vec<String>,
}

impl NodePool {
    /// Create a new NodePool for a cloud
    pub fn new(name: impl Into<String>, cloud_id: impl Into<String>) -> Self {
        let mut metadata = ObjectMeta::new(name);
        metadata.creation_timestamp = Some(Utc::now());
        metadata.generation = 1;

        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata,
            spec: NodePoolSpec {
                cloud_id: cloud_id.into(),
                node_groups: vec![],
            },
            status: NodePoolStatus::default(),
        }
    }

    /// Add a node group
    pub fn with_group(
        mut self,
        name: impl Into<String>,
        resource_pool_id: impl Into<String>,
        size: usize,
        hw_profile: impl Into<String>,
    ) -> Self {
        self.spec.node_groups.push(NodeGroup {
            name: name.into(),
            resource_pool_id: resource_pool_id.into(),
            size,
            hw_profile: hw_profile.into(),
        });
        self
    }

    /// Set the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = namespace.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn cloud_id(&self) -> &str {
        &self.spec.cloud_id
    }

    /// The `Provisioned` condition, if recorded
    pub fn provisioned_condition(&self) -> Option<&Condition> {
        find_status_condition(&self.status.conditions, ConditionType::Provisioned)
    }

    /// Provisioned and the current generation has been observed
    pub fn is_provisioned(&self) -> bool {
        self.provisioned_condition()
            .map(|c| c.is_true())
            .unwrap_or(false)
            && self.metadata.generation == self.status.observed_generation
    }

    /// Total number of nodes requested over all groups
    pub fn total_size(&self) -> usize {
        self.spec.node_groups.iter().map(|g| g.size).sum()
    }

    /// Parse a NodePool manifest (YAML or JSON)
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}
