//! Allocation ledger - which nodes are assigned to which cloud and node group

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Persisted record of node assignments, one entry per cloud
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationLedger {
    #[serde(default)]
    pub clouds: Vec<CloudAllocation>,
}

/// Node groups of one cloud and the nodes assigned to each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudAllocation {
    #[serde(rename = "cloudID")]
    pub cloud_id: String,

    /// Node group name -> ordered node names
    #[serde(default)]
    pub nodegroups: BTreeMap<String, Vec<String>>,
}

impl AllocationLedger {
    /// Parse a ledger from its YAML text; empty text is an empty ledger
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Serialize the full ledger document
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Entry for a cloud
    pub fn cloud(&self, cloud_id: &str) -> Option<&CloudAllocation> {
        self.clouds.iter().find(|c| c.cloud_id == cloud_id)
    }

    /// Entry for a cloud, created at the end of the list if missing
    pub fn cloud_mut(&mut self, cloud_id: &str) -> &mut CloudAllocation {
        let index = match self.clouds.iter().position(|c| c.cloud_id == cloud_id) {
            Some(index) => index,
            None => {
                self.clouds.push(CloudAllocation {
                    cloud_id: cloud_id.to_string(),
                    nodegroups: BTreeMap::new(),
                });
                self.clouds.len() - 1
            }
        };
        &mut self.clouds[index]
    }

    /// Nodes allocated to a node group of a cloud
    pub fn group_nodes(&self, cloud_id: &str, group: &str) -> &[String] {
        self.cloud(cloud_id)
            .and_then(|c| c.nodegroups.get(group))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a node to a node group of a cloud
    pub fn allocate(&mut self, cloud_id: &str, group: &str, node: &str) {
        self.cloud_mut(cloud_id)
            .nodegroups
            .entry(group.to_string())
            .or_default()
            .push(node.to_string());
    }

    /// Remove the entry of a cloud, returning it
    pub fn release_cloud(&mut self, cloud_id: &str) -> Option<CloudAllocation> {
        let index = self.clouds.iter().position(|c| c.cloud_id == cloud_id)?;
        Some(self.clouds.remove(index))
    }

    /// Whether a node appears in any entry
    pub fn is_allocated(&self, node: &str) -> bool {
        self.all_nodes().any(|n| n == node)
    }

    /// Cloud and group a node is allocated to
    pub fn owner_of(&self, node: &str) -> Option<(&str, &str)> {
        self.clouds.iter().find_map(|cloud| {
            cloud
                .nodegroups
                .iter()
                .find(|(_, nodes)| nodes.iter().any(|n| n == node))
                .map(|(group, _)| (cloud.cloud_id.as_str(), group.as_str()))
        })
    }

    /// Every allocated node name, duplicates included
    pub fn all_nodes(&self) -> impl Iterator<Item = &str> {
        self.clouds
            .iter()
            .flat_map(|c| c.nodegroups.values())
            .flatten()
            .map(String::as_str)
    }
}

impl CloudAllocation {
    /// Every node of this cloud, group by group
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodegroups.iter().flat_map(|(group, nodes)| {
            nodes.iter().map(move |n| (group.as_str(), n.as_str()))
        })
    }
}
