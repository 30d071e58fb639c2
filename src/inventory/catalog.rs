//! Resource catalog - the physically available hardware
//!
//! The catalog is provisioned out-of-band by an operator and is read-only for
//! the adaptor. It groups node names by resource pool and carries the BMC
//! access details and network interfaces of every node.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// All known physical nodes, grouped by resource pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCatalog {
    /// Resource pool id -> ordered node names
    ///
    /// The order within a pool is the allocation order.
    #[serde(default)]
    pub resourcepools: BTreeMap<String, Vec<String>>,

    /// Node name -> node details
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeInfo>,
}

/// Details of a single physical node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Baseboard management controller access
    pub bmc: BmcInfo,

    /// Network interfaces
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

/// BMC address and base64-encoded credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BmcInfo {
    pub address: String,

    #[serde(rename = "username-base64")]
    pub username_base64: String,

    #[serde(rename = "password-base64")]
    pub password_base64: String,
}

/// A network interface of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,

    #[serde(default)]
    pub label: String,

    #[serde(rename = "macAddress")]
    pub mac_address: String,
}

impl ResourceCatalog {
    /// Parse a catalog from its YAML text
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Node names of a pool in catalog order, empty for an unknown pool
    pub fn pool_members(&self, pool_id: &str) -> &[String] {
        self.resourcepools
            .get(pool_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look up a node
    pub fn node(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name)
    }

    /// Resource pool a node belongs to
    pub fn pool_of(&self, name: &str) -> Option<&str> {
        self.resourcepools
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == name))
            .map(|(id, _)| id.as_str())
    }

    /// Resource pool ids in sorted order
    pub fn pool_ids(&self) -> impl Iterator<Item = &str> {
        self.resourcepools.keys().map(String::as_str)
    }

    /// Add a node to a pool (builder used by tests and the CLI)
    pub fn with_node(mut self, pool_id: &str, name: &str, info: NodeInfo) -> Self {
        self.resourcepools
            .entry(pool_id.to_string())
            .or_default()
            .push(name.to_string());
        self.nodes.insert(name.to_string(), info);
        self
    }
}

impl NodeInfo {
    /// Create node info with the given BMC address and encoded credentials
    pub fn new(
        address: impl Into<String>,
        username_base64: impl Into<String>,
        password_base64: impl Into<String>,
    ) -> Self {
        Self {
            bmc: BmcInfo {
                address: address.into(),
                username_base64: username_base64.into(),
                password_base64: password_base64.into(),
            },
            interfaces: vec![],
        }
    }

    /// Add a network interface
    pub fn with_interface(
        mut self,
        name: impl Into<String>,
        label: impl Into<String>,
        mac_address: impl Into<String>,
    ) -> Self {
        self.interfaces.push(Interface {
            name: name.into(),
            label: label.into(),
            mac_address: mac_address.into(),
        });
        self
    }
}
