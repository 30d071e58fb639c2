//! BMC credential secrets

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resources::ObjectMeta;

/// Key of the decoded username
pub const USERNAME_KEY: &str = "username";

/// Key of the decoded password
pub const PASSWORD_KEY: &str = "password";

/// Name of the secret holding a node's BMC credentials
pub fn bmc_secret_name(node_name: &str) -> String {
    format!("{}-bmc-secret", node_name)
}

/// Decoded BMC credentials of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmcSecret {
    pub metadata: ObjectMeta,

    /// Raw credential bytes
    #[serde(default)]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl BmcSecret {
    /// Secret for a node, named after it
    pub fn new(node_name: &str, namespace: &str, username: Vec<u8>, password: Vec<u8>) -> Self {
        let mut metadata = ObjectMeta::new(bmc_secret_name(node_name));
        metadata.namespace = namespace.to_string();

        let mut data = BTreeMap::new();
        data.insert(USERNAME_KEY.to_string(), username);
        data.insert(PASSWORD_KEY.to_string(), password);

        Self { metadata, data }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn username(&self) -> Option<&[u8]> {
        self.data.get(USERNAME_KEY).map(Vec::as_slice)
    }

    pub fn password(&self) -> Option<&[u8]> {
        self.data.get(PASSWORD_KEY).map(Vec::as_slice)
    }
}
