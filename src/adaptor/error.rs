//! Errors surfaced by the adaptor entrypoints

use thiserror::Error;

use crate::cluster::StoreError;
use crate::inventory::InventoryError;

/// Errors that can occur while handling a NodePool
#[derive(Error, Debug)]
pub enum AdaptorError {
    #[error("Unable to get current resources: {0}")]
    Inventory(#[source] InventoryError),

    #[error("Failed to persist allocation of node {node} to {cloud}/{group}: {source}")]
    Persistence {
        cloud: String,
        group: String,
        node: String,
        #[source]
        source: InventoryError,
    },

    #[error("Failed to persist release of cloud {cloud}: {source}")]
    ReleasePersistence {
        cloud: String,
        #[source]
        source: InventoryError,
    },

    #[error("Failed to {op} {name}: {source}")]
    Store {
        op: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "Not enough free resources remaining in resource pool {pool} for node group {group}: \
         need {requested}, {available} free"
    )]
    InsufficientResources {
        pool: String,
        group: String,
        requested: usize,
        available: usize,
    },

    #[error("Failed to decode {field} for node {node}: {source}")]
    Decode {
        node: String,
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Unable to find node info for {0}")]
    MissingNodeInfo(String),
}

impl AdaptorError {
    pub(crate) fn store(op: &'static str, name: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            op,
            name: name.into(),
            source,
        }
    }

    /// Whether invoking again later can succeed
    ///
    /// Malformed catalog entries need an operator to fix the inventory first.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Decode { .. } | Self::MissingNodeInfo(_))
    }

    pub fn is_insufficient_resources(&self) -> bool {
        matches!(self, Self::InsufficientResources { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn test_insufficient_resources_message() {
        let err = AdaptorError::InsufficientResources {
            pool: "P1".to_string(),
            group: "g2".to_string(),
            requested: 5,
            available: 1,
        };
        let message = err.to_string();
        assert!(message.contains("resource pool P1"));
        assert!(message.contains("need 5, 1 free"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_decode_is_not_retryable() {
        let source = base64::engine::general_purpose::STANDARD
            .decode("***")
            .unwrap_err();
        let err = AdaptorError::Decode {
            node: "n1".to_string(),
            field: "username",
            source,
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("node n1"));
    }

    #[test]
    fn test_store_error_context() {
        let err = AdaptorError::store(
            "delete Node",
            "n1",
            StoreError::Transient("timeout".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "Failed to delete Node n1: Transient store error: timeout"
        );
    }
}
