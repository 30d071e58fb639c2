//! Settings for the hwpool binary
//!
//! Settings come from a YAML file (`~/.hwpool/config.yaml` unless `--config`
//! says otherwise). Every key is optional; CLI flags override what is loaded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adaptor::{Adaptor, AllocationPolicy, FixedLatency, DEFAULT_PROVISIONING_DELAY_SECS};
use crate::cluster::{
    OrchestratorConfig, ResourceStore, RetryPolicy, CONTROL_PLANE_PORT, DEFAULT_NAMESPACE,
};
use crate::inventory::FileInventoryStore;

/// Default settings file location: ~/.hwpool/config.yaml
pub fn default_config_path() -> PathBuf {
    hwpool_home().join("config.yaml")
}

fn hwpool_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hwpool")
}

/// Errors loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Namespace Nodes and BMC secrets are created in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(rename = "bindAddr")]
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Inventory record file; `~` is expanded
    #[serde(rename = "inventoryPath")]
    #[serde(default = "default_inventory_path_string")]
    pub inventory_path: String,

    /// Simulated provisioning latency per allocation call
    #[serde(rename = "provisioningDelaySecs")]
    #[serde(default = "default_provisioning_delay_secs")]
    pub provisioning_delay_secs: u64,

    #[serde(flatten)]
    pub orchestrator: OrchestratorConfig,

    #[serde(flatten)]
    pub allocation: AllocationPolicy,

    /// Backoff for resource store calls
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    CONTROL_PLANE_PORT
}

fn default_inventory_path_string() -> String {
    "~/.hwpool/inventory.yaml".to_string()
}

fn default_provisioning_delay_secs() -> u64 {
    DEFAULT_PROVISIONING_DELAY_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            inventory_path: default_inventory_path_string(),
            provisioning_delay_secs: default_provisioning_delay_secs(),
            orchestrator: OrchestratorConfig::default(),
            allocation: AllocationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Inventory path with `~` expanded
    pub fn inventory_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.inventory_path).as_ref())
    }

    /// Address the API server listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Build an adaptor over the configured inventory file and `store`
    pub fn build_adaptor(&self, store: Arc<dyn ResourceStore>) -> Adaptor {
        let inventory = Arc::new(FileInventoryStore::new(self.inventory_path()));
        Adaptor::new(inventory, store)
            .with_latency(FixedLatency::from_secs(self.provisioning_delay_secs))
            .with_policy(self.allocation)
            .with_retry_policy(self.retry.clone())
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse settings from YAML; an empty document yields the defaults
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load settings from a file
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Load settings from `path`, or from the default location if it exists
///
/// An explicit path must exist; a missing default file means defaults.
pub fn load_settings_or_default(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => load_settings(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                load_settings(&path)
            } else {
                Ok(Settings::default())
            }
        }
    }
}
