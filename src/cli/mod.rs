//! CLI module for hwpool
//!
//! Provides subcommands:
//! - `hwpool serve` - Run the control plane (API server + reconcile loop)
//! - `hwpool init` - Create the inventory file from a resource catalog
//! - `hwpool free` - List the free nodes of a resource pool
//! - `hwpool inventory` - Show resource pools and node assignments
//! - `hwpool validate` - Check the inventory for inconsistencies
//! - `hwpool reconcile` - Drive one NodePool request to completion offline
//! - `hwpool release` - Return a cloud's nodes to their pools

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "hwpool")]
#[command(about = "Simulated bare-metal node pools for hardware-manager plugins")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to settings file (default: ~/.hwpool/config.yaml)
    #[arg(long, global = true, env = "HWPOOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the inventory file (overrides inventoryPath)
    #[arg(long, global = true, env = "HWPOOL_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Path to a .env file loaded before anything else
    #[arg(long, global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control plane server
    Serve(ServeArgs),

    /// Create the inventory file from a resource catalog
    Init(InitArgs),

    /// List the free nodes of a resource pool
    Free(FreeArgs),

    /// Show resource pools and node assignments
    Inventory,

    /// Check the inventory for inconsistencies
    Validate,

    /// Reconcile a NodePool request against the inventory file
    Reconcile(ReconcileArgs),

    /// Release every node allocated to a cloud
    Release(ReleaseArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Bind address for the server
    #[arg(long, env = "HWPOOL_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Port to listen on (default: 8282)
    #[arg(short, long, env = "HWPOOL_PORT")]
    pub port: Option<u16>,

    /// Namespace for Nodes and BMC secrets
    #[arg(short, long, env = "HWPOOL_NAMESPACE")]
    pub namespace: Option<String>,

    /// Simulated provisioning latency per allocation call
    #[arg(long, env = "HWPOOL_PROVISIONING_DELAY_SECS")]
    pub provisioning_delay_secs: Option<u64>,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Resource catalog (YAML with `resourcepools` and `nodes`)
    #[arg(long, value_name = "FILE")]
    pub resources: PathBuf,

    /// Overwrite an existing inventory, dropping its allocations
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the free command
#[derive(Parser, Debug)]
pub struct FreeArgs {
    /// Resource pool id
    #[arg(long)]
    pub pool: String,
}

/// Arguments for the reconcile command
#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    /// NodePool manifest (YAML)
    #[arg(long, value_name = "FILE")]
    pub request: PathBuf,

    /// Maximum number of reconcile invocations
    #[arg(long, default_value = "10")]
    pub invocations: u32,

    /// Simulated provisioning latency (default: provisioningDelaySecs)
    #[arg(long)]
    pub provisioning_delay_secs: Option<u64>,

    /// Delete the NodePool afterwards, releasing its nodes
    #[arg(long)]
    pub release: bool,
}

/// Arguments for the release command
#[derive(Parser, Debug)]
pub struct ReleaseArgs {
    /// Cloud whose nodes are released
    #[arg(long)]
    pub cloud: String,
}
