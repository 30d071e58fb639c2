//! # hwpool Cluster Resources
//!
//! Kubernetes-like objects and control loop for simulated bare-metal pools.
//!
//! ## Core Resources
//!
//! - **NodePool**: A cloud's request for node groups (pool id, size, profile)
//! - **Node**: One allocated machine, owned by a cloud's node group
//! - **BmcSecret**: The BMC credentials of an allocated node
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    hwpool Control Plane                      │
//! │                      (hwpool serve)                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ API Server   │  │ NodePool     │  │ Orchestrator     │  │
//! │  │ :8282        │  │ Controller   │  │ (requeue loop)   │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                    │
//!              ▼                                    ▼
//!   ┌─────────────────────┐            ┌────────────────────────┐
//!   │ Resource store      │            │ Inventory record       │
//!   │ NodePools, Nodes,   │            │ resources: catalog     │
//!   │ BMC secrets         │            │ allocations: ledger    │
//!   └─────────────────────┘            └────────────────────────┘
//! ```

pub mod api;
pub mod controller;
pub mod node;
pub mod nodepool;
pub mod orchestrator;
pub mod resources;
pub mod retry;
pub mod secret;
pub mod store;

pub use api::{create_control_plane_router, ControlPlaneState};
pub use controller::{validate_node_pool, ClusterStats, ControllerError, PoolController};
pub use node::{Bmc, Node, NodeSpec, NodeStatus};
pub use nodepool::{NodeGroup, NodePool, NodePoolProperties, NodePoolSpec, NodePoolStatus};
pub use orchestrator::{spawn_orchestrator, OrchestratorConfig};
pub use resources::*;
pub use retry::RetryPolicy;
pub use secret::{bmc_secret_name, BmcSecret};
pub use store::{ignore_not_found, MemoryResourceStore, ResourceStore, StoreError, StoreOp};

/// API version stamped on every object
pub const API_VERSION: &str = "hwpool.io/v1";

/// Namespace objects live in unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "hwpool";

/// Finalizer that holds a NodePool until its hardware is released
pub const NODEPOOL_FINALIZER: &str = "hwpool.io/release-hardware";

/// Default control plane API port
pub const CONTROL_PLANE_PORT: u16 = 8282;
