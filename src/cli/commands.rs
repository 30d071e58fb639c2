//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, printing is handled by the caller

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::ServeArgs;
use crate::adaptor::{Adaptor, AdaptorError, ReleaseReport, ResourceInfo, ResourcePoolInfo};
use crate::cluster::{
    create_control_plane_router, spawn_orchestrator, Condition, ControlPlaneState,
    ControllerError, MemoryResourceStore, NodePool, PoolController,
};
use crate::config::{load_settings_or_default, ConfigError, Settings};
use crate::inventory::{
    validate_inventory, AllocationLedger, FileInventoryStore, InventoryError, InventoryIssue,
    InventoryRecord, ResourceCatalog,
};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("{0}")]
    Adaptor(#[from] AdaptorError),

    #[error("{0}")]
    Controller(#[from] ControllerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("Resource pool '{0}' not found")]
    PoolNotFound(String),

    #[error("Inventory {0} already exists (use --force to overwrite)")]
    InventoryExists(PathBuf),

    #[error("Resource catalog is inconsistent: {0}")]
    InvalidCatalog(String),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Settings (Pure business logic)
// ============================================================================

/// Load settings and apply the global `--inventory` override
pub fn resolve_settings(
    config: Option<&Path>,
    inventory: Option<&Path>,
) -> CommandResult<Settings> {
    let settings = load_settings_or_default(config)?;
    Ok(with_inventory(settings, inventory))
}

fn with_inventory(mut settings: Settings, inventory: Option<&Path>) -> Settings {
    if let Some(path) = inventory {
        settings.inventory_path = path.display().to_string();
    }
    settings
}

/// Apply `serve` flags on top of loaded settings
pub fn apply_serve_args(mut settings: Settings, args: &ServeArgs) -> Settings {
    if let Some(ref bind_addr) = args.bind_addr {
        settings.bind_addr = bind_addr.clone();
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(ref namespace) = args.namespace {
        settings.namespace = namespace.clone();
    }
    if let Some(delay) = args.provisioning_delay_secs {
        settings.provisioning_delay_secs = delay;
    }
    settings
}

/// Adaptor over the configured inventory file and a fresh in-memory store
pub fn open_adaptor(settings: &Settings) -> Arc<Adaptor> {
    let store = Arc::new(MemoryResourceStore::new(settings.namespace.clone()));
    Arc::new(settings.build_adaptor(store))
}

// ============================================================================
// Inventory Commands
// ============================================================================

/// Counts of a freshly written inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSummary {
    pub path: PathBuf,
    pub resource_pools: usize,
    pub nodes: usize,
}

/// Parse and check a resource catalog document
pub fn parse_catalog(path: &Path, content: &str) -> CommandResult<ResourceCatalog> {
    let catalog = ResourceCatalog::from_yaml(content).map_err(|e| CommandError::Manifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let issues = validate_inventory(&catalog, &AllocationLedger::default());
    if !issues.is_empty() {
        let issues: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        return Err(CommandError::InvalidCatalog(issues.join("; ")));
    }

    Ok(catalog)
}

/// Write a new inventory record holding `resources` and no allocations
pub async fn init_inventory(
    inventory: &Path,
    resources: &Path,
    force: bool,
) -> CommandResult<InitSummary> {
    if !force && tokio::fs::try_exists(inventory).await? {
        return Err(CommandError::InventoryExists(inventory.to_path_buf()));
    }

    let content = tokio::fs::read_to_string(resources).await?;
    let catalog = parse_catalog(resources, &content)?;
    let record = InventoryRecord::new(&catalog, &AllocationLedger::default())?;

    if let Some(parent) = inventory.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    FileInventoryStore::new(inventory).initialize(&record).await?;

    info!("Initialized inventory {}", inventory.display());
    Ok(InitSummary {
        path: inventory.to_path_buf(),
        resource_pools: catalog.resourcepools.len(),
        nodes: catalog.nodes.len(),
    })
}

/// Free nodes of a resource pool, in allocation order
pub async fn free_nodes(adaptor: &Adaptor, pool_id: &str) -> CommandResult<Vec<String>> {
    adaptor
        .free_nodes(pool_id)
        .await?
        .ok_or_else(|| CommandError::PoolNotFound(pool_id.to_string()))
}

/// Everything `hwpool inventory` prints
#[derive(Debug, Clone)]
pub struct InventoryReport {
    pub pools: Vec<ResourcePoolInfo>,
    pub resources: Vec<ResourceInfo>,
}

pub async fn inventory_report(adaptor: &Adaptor) -> CommandResult<InventoryReport> {
    Ok(InventoryReport {
        pools: adaptor.get_resource_pools().await?,
        resources: adaptor.get_resources().await?,
    })
}

pub async fn check_inventory(adaptor: &Adaptor) -> CommandResult<Vec<InventoryIssue>> {
    Ok(adaptor.validate_inventory().await?)
}

/// Release every node the ledger assigns to `cloud_id`
pub async fn release_cloud(adaptor: &Adaptor, cloud_id: &str) -> CommandResult<ReleaseReport> {
    let pool = NodePool::new(cloud_id, cloud_id);
    Ok(adaptor.release_node_pool(&pool).await?)
}

// ============================================================================
// Offline Reconcile
// ============================================================================

/// Read a NodePool manifest
pub async fn load_request(path: &Path) -> CommandResult<NodePool> {
    let content = tokio::fs::read_to_string(path).await?;
    NodePool::from_yaml(&content).map_err(|e| CommandError::Manifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// State of the NodePool after one reconcile invocation
#[derive(Debug, Clone)]
pub struct SimulationStep {
    pub invocation: u32,
    pub node_names: Vec<String>,
    pub condition: Option<Condition>,
    pub requeue_after: Option<Duration>,
    pub error: Option<String>,
}

/// Outcome of an offline reconcile run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub name: String,
    pub cloud_id: String,
    pub steps: Vec<SimulationStep>,
    pub provisioned: bool,
    pub node_names: Vec<String>,
    pub released: bool,
}

/// Submit `pool` and reconcile it until it settles or `invocations` run out
///
/// Requeue delays are not waited for; each invocation follows the previous
/// one immediately.
pub async fn simulate_request(
    controller: &PoolController,
    pool: NodePool,
    invocations: u32,
    release: bool,
) -> CommandResult<SimulationReport> {
    let created = controller.create_node_pool(pool).await?;
    let name = created.name().to_string();
    let mut steps = Vec::new();

    for invocation in 1..=invocations {
        let result = controller.reconcile(&name).await;
        let current = controller.get_node_pool(&name).await?;

        let stop = match &result {
            Ok(r) => !r.requeue(),
            Err(ControllerError::Adaptor(e)) => !e.is_retryable(),
            Err(_) => false,
        };

        steps.push(SimulationStep {
            invocation,
            node_names: current.status.properties.node_names.clone(),
            condition: current.provisioned_condition().cloned(),
            requeue_after: result.as_ref().ok().and_then(|r| r.requeue_after),
            error: result.err().map(|e| e.to_string()),
        });

        if stop {
            break;
        }
    }

    let current = controller.get_node_pool(&name).await?;
    let provisioned = current.is_provisioned();
    let node_names = current.status.properties.node_names.clone();

    if release {
        controller.delete_node_pool(&name).await?;
        controller.reconcile(&name).await?;
        info!("NodePool {} deleted, nodes released", name);
    }

    Ok(SimulationReport {
        name,
        cloud_id: current.spec.cloud_id.clone(),
        steps,
        provisioned,
        node_names,
        released: release,
    })
}

// ============================================================================
// Server
// ============================================================================

/// Run the control plane until Ctrl-C
pub async fn run_server(settings: Settings) -> CommandResult<()> {
    let adaptor = open_adaptor(&settings);

    let issues = adaptor.validate_inventory().await?;
    for issue in &issues {
        warn!("Inventory issue: {}", issue);
    }

    let controller = PoolController::new(adaptor);
    let shutdown = spawn_orchestrator(controller.clone(), settings.orchestrator.clone());
    let app = create_control_plane_router(ControlPlaneState::new(controller));

    let addr = settings.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("hwpool control plane listening on {}", addr);
    info!("Inventory: {}", settings.inventory_path().display());
    info!("Endpoints:");
    info!("  GET  /health                      - Health check");
    info!("  GET  /v1/status                   - Cluster statistics");
    info!("  GET  /v1/nodepools                - List NodePools");
    info!("  POST /v1/nodepools                - Create a NodePool");
    info!("  GET  /v1/nodes                    - List Nodes");
    info!("  GET  /v1/resourcepools            - Resource pool counts");
    info!("  GET  /v1/resourcepools/{{id}}/free  - Free nodes of a pool");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    let _ = shutdown.send(());
    info!("hwpool control plane stopped");
    Ok(())
}
