//! Control Plane API Server
//!
//! Provides REST endpoints for managing hwpool:
//! - NodePools: create, list, get, update spec, delete
//! - Nodes: list, get
//! - Resource pools and resources: inventory views
//! - Status: cluster health

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::{
    controller::{ControllerError, PoolController},
    nodepool::{NodePool, NodePoolSpec},
    resources::{OperationStatus, ResourceList},
    ClusterStats,
};

/// Shared state for the control plane API
#[derive(Clone)]
pub struct ControlPlaneState {
    pub controller: Arc<PoolController>,
}

impl ControlPlaneState {
    pub fn new(controller: PoolController) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }
}

/// Create the control plane router
pub fn create_control_plane_router(state: ControlPlaneState) -> Router {
    Router::new()
        // Cluster status
        .route("/v1/status", get(cluster_status))
        // NodePools
        .route(
            "/v1/nodepools",
            get(list_node_pools).post(create_node_pool),
        )
        .route(
            "/v1/nodepools/{name}",
            get(get_node_pool)
                .put(update_node_pool)
                .delete(delete_node_pool),
        )
        // Nodes
        .route("/v1/nodes", get(list_nodes))
        .route("/v1/nodes/{name}", get(get_node))
        // Inventory
        .route("/v1/resourcepools", get(list_resource_pools))
        .route("/v1/resourcepools/{id}/free", get(list_free_nodes))
        .route("/v1/resources", get(list_resources))
        // Health check
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_status(err: &ControllerError) -> StatusCode {
    match err {
        ControllerError::NodePoolNotFound(_) | ControllerError::NodeNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ControllerError::NodePoolExists(_) => StatusCode::CONFLICT,
        ControllerError::ValidationError(_) => StatusCode::BAD_REQUEST,
        ControllerError::Adaptor(_) | ControllerError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: impl Into<ControllerError>) -> Response {
    let err = err.into();
    let status = error_status(&err);
    if status.is_server_error() {
        warn!("API request failed: {}", err);
    }
    (status, Json(OperationStatus::failure(err.to_string()))).into_response()
}

// ============================================================================
// Health & Status
// ============================================================================

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn cluster_status(State(state): State<ControlPlaneState>) -> Response {
    match state.controller.cluster_stats().await {
        Ok(stats) => Json(ClusterStatusResponse {
            status: "ok".to_string(),
            stats,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Serialize)]
struct ClusterStatusResponse {
    status: String,
    stats: ClusterStats,
}

// ============================================================================
// NodePool Endpoints
// ============================================================================

#[derive(Serialize)]
struct NodePoolResponse {
    success: bool,
    #[serde(rename = "nodePool")]
    node_pool: NodePool,
}

async fn create_node_pool(
    State(state): State<ControlPlaneState>,
    Json(pool): Json<NodePool>,
) -> Response {
    match state.controller.create_node_pool(pool).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(NodePoolResponse {
                success: true,
                node_pool: created,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_node_pools(State(state): State<ControlPlaneState>) -> Response {
    match state.controller.list_node_pools().await {
        Ok(pools) => Json(ResourceList::new("NodePoolList", pools)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_node_pool(
    State(state): State<ControlPlaneState>,
    Path(name): Path<String>,
) -> Response {
    match state.controller.get_node_pool(&name).await {
        Ok(pool) => Json(pool).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_node_pool(
    State(state): State<ControlPlaneState>,
    Path(name): Path<String>,
    Json(spec): Json<NodePoolSpec>,
) -> Response {
    match state.controller.update_node_pool_spec(&name, spec).await {
        Ok(pool) => Json(NodePoolResponse {
            success: true,
            node_pool: pool,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_node_pool(
    State(state): State<ControlPlaneState>,
    Path(name): Path<String>,
) -> Response {
    match state.controller.delete_node_pool(&name).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(OperationStatus::success("NodePool deletion requested")),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Node Endpoints
// ============================================================================

async fn list_nodes(State(state): State<ControlPlaneState>) -> Response {
    match state.controller.list_nodes().await {
        Ok(nodes) => Json(ResourceList::new("NodeList", nodes)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_node(State(state): State<ControlPlaneState>, Path(name): Path<String>) -> Response {
    match state.controller.get_node(&name).await {
        Ok(node) => Json(node).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Inventory Endpoints
// ============================================================================

#[derive(Serialize)]
struct FreeNodesResponse {
    #[serde(rename = "resourcePoolId")]
    resource_pool_id: String,
    nodes: Vec<String>,
}

async fn list_resource_pools(State(state): State<ControlPlaneState>) -> Response {
    match state.controller.adaptor().get_resource_pools().await {
        Ok(pools) => Json(ResourceList::new("ResourcePoolList", pools)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_free_nodes(
    State(state): State<ControlPlaneState>,
    Path(id): Path<String>,
) -> Response {
    match state.controller.adaptor().free_nodes(&id).await {
        Ok(Some(nodes)) => Json(FreeNodesResponse {
            resource_pool_id: id,
            nodes,
        })
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(OperationStatus::failure(format!(
                "Resource pool '{}' not found",
                id
            ))),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_resources(State(state): State<ControlPlaneState>) -> Response {
    match state.controller.adaptor().get_resources().await {
        Ok(resources) => Json(ResourceList::new("ResourceList", resources)).into_response(),
        Err(e) => error_response(e),
    }
}
