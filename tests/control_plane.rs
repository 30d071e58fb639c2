//! Integration tests for the control plane
//!
//! A controller over a file-backed inventory, driven through the REST API
//! with reconciles run by hand between requests.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use hwpool::adaptor::{Adaptor, NoLatency};
use hwpool::cluster::{
    create_control_plane_router, ControlPlaneState, MemoryResourceStore, NodePool,
    PoolController, RetryPolicy,
};
use hwpool::inventory::{
    AllocationLedger, FileInventoryStore, InventoryRecord, InventoryStore, NodeInfo,
    ResourceCatalog,
};

async fn file_inventory(dir: &Path) -> Arc<FileInventoryStore> {
    let catalog = ResourceCatalog::default()
        .with_node("P1", "n1", NodeInfo::new("10.16.231.1", "YWRtaW4=", "c2VjcmV0"))
        .with_node("P1", "n2", NodeInfo::new("10.16.231.2", "YWRtaW4=", "c2VjcmV0"))
        .with_node("P1", "n3", NodeInfo::new("10.16.231.3", "YWRtaW4=", "c2VjcmV0"));
    let record = InventoryRecord::new(&catalog, &AllocationLedger::default()).unwrap();

    let store = FileInventoryStore::new(dir.join("inventory.yaml"));
    store.initialize(&record).await.unwrap();
    Arc::new(store)
}

async fn setup(dir: &Path) -> (PoolController, Router, Arc<FileInventoryStore>) {
    let inventory = file_inventory(dir).await;
    let adaptor = Adaptor::new(inventory.clone(), Arc::new(MemoryResourceStore::new("hwpool")))
        .with_latency(NoLatency)
        .with_retry_policy(RetryPolicy::immediate(3));
    let controller = PoolController::new(Arc::new(adaptor));
    let app = create_control_plane_router(ControlPlaneState::new(controller.clone()));
    (controller, app, inventory)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Vec<u8>>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(bytes) => builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn reconcile_until_settled(controller: &PoolController, name: &str) -> usize {
    for invocation in 1..=10 {
        let result = controller.reconcile(name).await.unwrap();
        if !result.requeue() {
            return invocation;
        }
    }
    panic!("NodePool {} did not settle", name);
}

#[tokio::test]
async fn test_node_pool_lifecycle_over_api() {
    let dir = TempDir::new().unwrap();
    let (controller, app, inventory) = setup(dir.path()).await;

    let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 2, "dummy-sp-64g");
    let (status, body) = send(
        &app,
        "POST",
        "/v1/nodepools",
        Some(serde_json::to_vec(&pool).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);

    // create, n1, n2, complete
    assert_eq!(reconcile_until_settled(&controller, "np1").await, 4);

    let (status, body) = send(&app, "GET", "/v1/nodepools/np1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["properties"]["nodeNames"], serde_json::json!(["n1", "n2"]));

    let (_, body) = send(&app, "GET", "/v1/nodes", None).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let (_, body) = send(&app, "GET", "/v1/resourcepools/P1/free", None).await;
    assert_eq!(body["nodes"], serde_json::json!(["n3"]));

    let ledger = inventory.load().await.unwrap().ledger;
    assert_eq!(ledger.group_nodes("cloud-a", "g1"), ["n1", "n2"]);

    // Delete: finalizer releases the hardware, then the NodePool goes away
    let (status, _) = send(&app, "DELETE", "/v1/nodepools/np1", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    controller.reconcile("np1").await.unwrap();

    let (status, _) = send(&app, "GET", "/v1/nodepools/np1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/v1/nodes", None).await;
    assert!(body["items"].as_array().unwrap().is_empty());

    let ledger = inventory.load().await.unwrap().ledger;
    assert!(ledger.cloud("cloud-a").is_none());
}

#[tokio::test]
async fn test_spec_change_grows_group() {
    let dir = TempDir::new().unwrap();
    let (controller, app, inventory) = setup(dir.path()).await;

    controller
        .create_node_pool(NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw"))
        .await
        .unwrap();
    reconcile_until_settled(&controller, "np1").await;
    assert!(controller.get_node_pool("np1").await.unwrap().is_provisioned());

    let grown = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 2, "hw");
    let (status, _) = send(
        &app,
        "PUT",
        "/v1/nodepools/np1",
        Some(serde_json::to_vec(&grown.spec).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // SpecChanged, grow by n2, complete
    assert_eq!(reconcile_until_settled(&controller, "np1").await, 3);

    let pool = controller.get_node_pool("np1").await.unwrap();
    assert!(pool.is_provisioned());
    assert_eq!(pool.metadata.generation, 2);
    assert_eq!(pool.status.observed_generation, pool.metadata.generation);
    assert_eq!(pool.status.properties.node_names, ["n1", "n2"]);

    let ledger = inventory.load().await.unwrap().ledger;
    assert_eq!(ledger.group_nodes("cloud-a", "g1"), ["n1", "n2"]);
}

#[tokio::test]
async fn test_oversized_request_fails_creation() {
    let dir = TempDir::new().unwrap();
    let (controller, app, inventory) = setup(dir.path()).await;

    let pool = NodePool::new("np1", "cloud-a").with_group("g1", "P1", 5, "hw");
    let (status, _) = send(
        &app,
        "POST",
        "/v1/nodepools",
        Some(serde_json::to_vec(&pool).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    assert!(controller.reconcile("np1").await.is_err());

    let (_, body) = send(&app, "GET", "/v1/nodepools/np1", None).await;
    let condition = &body["status"]["conditions"][0];
    assert_eq!(condition["status"], "False");
    assert_eq!(condition["reason"], "InsufficientResources");

    let ledger = inventory.load().await.unwrap().ledger;
    assert!(ledger.clouds.is_empty());
}

#[tokio::test]
async fn test_inventory_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let (controller, _app, _) = setup(dir.path()).await;
        controller
            .create_node_pool(NodePool::new("np1", "cloud-a").with_group("g1", "P1", 1, "hw"))
            .await
            .unwrap();
        reconcile_until_settled(&controller, "np1").await;
    }

    // A new process sees the allocation of the previous one
    let inventory = FileInventoryStore::new(dir.path().join("inventory.yaml"));
    let snapshot = inventory.load().await.unwrap();
    assert_eq!(snapshot.ledger.group_nodes("cloud-a", "g1"), ["n1"]);

    let adaptor = Adaptor::new(Arc::new(inventory), Arc::new(MemoryResourceStore::new("hwpool")))
        .with_latency(NoLatency);
    assert_eq!(
        adaptor.free_nodes("P1").await.unwrap(),
        Some(vec!["n2".to_string(), "n3".to_string()])
    );
}
