//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use slicer_core::{
    Allocation, Clock, Container, SliceError, SliceInventoryRecord, SystemClock, Versioned,
    Workload, WorkloadRef,
};
use slicer_store::{InventoryRepository, MemoryInventory, MemoryWorkloads, WorkloadRepository};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub inventory: Arc<MemoryInventory>,
    pub workloads: Arc<MemoryWorkloads>,
    pub clock: Arc<dyn Clock>,
    /// Gate stamped on submitted workloads
    pub gate_name: String,
    /// Resource name prefix for submitted slice requests
    pub resource_prefix: String,
}

impl AppState {
    pub fn new(
        inventory: Arc<MemoryInventory>,
        workloads: Arc<MemoryWorkloads>,
        gate_name: &str,
    ) -> Self {
        Self {
            inventory,
            workloads,
            clock: Arc::new(SystemClock),
            gate_name: gate_name.to_string(),
            resource_prefix: "nvidia.com/mig-".to_string(),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/v1/inventory", get(list_inventory))
        .route("/api/v1/inventory/:node", get(get_inventory).put(put_inventory))
        .route("/api/v1/allocations", get(list_allocations))
        .route("/api/v1/workloads", get(list_workloads).post(create_workload))
        .route(
            "/api/v1/workloads/:namespace/:name",
            get(get_workload).put(update_workload).delete(delete_workload),
        )
        .route("/api/v1/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn error_response(e: SliceError) -> (StatusCode, String) {
    let status = match &e {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        SliceError::Conflict { .. } | SliceError::AlreadyExists(_) => StatusCode::CONFLICT,
        SliceError::Config(_) | SliceError::Quantity(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Inventory record with its store version
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub version: u64,
    #[serde(flatten)]
    pub record: SliceInventoryRecord,
}

impl From<Versioned<SliceInventoryRecord>> for RecordResponse {
    fn from(versioned: Versioned<SliceInventoryRecord>) -> Self {
        Self {
            version: versioned.version,
            record: versioned.value,
        }
    }
}

/// List all inventory records
async fn list_inventory(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<RecordResponse>>> {
    let records = state.inventory.list().await.map_err(error_response)?;
    Ok(Json(records.into_iter().map(RecordResponse::from).collect()))
}

/// Get one node's inventory record
async fn get_inventory(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
) -> ApiResult<Json<RecordResponse>> {
    let record = state.inventory.get(&node).await.map_err(error_response)?;
    Ok(Json(RecordResponse::from(record)))
}

/// Request to publish a node's inventory
#[derive(Debug, Deserialize)]
pub struct PutRecordRequest {
    /// Write only if the stored record is still at this version
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(flatten)]
    pub record: SliceInventoryRecord,
}

/// Create or replace a node's inventory record
async fn put_inventory(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
    Json(req): Json<PutRecordRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let mut record = req.record;
    record.node_name = node;

    let version = match req.expected_version {
        Some(expected) => state
            .inventory
            .update(record.clone(), expected)
            .await
            .map_err(error_response)?,
        None => state.inventory.put(record.clone()).await,
    };

    info!(
        node = %record.node_name,
        devices = record.devices.len(),
        allocations = record.allocations.len(),
        version,
        "Inventory record published"
    );
    Ok(Json(RecordResponse { version, record }))
}

/// List allocations across all nodes
async fn list_allocations(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Allocation>>> {
    let records = state.inventory.list().await.map_err(error_response)?;
    let allocations = records
        .into_iter()
        .flat_map(|r| r.value.allocations.into_values())
        .collect();
    Ok(Json(allocations))
}

/// Request to submit a workload
#[derive(Debug, Deserialize)]
pub struct CreateWorkloadRequest {
    pub namespace: String,
    pub name: String,
    /// Slice profile, e.g. `1g.5gb`; omitted for workloads without a slice
    #[serde(default)]
    pub profile: Option<String>,
    /// CPU request, e.g. `500m`
    #[serde(default)]
    pub cpu: Option<String>,
    /// Memory request, e.g. `1Gi`
    #[serde(default)]
    pub memory: Option<String>,
    /// Additional scheduling gates owned by other controllers
    #[serde(default)]
    pub extra_gates: Vec<String>,
}

impl CreateWorkloadRequest {
    fn into_workload(self, gate_name: &str, resource_prefix: &str) -> Workload {
        let mut workload = Workload::new(self.namespace, self.name.clone());
        let mut container = Container {
            name: self.name,
            ..Default::default()
        };

        if let Some(profile) = self.profile {
            workload.scheduling_gates.push(gate_name.to_string());
            container
                .resources
                .limits
                .insert(format!("{}{}", resource_prefix, profile), "1".to_string());
        }
        if let Some(cpu) = self.cpu {
            container.resources.requests.insert("cpu".to_string(), cpu);
        }
        if let Some(memory) = self.memory {
            container.resources.requests.insert("memory".to_string(), memory);
        }

        workload.scheduling_gates.extend(self.extra_gates);
        workload.containers.push(container);
        workload
    }
}

/// List workloads
async fn list_workloads(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Workload>>> {
    let workloads = state.workloads.list(None).await.map_err(error_response)?;
    Ok(Json(workloads))
}

/// Submit a new workload
async fn create_workload(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWorkloadRequest>,
) -> ApiResult<(StatusCode, Json<Workload>)> {
    info!(
        namespace = %req.namespace,
        name = %req.name,
        profile = ?req.profile,
        "Submitting workload"
    );

    let workload = req.into_workload(&state.gate_name, &state.resource_prefix);
    let created = state.workloads.create(workload).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get a workload
async fn get_workload(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Workload>> {
    let target = WorkloadRef::new(namespace, name);
    match state.workloads.get(&target).await.map_err(error_response)? {
        Some(workload) => Ok(Json(workload)),
        None => Err(error_response(SliceError::WorkloadNotFound(target.to_string()))),
    }
}

/// Replace a workload read at its `resource_version`
async fn update_workload(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut workload): Json<Workload>,
) -> ApiResult<Json<Workload>> {
    workload.namespace = namespace;
    workload.name = name;
    let updated = state.workloads.update(workload).await.map_err(error_response)?;
    Ok(Json(updated))
}

/// Request deletion of a workload
async fn delete_workload(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Response> {
    let target = WorkloadRef::new(namespace, name);
    info!(workload = %target, "Deleting workload");

    let pending = state
        .workloads
        .request_deletion(&target, state.clock.now())
        .await
        .map_err(error_response)?;

    Ok(match pending {
        Some(workload) => (StatusCode::ACCEPTED, Json(workload)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// System status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub nodes: usize,
    pub workloads: usize,
    /// Allocation count per status
    pub allocations: BTreeMap<String, usize>,
}

/// Get system status
async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let records = state.inventory.list().await.map_err(error_response)?;

    let mut allocations = BTreeMap::new();
    for allocation in records.iter().flat_map(|r| r.value.allocations.values()) {
        *allocations.entry(allocation.status.to_string()).or_insert(0) += 1;
    }

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        nodes: records.len(),
        workloads: state.workloads.len().await,
        allocations,
    }))
}
