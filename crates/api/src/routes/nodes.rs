//! Node membership endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use threshold_types::{NodeInfo, NodeStatus};

use crate::{
    context::{Permission, RequestContext},
    handlers::nodes,
    state::AppState,
    ApiResult,
};

/// Request to add a node to the cluster
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    pub id: u64,
    /// Base URL the node serves `/health` on
    pub address: String,
}

/// Periodic self-report from a node
#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Utilization in [0.0, 1.0]
    pub load: f64,
    #[serde(default = "default_status")]
    pub status: NodeStatus,
}

fn default_status() -> NodeStatus {
    NodeStatus::Online
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeListResponse {
    pub nodes: Vec<NodeInfo>,
    pub total: usize,
    pub online: usize,
}

/// POST /api/v1/nodes - Register a node
pub async fn register_node(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<RegisterNodeRequest>,
) -> ApiResult<(StatusCode, Json<NodeInfo>)> {
    ctx.require(Permission::NodesManage)?;
    let node = nodes::register_node(&state.registry, req.id, &req.address)?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// GET /api/v1/nodes - List every registered node
pub async fn list_nodes(State(state): State<AppState>) -> Json<NodeListResponse> {
    let nodes = nodes::list_nodes(&state.registry);
    let online = nodes.iter().filter(|n| n.is_online()).count();

    Json(NodeListResponse {
        total: nodes.len(),
        online,
        nodes,
    })
}

/// GET /api/v1/nodes/:id
pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<NodeInfo>> {
    Ok(Json(nodes::get_node(&state.registry, id)?))
}

/// DELETE /api/v1/nodes/:id - Remove a node from the cluster
pub async fn deregister_node(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::NodesManage)?;
    nodes::deregister_node(&state.registry, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/nodes/:id/heartbeat - Report load and status
///
/// Unknown nodes get a 404 and are expected to register again.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<NodeInfo>> {
    Ok(Json(nodes::record_heartbeat(
        &state.registry,
        id,
        req.load,
        req.status,
    )?))
}
