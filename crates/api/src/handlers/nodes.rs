//! Node membership business logic handlers

use threshold_orchestrator::{NodeRegistry, OrchestrationError};
use threshold_types::{NodeId, NodeInfo, NodeStatus};
use tracing::info;

use crate::error::ApiError;

/// Register (or re-register) a node
pub fn register_node(registry: &NodeRegistry, id: u64, address: &str) -> Result<NodeInfo, ApiError> {
    // Round-robin selection addresses nodes as 1..=total_nodes
    if id == 0 {
        return Err(ApiError::BadRequest("Node IDs start at 1".to_string()));
    }

    let address = address.trim();
    if !(address.starts_with("http://") || address.starts_with("https://")) {
        return Err(ApiError::BadRequest(format!(
            "Node address must be an http(s) URL, got {:?}",
            address
        )));
    }

    let node_id = NodeId(id);
    registry.register_node(node_id, address.trim_end_matches('/'));
    info!("{} registered at {}", node_id, address);

    lookup(registry, node_id)
}

/// Apply a node's self-reported load and status
pub fn record_heartbeat(
    registry: &NodeRegistry,
    id: u64,
    load: f64,
    status: NodeStatus,
) -> Result<NodeInfo, ApiError> {
    let node_id = NodeId(id);
    if !registry.update_node_status(node_id, load, status) {
        // Tells the node to register again
        return Err(OrchestrationError::UnknownNode(node_id).into());
    }
    lookup(registry, node_id)
}

pub fn deregister_node(registry: &NodeRegistry, id: u64) -> Result<(), ApiError> {
    let node_id = NodeId(id);
    if registry.deregister_node(node_id) {
        info!("{} deregistered", node_id);
        Ok(())
    } else {
        Err(OrchestrationError::UnknownNode(node_id).into())
    }
}

pub fn get_node(registry: &NodeRegistry, id: u64) -> Result<NodeInfo, ApiError> {
    lookup(registry, NodeId(id))
}

/// All nodes ordered by ID
pub fn list_nodes(registry: &NodeRegistry) -> Vec<NodeInfo> {
    let mut nodes: Vec<NodeInfo> = registry.get_all_nodes().into_values().collect();
    nodes.sort_by_key(|n| n.id);
    nodes
}

fn lookup(registry: &NodeRegistry, node_id: NodeId) -> Result<NodeInfo, ApiError> {
    registry
        .get_node_info(node_id)
        .ok_or_else(|| OrchestrationError::UnknownNode(node_id).into())
}
