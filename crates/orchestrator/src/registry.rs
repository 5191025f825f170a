//! Node registry
//!
//! Authoritative in-memory view of cluster membership and load. All state sits
//! behind a single reader/writer lock; readers always receive copies so nothing
//! outside this module can mutate a node without taking the write lock.
//!
//! The registry stores `last_seen` but does not interpret it. Expiring stale
//! nodes is up to callers such as the [`HealthChecker`](crate::HealthChecker).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use threshold_types::{NodeId, NodeInfo, NodeStatus};

/// What a health probe concluded about a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeVerdict {
    /// Answered `/health`, optionally reporting its load
    Reachable { load: Option<f64> },
    /// Failed often enough to be taken out of the pool
    Unreachable,
}

/// Shared, clonable handle to the node table
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<HashMap<NodeId, NodeInfo>>>,
}

impl NodeRegistry {
    /// Create an empty, isolated registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a node. Load resets to 0.0, status to online.
    ///
    /// Re-registration keeps the in-flight task count so busy/idle
    /// bookkeeping for running sessions stays balanced.
    pub fn register_node(&self, id: NodeId, address: impl Into<String>) {
        let address = address.into();
        let mut nodes = self.nodes.write();

        let active_tasks = nodes.get(&id).map(|n| n.active_tasks).unwrap_or(0);
        let mut node = NodeInfo::new(id, address);
        node.active_tasks = active_tasks;

        debug!("Registered {} at {}", id, node.address);
        nodes.insert(id, node);
    }

    /// Remove a node. Returns whether it was present.
    pub fn deregister_node(&self, id: NodeId) -> bool {
        let removed = self.nodes.write().remove(&id).is_some();
        if removed {
            debug!("Deregistered {}", id);
        }
        removed
    }

    /// Update load, status and last-seen for a known node.
    ///
    /// Unknown nodes are left alone (no auto-create). Returns whether the
    /// update was applied.
    pub fn update_node_status(&self, id: NodeId, load: f64, status: NodeStatus) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(&id) {
            Some(node) => {
                node.load = sanitize_load(load);
                node.status = status;
                node.last_seen = Utc::now();
                true
            }
            None => {
                debug!("Ignoring status update for unknown {}", id);
                false
            }
        }
    }

    /// Apply a health probe result taken against a copy whose `last_seen`
    /// was `observed_last_seen`.
    ///
    /// Skipped when the node is gone, is in maintenance, or was updated after
    /// the copy was taken. A reachable probe without a load report keeps the
    /// load stored at write time. An unreachable probe never touches
    /// `last_seen`. Returns whether the update was applied.
    pub fn apply_probe(
        &self,
        id: NodeId,
        observed_last_seen: DateTime<Utc>,
        verdict: ProbeVerdict,
    ) -> bool {
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get_mut(&id) else {
            debug!("Ignoring probe for departed {}", id);
            return false;
        };

        if node.status == NodeStatus::Maintenance || node.last_seen > observed_last_seen {
            debug!("Discarding stale probe for {}", id);
            return false;
        }

        match verdict {
            ProbeVerdict::Reachable { load } => {
                if let Some(load) = load {
                    node.load = sanitize_load(load);
                }
                node.status = NodeStatus::Online;
                node.last_seen = Utc::now();
            }
            ProbeVerdict::Unreachable => node.status = NodeStatus::Offline,
        }
        true
    }

    /// Record that a node joined a ceremony
    pub fn mark_node_busy(&self, id: NodeId) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(&id) {
            Some(node) => {
                node.active_tasks = node.active_tasks.saturating_add(1);
                true
            }
            None => {
                debug!("Ignoring busy mark for unknown {}", id);
                false
            }
        }
    }

    /// Record that a node left a ceremony. Never drops below zero.
    pub fn mark_node_idle(&self, id: NodeId) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(&id) {
            Some(node) if node.active_tasks > 0 => {
                node.active_tasks -= 1;
                true
            }
            Some(_) => false,
            None => {
                debug!("Ignoring idle mark for unknown {}", id);
                false
            }
        }
    }

    /// Copy of a single node's current state
    pub fn get_node_info(&self, id: NodeId) -> Option<NodeInfo> {
        self.nodes.read().get(&id).cloned()
    }

    /// Deep-copy snapshot of the whole table
    pub fn get_all_nodes(&self) -> HashMap<NodeId, NodeInfo> {
        self.nodes.read().clone()
    }

    /// Snapshot of online nodes only, ordered by node ID
    pub fn online_nodes(&self) -> Vec<NodeInfo> {
        let mut online: Vec<NodeInfo> = self
            .nodes
            .read()
            .values()
            .filter(|n| n.is_online())
            .cloned()
            .collect();
        online.sort_by_key(|n| n.id);
        online
    }

    /// Number of nodes per status, for diagnostics
    pub fn counts_by_status(&self) -> HashMap<NodeStatus, usize> {
        let mut counts = HashMap::new();
        for node in self.nodes.read().values() {
            *counts.entry(node.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

/// Clamp self-reported load into [0.0, 1.0]; garbage reads as fully loaded
fn sanitize_load(load: f64) -> f64 {
    if load.is_finite() {
        load.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(ids: &[u64]) -> NodeRegistry {
        let registry = NodeRegistry::new();
        for id in ids {
            registry.register_node(NodeId(*id), format!("http://node{}:8080", id));
        }
        registry
    }

    #[test]
    fn test_register_defaults() {
        let registry = registry_with(&[1]);
        let node = registry.get_node_info(NodeId(1)).unwrap();

        assert_eq!(node.address, "http://node1:8080");
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.load, 0.0);
        assert_eq!(node.active_tasks, 0);
    }

    #[test]
    fn test_reregister_resets_load_and_status() {
        let registry = registry_with(&[1]);
        registry.update_node_status(NodeId(1), 0.8, NodeStatus::Maintenance);
        registry.mark_node_busy(NodeId(1));

        registry.register_node(NodeId(1), "http://node1-new:8080");
        let node = registry.get_node_info(NodeId(1)).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(node.address, "http://node1-new:8080");
        assert_eq!(node.load, 0.0);
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.active_tasks, 1);
    }

    #[test]
    fn test_update_unknown_node_is_noop() {
        let registry = registry_with(&[1]);
        assert!(!registry.update_node_status(NodeId(9), 0.5, NodeStatus::Offline));
        assert!(registry.get_node_info(NodeId(9)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_clamps_load() {
        let registry = registry_with(&[1, 2]);
        registry.update_node_status(NodeId(1), 1.7, NodeStatus::Online);
        registry.update_node_status(NodeId(2), f64::NAN, NodeStatus::Online);

        assert_eq!(registry.get_node_info(NodeId(1)).unwrap().load, 1.0);
        assert_eq!(registry.get_node_info(NodeId(2)).unwrap().load, 1.0);
    }

    #[test]
    fn test_idle_never_underflows() {
        let registry = registry_with(&[1]);
        assert!(!registry.mark_node_idle(NodeId(1)));
        assert_eq!(registry.get_node_info(NodeId(1)).unwrap().active_tasks, 0);

        registry.mark_node_busy(NodeId(1));
        assert!(registry.mark_node_idle(NodeId(1)));
        assert!(!registry.mark_node_idle(NodeId(1)));
        assert_eq!(registry.get_node_info(NodeId(1)).unwrap().active_tasks, 0);
    }

    #[test]
    fn test_bookkeeping_on_unknown_node_is_noop() {
        let registry = NodeRegistry::new();
        assert!(!registry.mark_node_busy(NodeId(4)));
        assert!(!registry.mark_node_idle(NodeId(4)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = registry_with(&[1]);
        let mut snapshot = registry.get_all_nodes();
        snapshot.get_mut(&NodeId(1)).unwrap().active_tasks = 42;

        let mut copy = registry.get_node_info(NodeId(1)).unwrap();
        copy.load = 0.9;

        let node = registry.get_node_info(NodeId(1)).unwrap();
        assert_eq!(node.active_tasks, 0);
        assert_eq!(node.load, 0.0);
    }

    #[test]
    fn test_online_nodes_and_counts() {
        let registry = registry_with(&[3, 1, 2]);
        registry.update_node_status(NodeId(2), 0.1, NodeStatus::Offline);

        let online: Vec<NodeId> = registry.online_nodes().iter().map(|n| n.id).collect();
        assert_eq!(online, vec![NodeId(1), NodeId(3)]);

        let counts = registry.counts_by_status();
        assert_eq!(counts.get(&NodeStatus::Online), Some(&2));
        assert_eq!(counts.get(&NodeStatus::Offline), Some(&1));
    }

    #[test]
    fn test_deregister_then_idle_is_noop() {
        let registry = registry_with(&[1]);
        registry.mark_node_busy(NodeId(1));
        assert!(registry.deregister_node(NodeId(1)));
        assert!(!registry.mark_node_idle(NodeId(1)));
        assert!(!registry.deregister_node(NodeId(1)));
    }

    #[test]
    fn test_apply_probe_on_current_copy() {
        let registry = registry_with(&[1, 2]);
        registry.update_node_status(NodeId(1), 0.6, NodeStatus::Offline);
        let seen_1 = registry.get_node_info(NodeId(1)).unwrap().last_seen;
        let seen_2 = registry.get_node_info(NodeId(2)).unwrap().last_seen;

        assert!(registry.apply_probe(NodeId(1), seen_1, ProbeVerdict::Reachable { load: None }));
        assert!(registry.apply_probe(NodeId(2), seen_2, ProbeVerdict::Unreachable));

        let node_1 = registry.get_node_info(NodeId(1)).unwrap();
        assert_eq!(node_1.status, NodeStatus::Online);
        assert_eq!(node_1.load, 0.6);

        let node_2 = registry.get_node_info(NodeId(2)).unwrap();
        assert_eq!(node_2.status, NodeStatus::Offline);
        assert_eq!(node_2.last_seen, seen_2);
    }

    #[test]
    fn test_apply_probe_skips_newer_updates_and_maintenance() {
        let registry = registry_with(&[1, 2, 3]);
        let stale = registry.get_node_info(NodeId(1)).unwrap().last_seen;

        std::thread::sleep(std::time::Duration::from_millis(2));
        registry.update_node_status(NodeId(1), 0.3, NodeStatus::Online);
        assert!(!registry.apply_probe(NodeId(1), stale, ProbeVerdict::Unreachable));
        assert_eq!(registry.get_node_info(NodeId(1)).unwrap().status, NodeStatus::Online);

        registry.update_node_status(NodeId(2), 0.8, NodeStatus::Maintenance);
        let seen = registry.get_node_info(NodeId(2)).unwrap().last_seen;
        assert!(!registry.apply_probe(NodeId(2), seen, ProbeVerdict::Reachable { load: Some(0.1) }));
        let node = registry.get_node_info(NodeId(2)).unwrap();
        assert_eq!(node.status, NodeStatus::Maintenance);
        assert_eq!(node.load, 0.8);

        registry.deregister_node(NodeId(3));
        assert!(!registry.apply_probe(NodeId(3), stale, ProbeVerdict::Unreachable));
        assert!(registry.get_node_info(NodeId(3)).is_none());
    }

    #[test]
    fn test_concurrent_busy_idle_balances() {
        let registry = registry_with(&[1]);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.mark_node_busy(NodeId(1));
                        registry.update_node_status(NodeId(1), 0.5, NodeStatus::Online);
                        registry.mark_node_idle(NodeId(1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.get_node_info(NodeId(1)).unwrap().active_tasks, 0);
    }
}
