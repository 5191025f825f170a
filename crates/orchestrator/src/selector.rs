//! Quorum selection
//!
//! Picks the `threshold` parties for a session from a registry snapshot. The
//! registry lock is only held while the snapshot is copied; ordering and
//! sampling run on the copy so selection never stalls heartbeat ingestion.
//!
//! Policies:
//! - `RoundRobin`: pure function of `(total_nodes, threshold, session_id)`;
//!   ignores load and health of the chosen IDs and assumes IDs are densely
//!   packed `1..=total_nodes`.
//! - `LoadBased`: lowest self-reported load first.
//! - `AvailabilityBased`: fewest in-flight ceremonies first.
//! - `Random`: uniform sampling without replacement.
//!
//! Every policy first requires at least `threshold` online nodes. Ties in the
//! sorted policies are broken by ascending node ID.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use threshold_types::{NodeId, NodeInfo, SessionId};

use crate::error::{OrchestrationError, Result};
use crate::registry::NodeRegistry;

/// Quorum selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    RoundRobin,
    LoadBased,
    AvailabilityBased,
    Random,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::RoundRobin => write!(f, "round_robin"),
            SelectionPolicy::LoadBased => write!(f, "load_based"),
            SelectionPolicy::AvailabilityBased => write!(f, "availability_based"),
            SelectionPolicy::Random => write!(f, "random"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(SelectionPolicy::RoundRobin),
            "load_based" => Ok(SelectionPolicy::LoadBased),
            "availability_based" => Ok(SelectionPolicy::AvailabilityBased),
            "random" => Ok(SelectionPolicy::Random),
            other => Err(OrchestrationError::Config(format!(
                "Unknown selection policy: {}",
                other
            ))),
        }
    }
}

/// Chooses session participants under a fixed policy
#[derive(Debug, Clone)]
pub struct QuorumSelector {
    registry: NodeRegistry,
    policy: SelectionPolicy,
}

impl QuorumSelector {
    pub fn new(registry: NodeRegistry, policy: SelectionPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Select `threshold` distinct parties for `session_id`
    pub fn select(
        &self,
        total_nodes: usize,
        threshold: usize,
        session_id: &SessionId,
    ) -> Result<Vec<NodeId>> {
        self.select_with_rng(total_nodes, threshold, session_id, &mut rand::thread_rng())
    }

    /// Same as [`select`](Self::select) with a caller-provided RNG for `Random`
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        total_nodes: usize,
        threshold: usize,
        session_id: &SessionId,
        rng: &mut R,
    ) -> Result<Vec<NodeId>> {
        let snapshot = self.registry.get_all_nodes();
        select_from_snapshot(self.policy, &snapshot, total_nodes, threshold, session_id, rng)
    }
}

/// Apply `policy` to a registry snapshot
pub fn select_from_snapshot<R: Rng + ?Sized>(
    policy: SelectionPolicy,
    nodes: &HashMap<NodeId, NodeInfo>,
    total_nodes: usize,
    threshold: usize,
    session_id: &SessionId,
    rng: &mut R,
) -> Result<Vec<NodeId>> {
    if threshold == 0 {
        return Err(OrchestrationError::InvalidThreshold(
            "threshold must be at least 1".to_string(),
        ));
    }

    let mut online: Vec<&NodeInfo> = nodes.values().filter(|n| n.is_online()).collect();
    online.sort_by_key(|n| n.id);

    if online.len() < threshold {
        return Err(OrchestrationError::InsufficientNodes {
            available: online.len(),
            required: threshold,
        });
    }

    let parties = match policy {
        SelectionPolicy::RoundRobin => round_robin(total_nodes, threshold, session_id)?,
        SelectionPolicy::LoadBased => {
            online.sort_by(|a, b| a.load.total_cmp(&b.load).then(a.id.cmp(&b.id)));
            take_ids(&online, threshold)
        }
        SelectionPolicy::AvailabilityBased => {
            online.sort_by_key(|n| (n.active_tasks, n.id));
            take_ids(&online, threshold)
        }
        SelectionPolicy::Random => sample_without_replacement(online, threshold, rng),
    };

    Ok(parties)
}

/// Consecutive IDs starting at an offset derived from the session digest
fn round_robin(total_nodes: usize, threshold: usize, session_id: &SessionId) -> Result<Vec<NodeId>> {
    if total_nodes == 0 || threshold > total_nodes {
        return Err(OrchestrationError::InvalidThreshold(format!(
            "threshold {} must be within total_nodes {}",
            threshold, total_nodes
        )));
    }

    let digest = Sha256::digest(session_id.as_str().as_bytes());
    let offset = digest[0] as usize % total_nodes;

    Ok((0..threshold)
        .map(|i| NodeId(((offset + i) % total_nodes + 1) as u64))
        .collect())
}

fn take_ids(sorted: &[&NodeInfo], threshold: usize) -> Vec<NodeId> {
    sorted.iter().take(threshold).map(|n| n.id).collect()
}

fn sample_without_replacement<R: Rng + ?Sized>(
    mut candidates: Vec<&NodeInfo>,
    threshold: usize,
    rng: &mut R,
) -> Vec<NodeId> {
    let mut parties = Vec::with_capacity(threshold);
    while parties.len() < threshold && !candidates.is_empty() {
        let index = rng.gen_range(0..candidates.len());
        parties.push(candidates.remove(index).id);
    }
    parties
}
