//! Background health checker for registered nodes
//!
//! This module spawns a background task that periodically:
//! 1. Probes `GET {address}/health` on every registered node not in maintenance
//! 2. Feeds the outcome back into the [`NodeRegistry`] (load, status, last seen)
//! 3. Marks nodes offline after repeated consecutive failures
//!
//! A successful probe may carry a JSON body `{"load": <f64>}`; when it does the
//! reported load replaces the stored one. Probe results are written back only
//! if the node was not touched while the probe was in flight.

use crate::config::CoordinatorConfig;
use crate::error::{OrchestrationError, Result};
use crate::registry::{NodeRegistry, ProbeVerdict};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use threshold_types::{NodeId, NodeInfo, NodeStatus};

/// Probe history for one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub node_id: NodeId,
    pub endpoint: String,
    pub is_healthy: bool,
    pub latency_ms: Option<u64>,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Deserialize)]
struct HealthReport {
    load: Option<f64>,
}

enum ProbeOutcome {
    Healthy { latency_ms: u64, load: Option<f64> },
    Failed,
}

/// Background health checker driving registry status
pub struct HealthChecker {
    registry: NodeRegistry,
    client: reqwest::Client,
    interval: Duration,
    max_consecutive_failures: u32,
    health_state: Arc<RwLock<HashMap<NodeId, NodeHealth>>>,
    shutdown: Arc<RwLock<bool>>,
}

impl HealthChecker {
    /// Get health status for all probed nodes
    pub async fn get_health_status(&self) -> HashMap<NodeId, NodeHealth> {
        self.health_state.read().await.clone()
    }

    /// Check if a specific node passed its last probe
    pub async fn is_node_healthy(&self, node_id: NodeId) -> bool {
        self.health_state
            .read()
            .await
            .get(&node_id)
            .map(|h| h.is_healthy)
            .unwrap_or(false)
    }

    /// Start the health checker in the background
    pub fn start(self: Arc<Self>) -> JoinHandle<Result<()>> {
        info!(
            "Starting health checker for {} nodes (interval: {:?})",
            self.registry.len(),
            self.interval
        );

        tokio::spawn(async move {
            match self.run().await {
                Ok(()) => {
                    info!("Health checker stopped normally");
                    Ok(())
                }
                Err(e) => {
                    warn!("Health checker error: {}", e);
                    Err(e)
                }
            }
        })
    }

    /// Main health checking loop
    async fn run(&self) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            if *self.shutdown.read().await {
                info!("Shutdown signal received, stopping health checker");
                return Ok(());
            }

            interval.tick().await;
            self.check_once().await;
        }
    }

    /// Run a single probe round over the current registry contents
    pub async fn check_once(&self) {
        let targets: Vec<NodeInfo> = self
            .registry
            .get_all_nodes()
            .into_values()
            .filter(|n| n.status != NodeStatus::Maintenance)
            .collect();

        if targets.is_empty() {
            debug!("No probe targets, skipping health check");
            self.forget_departed().await;
            return;
        }

        debug!("Running health check for {} nodes", targets.len());

        let checks: Vec<_> = targets
            .iter()
            .map(|node| {
                let client = self.client.clone();
                let node_id = node.id;
                let health_url = format!("{}/health", node.address.trim_end_matches('/'));
                async move { (node_id, probe(&client, node_id, &health_url).await) }
            })
            .collect();

        let results = futures::future::join_all(checks).await;

        let mut health_state = self.health_state.write().await;

        for (node_id, outcome) in results {
            let Some(node) = targets.iter().find(|n| n.id == node_id) else {
                continue;
            };

            let previous_failures = health_state
                .get(&node_id)
                .map(|h| h.consecutive_failures)
                .unwrap_or(0);

            let health = match outcome {
                ProbeOutcome::Healthy { latency_ms, load } => {
                    let applied = self.registry.apply_probe(
                        node_id,
                        node.last_seen,
                        ProbeVerdict::Reachable { load },
                    );
                    if !applied {
                        debug!("{} changed during probe, keeping its newer state", node_id);
                    } else if node.status == NodeStatus::Offline {
                        info!("{} is reachable again, marking online", node_id);
                    } else {
                        debug!("{} healthy (latency: {}ms)", node_id, latency_ms);
                    }

                    NodeHealth {
                        node_id,
                        endpoint: node.address.clone(),
                        is_healthy: true,
                        latency_ms: Some(latency_ms),
                        last_check: chrono::Utc::now(),
                        consecutive_failures: 0,
                    }
                }
                ProbeOutcome::Failed => {
                    let consecutive_failures = previous_failures.saturating_add(1);
                    if consecutive_failures >= self.max_consecutive_failures
                        && node.status != NodeStatus::Offline
                        && self.registry.apply_probe(
                            node_id,
                            node.last_seen,
                            ProbeVerdict::Unreachable,
                        )
                    {
                        warn!(
                            "{} marked offline after {} consecutive failures",
                            node_id, consecutive_failures
                        );
                    }

                    NodeHealth {
                        node_id,
                        endpoint: node.address.clone(),
                        is_healthy: false,
                        latency_ms: None,
                        last_check: chrono::Utc::now(),
                        consecutive_failures,
                    }
                }
            };

            health_state.insert(node_id, health);
        }
        drop(health_state);

        self.forget_departed().await;
    }

    /// Drop probe history for nodes that left the registry
    async fn forget_departed(&self) {
        let known = self.registry.get_all_nodes();
        self.health_state
            .write()
            .await
            .retain(|id, _| known.contains_key(id));
    }

    /// Initiate graceful shutdown
    pub async fn shutdown(&self) {
        info!("Initiating health checker shutdown");
        *self.shutdown.write().await = true;
    }
}

async fn probe(client: &reqwest::Client, node_id: NodeId, health_url: &str) -> ProbeOutcome {
    let start = Instant::now();

    match client.get(health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let latency_ms = start.elapsed().as_millis() as u64;
            // Body is optional; a node without load reporting is still healthy
            let load = resp.json::<HealthReport>().await.ok().and_then(|r| r.load);
            ProbeOutcome::Healthy { latency_ms, load }
        }
        Ok(resp) => {
            warn!("{} health check failed: HTTP {}", node_id, resp.status());
            ProbeOutcome::Failed
        }
        Err(e) => {
            warn!("{} health check failed: {}", node_id, e);
            ProbeOutcome::Failed
        }
    }
}

/// Builder for HealthChecker
pub struct HealthCheckerBuilder {
    registry: Option<NodeRegistry>,
    interval: Duration,
    timeout: Duration,
    max_consecutive_failures: u32,
}

impl HealthCheckerBuilder {
    pub fn new() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            registry: None,
            interval: defaults.health_check_interval,
            timeout: defaults.health_check_timeout,
            max_consecutive_failures: defaults.max_consecutive_failures,
        }
    }

    pub fn with_registry(mut self, registry: NodeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Take interval, probe timeout and failure limit from `config`
    pub fn with_config(mut self, config: &CoordinatorConfig) -> Self {
        self.interval = config.health_check_interval;
        self.timeout = config.health_check_timeout;
        self.max_consecutive_failures = config.max_consecutive_failures;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures;
        self
    }

    pub fn build(self) -> Result<Arc<HealthChecker>> {
        let registry = self
            .registry
            .ok_or_else(|| OrchestrationError::Config("NodeRegistry is required".to_string()))?;

        if self.interval.is_zero() || self.timeout.is_zero() {
            return Err(OrchestrationError::Config(
                "health check interval and timeout must be non-zero".to_string(),
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err(OrchestrationError::Config(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| OrchestrationError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Arc::new(HealthChecker {
            registry,
            client,
            interval: self.interval,
            max_consecutive_failures: self.max_consecutive_failures,
            health_state: Arc::new(RwLock::new(HashMap::new())),
            shutdown: Arc::new(RwLock::new(false)),
        }))
    }
}

impl Default for HealthCheckerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
