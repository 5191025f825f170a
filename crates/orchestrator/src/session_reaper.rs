//! Session table retention.
//!
//! Terminal session records are kept for diagnostics and dropped once they
//! have been finished for longer than the retention window. Sessions that are
//! still in flight are never touched here; their own deadlines end them.

use crate::config::CoordinatorConfig;
use crate::coordinator::SessionCoordinator;
use crate::error::{OrchestrationError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Periodic sweeper for finished session records.
pub struct SessionReaper {
    coordinator: Arc<SessionCoordinator>,
    retention: Duration,
    sweep_interval: Duration,
    shutdown: Arc<RwLock<bool>>,
}

impl SessionReaper {
    /// Start the reaper in the background
    pub fn start(self: Arc<Self>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            info!(
                "Session reaper started (retention: {:?}, interval: {:?})",
                self.retention, self.sweep_interval
            );

            match self.run().await {
                Ok(()) => {
                    info!("Session reaper stopped normally");
                    Ok(())
                }
                Err(e) => {
                    error!("Session reaper error: {}", e);
                    Err(e)
                }
            }
        })
    }

    /// Main sweep loop
    async fn run(&self) -> Result<()> {
        let mut interval = interval(self.sweep_interval);

        loop {
            if *self.shutdown.read().await {
                info!("Shutdown signal received, stopping session reaper");
                return Ok(());
            }

            interval.tick().await;
            self.sweep();
        }
    }

    /// Prune once. Returns the number of records removed.
    pub fn sweep(&self) -> usize {
        let removed = self.coordinator.prune_finished(self.retention);
        if removed > 0 {
            info!("Pruned {} finished session records", removed);
        }
        debug!(
            "{} sessions still active",
            self.coordinator.active_session_count()
        );
        removed
    }

    /// Initiate graceful shutdown
    pub async fn shutdown(&self) {
        info!("Initiating session reaper shutdown");
        *self.shutdown.write().await = true;
    }
}

/// Builder for SessionReaper
pub struct SessionReaperBuilder {
    coordinator: Option<Arc<SessionCoordinator>>,
    config: Option<CoordinatorConfig>,
}

impl SessionReaperBuilder {
    pub fn new() -> Self {
        Self {
            coordinator: None,
            config: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator: Arc<SessionCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Arc<SessionReaper>> {
        let coordinator = self
            .coordinator
            .ok_or_else(|| OrchestrationError::Config("SessionCoordinator is required".to_string()))?;
        let config = self
            .config
            .unwrap_or_else(|| coordinator.config().clone());

        if config.reaper_interval.is_zero() {
            return Err(OrchestrationError::Config(
                "reaper_interval must be non-zero".to_string(),
            ));
        }

        Ok(Arc::new(SessionReaper {
            coordinator,
            retention: config.session_retention,
            sweep_interval: config.reaper_interval,
            shutdown: Arc::new(RwLock::new(false)),
        }))
    }
}

impl Default for SessionReaperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ActionNotifier;
    use crate::registry::NodeRegistry;
    use crate::result_bus::ResultBus;
    use crate::coordinator::SessionRequest;
    use async_trait::async_trait;
    use threshold_types::{ActionAck, ActionRequest, NodeId};

    struct AcceptAll;

    #[async_trait]
    impl ActionNotifier for AcceptAll {
        async fn notify_action(&self, request: &ActionRequest) -> Result<ActionAck> {
            Ok(ActionAck {
                session_id: request.session_id.clone(),
                accepted: true,
                message: None,
            })
        }
    }

    fn coordinator() -> Arc<SessionCoordinator> {
        let registry = NodeRegistry::new();
        registry.register_node(NodeId(1), "http://node1:8080");
        registry.register_node(NodeId(2), "http://node2:8080");
        Arc::new(SessionCoordinator::new(
            CoordinatorConfig::default(),
            registry,
            Arc::new(AcceptAll),
            ResultBus::new(),
        ))
    }

    #[test]
    fn test_builder_requires_coordinator() {
        assert!(SessionReaperBuilder::new().build().is_err());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_terminal_records() {
        let coordinator = coordinator();

        let cancelled = coordinator
            .start_session(SessionRequest::keygen("a", 2, 2))
            .await
            .unwrap();
        drop(cancelled);
        let _running = coordinator
            .start_session(SessionRequest::keygen("b", 2, 1))
            .await
            .unwrap();

        let config = CoordinatorConfig {
            session_retention: Duration::ZERO,
            ..CoordinatorConfig::default()
        };
        let reaper = SessionReaperBuilder::new()
            .with_coordinator(coordinator.clone())
            .with_config(config)
            .build()
            .unwrap();

        assert_eq!(reaper.sweep(), 1);
        assert_eq!(coordinator.list_sessions().len(), 1);
        assert_eq!(coordinator.active_session_count(), 1);
    }

    #[tokio::test]
    async fn test_retention_window_keeps_recent_records() {
        let coordinator = coordinator();
        drop(
            coordinator
                .start_session(SessionRequest::keygen("a", 2, 2))
                .await
                .unwrap(),
        );

        let reaper = SessionReaperBuilder::new()
            .with_coordinator(coordinator.clone())
            .build()
            .unwrap();

        assert_eq!(reaper.sweep(), 0);
        assert_eq!(coordinator.list_sessions().len(), 1);
    }
}
