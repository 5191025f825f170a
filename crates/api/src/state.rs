//! Shared application state for the API server

use std::sync::Arc;
use threshold_orchestrator::{CeremonyClient, NodeRegistry, ResultBus, SessionCoordinator};

use crate::usage::UsageRecorder;

/// Quorum shape used when a ceremony request does not name one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CeremonyDefaults {
    pub total_nodes: u32,
    pub threshold: u32,
}

impl Default for CeremonyDefaults {
    fn default() -> Self {
        Self {
            total_nodes: 3,
            threshold: 2,
        }
    }
}

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    /// Cluster membership and load
    pub registry: NodeRegistry,
    /// Session lifecycle and diagnostics
    pub coordinator: Arc<SessionCoordinator>,
    /// Keygen and signing entry points
    pub ceremonies: CeremonyClient,
    /// Where nodes publish finished ceremonies
    pub results: ResultBus,
    pub usage: UsageRecorder,
    pub defaults: CeremonyDefaults,
}

impl AppState {
    /// Create application state around a coordinator
    pub fn new(coordinator: Arc<SessionCoordinator>, defaults: CeremonyDefaults) -> Self {
        Self {
            registry: coordinator.registry().clone(),
            results: coordinator.results().clone(),
            ceremonies: CeremonyClient::new(Arc::clone(&coordinator)),
            coordinator,
            usage: UsageRecorder::new(),
            defaults,
        }
    }
}
