//! Threshold Ceremony Coordination
//!
//! Decides which nodes take part in a distributed key-generation or signing
//! ceremony and drives each ceremony session from dispatch to a terminal
//! result. The cryptography itself runs on the nodes; this crate only tracks
//! membership, picks quorums and correlates results with sessions.
//!
//! # Components
//!
//! 1. **NodeRegistry**: membership, self-reported load and in-flight task counts
//! 2. **QuorumSelector**: pluggable policies for choosing `threshold` parties
//! 3. **SessionCoordinator**: `Created -> Dispatched -> {Completed | Failed}`
//! 4. **CeremonyClient**: keygen and signing entry points for callers
//!
//! Background services ([`HealthChecker`], [`SessionReaper`]) keep the registry
//! and session table fresh.

pub mod ceremony;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health_checker;
pub mod notifier;
pub mod registry;
pub mod result_bus;
pub mod selector;
pub mod session_reaper;

pub use ceremony::{CeremonyClient, KeygenOutcome, SignOutcome};
pub use config::{CoordinatorConfig, CoordinatorConfigBuilder};
pub use coordinator::{PendingSession, SessionCoordinator, SessionRecord, SessionRequest};
pub use error::{OrchestrationError, Result};
pub use health_checker::{HealthChecker, HealthCheckerBuilder, NodeHealth};
pub use notifier::{ActionNotifier, HttpActionNotifier};
pub use registry::{NodeRegistry, ProbeVerdict};
pub use result_bus::{ResultBus, ResultSubscription};
pub use selector::{QuorumSelector, SelectionPolicy};
pub use session_reaper::{SessionReaper, SessionReaperBuilder};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ceremony::CeremonyClient;
    pub use crate::config::CoordinatorConfig;
    pub use crate::coordinator::{SessionCoordinator, SessionRequest};
    pub use crate::error::{OrchestrationError, Result};
    pub use crate::registry::NodeRegistry;
    pub use crate::result_bus::ResultBus;
    pub use crate::selector::SelectionPolicy;
}
