//! Configuration for the session coordinator and its background services

use crate::error::{OrchestrationError, Result};
use crate::selector::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the session coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Quorum selection policy, fixed for the lifetime of the selector
    pub selection_policy: SelectionPolicy,

    /// Budget for the single start-notification attempt
    pub dispatch_timeout: Duration,

    /// Default deadline for awaiting a ceremony result
    pub result_timeout: Duration,

    /// Interval between node health probes
    pub health_check_interval: Duration,

    /// Timeout for a single health probe
    pub health_check_timeout: Duration,

    /// Consecutive failed probes before a node is marked offline
    pub max_consecutive_failures: u32,

    /// How long terminal session records are kept for diagnostics
    pub session_retention: Duration,

    /// Interval between session table sweeps
    pub reaper_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            selection_policy: SelectionPolicy::LoadBased,
            dispatch_timeout: Duration::from_secs(30),
            result_timeout: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(15),
            health_check_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
            session_retention: Duration::from_secs(600),
            reaper_interval: Duration::from_secs(30),
        }
    }
}

impl CoordinatorConfig {
    /// Reject values that would make sessions or probes fail immediately
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("dispatch_timeout", self.dispatch_timeout),
            ("result_timeout", self.result_timeout),
            ("health_check_interval", self.health_check_interval),
            ("health_check_timeout", self.health_check_timeout),
            ("reaper_interval", self.reaper_interval),
        ];

        for (name, value) in durations {
            if value.is_zero() {
                return Err(OrchestrationError::Config(format!("{} must be non-zero", name)));
            }
        }

        if self.max_consecutive_failures == 0 {
            return Err(OrchestrationError::Config(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for CoordinatorConfig
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
        }
    }

    pub fn selection_policy(mut self, policy: SelectionPolicy) -> Self {
        self.config.selection_policy = policy;
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch_timeout = timeout;
        self
    }

    pub fn result_timeout(mut self, timeout: Duration) -> Self {
        self.config.result_timeout = timeout;
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_check_timeout = timeout;
        self
    }

    pub fn max_consecutive_failures(mut self, failures: u32) -> Self {
        self.config.max_consecutive_failures = failures;
        self
    }

    pub fn session_retention(mut self, retention: Duration) -> Self {
        self.config.session_retention = retention;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.config.reaper_interval = interval;
        self
    }

    pub fn build(self) -> Result<CoordinatorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
