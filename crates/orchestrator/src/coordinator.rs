//! Session coordination
//!
//! Drives one ceremony through `Created -> Dispatched -> {Completed | Failed}`:
//!
//! 1. Mint a session ID and record the session as `Created`
//! 2. Ask the [`QuorumSelector`] for parties (failure: `Failed`, no network call)
//! 3. Mark parties busy and subscribe to the session's result topic
//! 4. Send one start notification, bounded by `dispatch_timeout`
//! 5. Hand back a [`PendingSession`] the caller awaits or cancels
//!
//! Busy/idle bookkeeping is owned by a lease scoped to the session. Whatever
//! ends the session (result, timeout, cancellation, dispatch error, or the
//! caller's task unwinding) the lease marks every party idle exactly once.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use threshold_types::{
    ActionRequest, CeremonyAction, CeremonyResult, NodeId, SessionId, SessionState,
};

use crate::config::CoordinatorConfig;
use crate::error::{OrchestrationError, Result};
use crate::notifier::ActionNotifier;
use crate::registry::NodeRegistry;
use crate::result_bus::{ResultBus, ResultSubscription};
use crate::selector::QuorumSelector;

/// Parameters of a ceremony to start
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub action: CeremonyAction,
    /// Size of the conceptual node pool the quorum is drawn from
    pub total_nodes: u32,
    /// Number of parties selected for the ceremony
    pub threshold: u32,
    pub identity: Option<String>,
    pub msg_hash: Option<Vec<u8>>,
    pub share_data: Option<Vec<u8>>,
}

impl SessionRequest {
    /// Key generation for `identity`
    pub fn keygen(identity: impl Into<String>, total_nodes: u32, threshold: u32) -> Self {
        Self {
            action: CeremonyAction::InitKeygen,
            total_nodes,
            threshold,
            identity: Some(identity.into()),
            msg_hash: None,
            share_data: None,
        }
    }

    /// Signing of `msg_hash` with a previously generated share
    pub fn sign(msg_hash: Vec<u8>, share_data: Vec<u8>, total_nodes: u32, threshold: u32) -> Self {
        Self {
            action: CeremonyAction::InitSign,
            total_nodes,
            threshold,
            identity: None,
            msg_hash: Some(msg_hash),
            share_data: Some(share_data),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(OrchestrationError::InvalidThreshold(
                "threshold must be at least 1".to_string(),
            ));
        }

        if self.threshold > self.total_nodes {
            return Err(OrchestrationError::InvalidThreshold(format!(
                "threshold {} cannot exceed total_nodes {}",
                self.threshold, self.total_nodes
            )));
        }

        if self.action == CeremonyAction::InitSign {
            if self.msg_hash.as_ref().map_or(true, |h| h.is_empty()) {
                return Err(OrchestrationError::InvalidRequest(
                    "signing requires a message digest".to_string(),
                ));
            }
            if self.share_data.as_ref().map_or(true, |s| s.is_empty()) {
                return Err(OrchestrationError::InvalidRequest(
                    "signing requires the caller's key share".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Diagnostic record of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub action: CeremonyAction,
    pub total_nodes: u32,
    pub threshold: u32,
    pub parties: Vec<NodeId>,
    pub state: SessionState,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Session records keyed by ID
#[derive(Debug, Clone, Default)]
struct SessionTable {
    records: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

impl SessionTable {
    fn create(&self, session_id: &SessionId, request: &SessionRequest) {
        let record = SessionRecord {
            session_id: session_id.clone(),
            action: request.action,
            total_nodes: request.total_nodes,
            threshold: request.threshold,
            parties: Vec::new(),
            state: SessionState::Created,
            error: None,
            started_at: Utc::now(),
            dispatched_at: None,
            finished_at: None,
        };
        self.records.write().insert(session_id.clone(), record);
    }

    fn mark_dispatched(&self, session_id: &SessionId, parties: &[NodeId]) {
        if let Some(record) = self.records.write().get_mut(session_id) {
            if record.state == SessionState::Created {
                record.state = SessionState::Dispatched;
                record.parties = parties.to_vec();
                record.dispatched_at = Some(Utc::now());
            }
        }
    }

    /// Move to a terminal state; terminal records are never touched again
    fn finish(&self, session_id: &SessionId, state: SessionState, error: Option<String>) {
        if let Some(record) = self.records.write().get_mut(session_id) {
            if !record.state.is_terminal() {
                record.state = state;
                record.error = error;
                record.finished_at = Some(Utc::now());
            }
        }
    }

    fn get(&self, session_id: &SessionId) -> Option<SessionRecord> {
        self.records.read().get(session_id).cloned()
    }

    fn list(&self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    fn active_count(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| !r.state.is_terminal())
            .count()
    }

    fn prune_finished(&self, older_than: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(older_than) {
            Ok(age) => Utc::now() - age,
            Err(_) => return 0,
        };

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| match r.finished_at {
            Some(finished) if r.state.is_terminal() => finished > cutoff,
            _ => true,
        });
        before - records.len()
    }
}

/// Busy marks held on behalf of one session
struct SessionLease {
    session_id: SessionId,
    parties: Vec<NodeId>,
    /// Parties whose busy mark was applied; only these are released
    marked: Vec<NodeId>,
    registry: NodeRegistry,
    sessions: SessionTable,
    released: bool,
}

impl SessionLease {
    fn acquire(
        registry: NodeRegistry,
        sessions: SessionTable,
        session_id: SessionId,
        parties: Vec<NodeId>,
    ) -> Self {
        let marked = parties
            .iter()
            .copied()
            .filter(|id| registry.mark_node_busy(*id))
            .collect();

        Self {
            session_id,
            parties,
            marked,
            registry,
            sessions,
            released: false,
        }
    }

    fn complete(mut self) {
        self.release(SessionState::Completed, None);
    }

    fn fail(mut self, err: &OrchestrationError) {
        self.release(SessionState::Failed, Some(err.to_string()));
    }

    fn release(&mut self, state: SessionState, error: Option<String>) {
        if self.released {
            return;
        }
        self.released = true;

        for id in &self.marked {
            self.registry.mark_node_idle(*id);
        }

        match &error {
            None => info!("Session {} {}", self.session_id, state),
            Some(reason) => warn!("Session {} {}: {}", self.session_id, state, reason),
        }
        self.sessions.finish(&self.session_id, state, error);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.released {
            let reason = OrchestrationError::Cancelled(self.session_id.clone()).to_string();
            self.release(SessionState::Failed, Some(reason));
        }
    }
}

/// A dispatched session awaiting its result.
///
/// Dropping it without waiting cancels the local wait: the topic is torn down,
/// parties are marked idle and the session is recorded as failed. Nodes that
/// already accepted the ceremony are not told.
pub struct PendingSession {
    action: CeremonyAction,
    subscription: ResultSubscription,
    lease: SessionLease,
}

impl PendingSession {
    pub fn session_id(&self) -> &SessionId {
        &self.lease.session_id
    }

    pub fn parties(&self) -> &[NodeId] {
        &self.lease.parties
    }

    pub fn action(&self) -> CeremonyAction {
        self.action
    }

    /// Wait up to `deadline` for the ceremony result
    pub async fn wait(self, deadline: Duration) -> Result<CeremonyResult> {
        self.wait_or_cancel(deadline, std::future::pending::<()>()).await
    }

    /// Wait up to `deadline`, giving up early when `cancel` resolves
    pub async fn wait_or_cancel<F>(self, deadline: Duration, cancel: F) -> Result<CeremonyResult>
    where
        F: Future<Output = ()>,
    {
        let PendingSession {
            action,
            subscription,
            lease,
        } = self;
        let session_id = lease.session_id.clone();

        let outcome = tokio::select! {
            received = tokio::time::timeout(deadline, subscription.recv()) => match received {
                Ok(Ok(result)) if result.matches(action) => Ok(result),
                Ok(Ok(_)) => Err(OrchestrationError::Internal(format!(
                    "Session {} received a result for a different ceremony kind",
                    session_id
                ))),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(OrchestrationError::Timeout(session_id.clone())),
            },
            _ = cancel => Err(OrchestrationError::Cancelled(session_id.clone())),
        };

        drop(subscription);
        match &outcome {
            Ok(_) => lease.complete(),
            Err(e) => lease.fail(e),
        }
        outcome
    }
}

/// Turns ceremony requests into dispatched, trackable sessions
pub struct SessionCoordinator {
    config: CoordinatorConfig,
    registry: NodeRegistry,
    selector: QuorumSelector,
    notifier: Arc<dyn ActionNotifier>,
    results: ResultBus,
    sessions: SessionTable,
}

impl SessionCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        registry: NodeRegistry,
        notifier: Arc<dyn ActionNotifier>,
        results: ResultBus,
    ) -> Self {
        let selector = QuorumSelector::new(registry.clone(), config.selection_policy);
        Self {
            config,
            registry,
            selector,
            notifier,
            results,
            sessions: SessionTable::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn results(&self) -> &ResultBus {
        &self.results
    }

    /// Select parties and dispatch the start notification
    pub async fn start_session(&self, request: SessionRequest) -> Result<PendingSession> {
        request.validate()?;

        let session_id = SessionId::generate();
        self.sessions.create(&session_id, &request);
        info!(
            "Session {} created: action={} threshold={}/{} policy={}",
            session_id,
            request.action,
            request.threshold,
            request.total_nodes,
            self.selector.policy()
        );

        let parties = match self.selector.select(
            request.total_nodes as usize,
            request.threshold as usize,
            &session_id,
        ) {
            Ok(parties) => parties,
            Err(e) => {
                warn!("Session {} selection failed: {}", session_id, e);
                self.sessions
                    .finish(&session_id, SessionState::Failed, Some(e.to_string()));
                return Err(e);
            }
        };

        let subscription = match self.results.subscribe(&session_id) {
            Ok(subscription) => subscription,
            Err(e) => {
                self.sessions
                    .finish(&session_id, SessionState::Failed, Some(e.to_string()));
                return Err(e);
            }
        };

        let lease = SessionLease::acquire(
            self.registry.clone(),
            self.sessions.clone(),
            session_id.clone(),
            parties.clone(),
        );

        let action_request = ActionRequest {
            session_id: session_id.clone(),
            parties: parties.clone(),
            threshold: request.threshold,
            action: request.action,
            identity: request.identity,
            msg_hash: request.msg_hash,
            share_data: request.share_data,
        };

        if let Err(e) = self.dispatch(&action_request).await {
            lease.fail(&e);
            return Err(e);
        }

        self.sessions.mark_dispatched(&session_id, &parties);
        info!(
            "Session {} dispatched to {:?}",
            session_id,
            parties.iter().map(|p| p.0).collect::<Vec<_>>()
        );

        Ok(PendingSession {
            action: request.action,
            subscription,
            lease,
        })
    }

    /// Start a session and wait for its result
    pub async fn run_session(
        &self,
        request: SessionRequest,
        deadline: Option<Duration>,
    ) -> Result<(SessionId, Vec<NodeId>, CeremonyResult)> {
        let pending = self.start_session(request).await?;
        let session_id = pending.session_id().clone();
        let parties = pending.parties().to_vec();
        let result = pending
            .wait(deadline.unwrap_or(self.config.result_timeout))
            .await?;
        Ok((session_id, parties, result))
    }

    /// Single notification attempt bounded by the dispatch budget
    async fn dispatch(&self, request: &ActionRequest) -> Result<()> {
        let sent = tokio::time::timeout(
            self.config.dispatch_timeout,
            self.notifier.notify_action(request),
        )
        .await;

        match sent {
            Ok(Ok(ack)) if ack.accepted => {
                debug!("Session {} acknowledged", request.session_id);
                Ok(())
            }
            Ok(Ok(ack)) => Err(OrchestrationError::DispatchFailed(
                ack.message
                    .unwrap_or_else(|| "notification rejected".to_string()),
            )),
            Ok(Err(OrchestrationError::DispatchFailed(reason))) => {
                Err(OrchestrationError::DispatchFailed(reason))
            }
            Ok(Err(other)) => Err(OrchestrationError::DispatchFailed(other.to_string())),
            Err(_) => Err(OrchestrationError::DispatchFailed(format!(
                "no acknowledgement within {:?}",
                self.config.dispatch_timeout
            ))),
        }
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| OrchestrationError::SessionNotFound(session_id.clone()))
    }

    /// All known sessions, newest first
    pub fn list_sessions(&self) -> Vec<SessionRecord> {
        self.sessions.list()
    }

    /// Sessions not yet in a terminal state
    pub fn active_session_count(&self) -> usize {
        self.sessions.active_count()
    }

    /// Drop terminal records that finished more than `older_than` ago
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        self.sessions.prune_finished(older_than)
    }
}
