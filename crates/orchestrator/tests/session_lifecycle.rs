//! End-to-end session tests against in-memory node fleets

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use threshold_orchestrator::{
    ActionNotifier, CeremonyClient, CoordinatorConfig, NodeRegistry, OrchestrationError, Result,
    ResultBus, SelectionPolicy, SessionCoordinator, SessionRequest,
};
use threshold_types::{
    ActionAck, ActionRequest, CeremonyAction, CeremonyResult, NodeId, NodeStatus, SessionState,
};

/// Fleet that finishes every accepted ceremony after `delay`
struct SimulatedFleet {
    bus: ResultBus,
    delay: Duration,
    seen: Mutex<Vec<ActionRequest>>,
}

#[async_trait]
impl ActionNotifier for SimulatedFleet {
    async fn notify_action(&self, request: &ActionRequest) -> Result<ActionAck> {
        self.seen.lock().push(request.clone());

        let bus = self.bus.clone();
        let delay = self.delay;
        let session_id = request.session_id.clone();
        let result = match request.action {
            CeremonyAction::InitKeygen => CeremonyResult::Keygen {
                share_data: "ZW5jcnlwdGVkLXNoYXJl".to_string(),
                public_address: "0x71C7656EC7ab88b098defB751B7401B5f6d8976F".to_string(),
            },
            CeremonyAction::InitSign => CeremonyResult::Signature {
                signature: vec![0x30; 64],
                recovery_id: Some(0),
            },
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.publish(&session_id, result);
        });

        Ok(ActionAck {
            session_id: request.session_id.clone(),
            accepted: true,
            message: None,
        })
    }
}

/// Fleet that accepts but never answers
struct SilentFleet;

#[async_trait]
impl ActionNotifier for SilentFleet {
    async fn notify_action(&self, request: &ActionRequest) -> Result<ActionAck> {
        Ok(ActionAck {
            session_id: request.session_id.clone(),
            accepted: true,
            message: None,
        })
    }
}

fn registry_with(ids: &[u64]) -> NodeRegistry {
    let registry = NodeRegistry::new();
    for id in ids {
        registry.register_node(NodeId(*id), format!("http://node{}:8080", id));
    }
    registry
}

fn config(policy: SelectionPolicy) -> CoordinatorConfig {
    CoordinatorConfig {
        selection_policy: policy,
        ..CoordinatorConfig::default()
    }
}

fn simulated(registry: NodeRegistry, policy: SelectionPolicy) -> (Arc<SessionCoordinator>, Arc<SimulatedFleet>) {
    let bus = ResultBus::new();
    let fleet = Arc::new(SimulatedFleet {
        bus: bus.clone(),
        delay: Duration::from_millis(20),
        seen: Mutex::new(Vec::new()),
    });
    let coordinator = SessionCoordinator::new(config(policy), registry, fleet.clone(), bus);
    (Arc::new(coordinator), fleet)
}

#[tokio::test]
async fn test_load_based_keygen_uses_least_loaded_nodes() {
    let registry = registry_with(&[1, 2, 3, 4]);
    registry.update_node_status(NodeId(1), 0.1, NodeStatus::Online);
    registry.update_node_status(NodeId(2), 0.9, NodeStatus::Online);
    registry.update_node_status(NodeId(3), 0.5, NodeStatus::Online);
    registry.update_node_status(NodeId(4), 0.2, NodeStatus::Online);

    let (coordinator, fleet) = simulated(registry.clone(), SelectionPolicy::LoadBased);
    let client = CeremonyClient::new(coordinator.clone());

    let outcome = client.create_wallet("alice", 4, 2).await.unwrap();

    assert_eq!(outcome.parties, vec![NodeId(1), NodeId(4)]);
    assert_eq!(
        outcome.public_address,
        "0x71c7656ec7ab88b098defb751b7401b5f6d8976f"
    );
    assert_eq!(fleet.seen.lock()[0].parties, vec![NodeId(1), NodeId(4)]);

    let record = coordinator.get_session(&outcome.session_id).unwrap();
    assert_eq!(record.state, SessionState::Completed);
    for node in registry.get_all_nodes().values() {
        assert_eq!(node.active_tasks, 0);
    }
}

#[tokio::test]
async fn test_round_robin_sign_is_deterministic_for_session() {
    let registry = registry_with(&[1, 2, 3]);
    let (coordinator, fleet) = simulated(registry, SelectionPolicy::RoundRobin);

    let outcome = CeremonyClient::new(coordinator)
        .sign(vec![0xde; 32], b"share".to_vec(), 3, 2)
        .await
        .unwrap();

    let sent = fleet.seen.lock()[0].clone();
    assert_eq!(sent.parties, outcome.parties);
    assert_eq!(sent.msg_hash, Some(vec![0xde; 32]));
    assert_eq!(outcome.signature, vec![0x30; 64]);

    // Two consecutive IDs starting at the session's offset
    let first = outcome.parties[0].0;
    assert_eq!(outcome.parties[1].0, first % 3 + 1);
}

#[tokio::test]
async fn test_insufficient_online_nodes_for_every_policy() {
    for policy in [
        SelectionPolicy::RoundRobin,
        SelectionPolicy::LoadBased,
        SelectionPolicy::AvailabilityBased,
        SelectionPolicy::Random,
    ] {
        let registry = registry_with(&[1, 2]);
        let (coordinator, fleet) = simulated(registry.clone(), policy);
        let before = registry.get_all_nodes();

        let err = coordinator
            .start_session(SessionRequest::keygen("bob", 5, 3))
            .await
            .err()
            .unwrap();

        assert!(
            matches!(err, OrchestrationError::InsufficientNodes { available: 2, required: 3 }),
            "{} returned {:?}",
            policy,
            err
        );
        assert!(fleet.seen.lock().is_empty());
        assert_eq!(registry.get_all_nodes(), before);
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_fleet_times_out_and_releases_nodes() {
    let registry = registry_with(&[1, 2, 3]);
    let coordinator = SessionCoordinator::new(
        config(SelectionPolicy::AvailabilityBased),
        registry.clone(),
        Arc::new(SilentFleet),
        ResultBus::new(),
    );

    let err = coordinator
        .run_session(SessionRequest::keygen("carol", 3, 3), Some(Duration::from_secs(300)))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Timeout(_)));
    assert!(err.is_retryable());
    for id in 1..=3 {
        assert_eq!(registry.get_node_info(NodeId(id)).unwrap().active_tasks, 0);
    }

    let records = coordinator.list_sessions();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, SessionState::Failed);
    assert_eq!(records[0].parties, vec![NodeId(1), NodeId(2), NodeId(3)]);
    assert_eq!(coordinator.results().topic_count(), 0);
}

#[tokio::test]
async fn test_concurrent_sessions_leave_no_busy_nodes() {
    let registry = registry_with(&[1, 2, 3, 4, 5]);
    let (coordinator, _fleet) = simulated(registry.clone(), SelectionPolicy::AvailabilityBased);
    let client = CeremonyClient::new(coordinator.clone());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let client = client.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.update_node_status(NodeId(i % 5 + 1), 0.3, NodeStatus::Online);
                client.create_wallet(&format!("user-{}", i), 5, 3).await
            })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.parties.len(), 3);
    }

    for node in registry.get_all_nodes().values() {
        assert_eq!(node.active_tasks, 0, "{} leaked a busy mark", node.id);
    }
    assert_eq!(coordinator.active_session_count(), 0);
    assert_eq!(coordinator.list_sessions().len(), 20);
}

#[tokio::test]
async fn test_deregistration_mid_session_is_harmless() {
    let registry = registry_with(&[1, 2, 3]);
    let coordinator = SessionCoordinator::new(
        config(SelectionPolicy::LoadBased),
        registry.clone(),
        Arc::new(SilentFleet),
        ResultBus::new(),
    );

    let pending = coordinator
        .start_session(SessionRequest::keygen("dave", 3, 3))
        .await
        .unwrap();
    registry.deregister_node(NodeId(2));

    let session_id = pending.session_id().clone();
    coordinator.results().publish(
        &session_id,
        CeremonyResult::Keygen {
            share_data: "c2hhcmU=".to_string(),
            public_address: "0xabc".to_string(),
        },
    );
    pending.wait(Duration::from_secs(5)).await.unwrap();

    assert!(registry.get_node_info(NodeId(2)).is_none());
    assert_eq!(registry.get_node_info(NodeId(1)).unwrap().active_tasks, 0);
    assert_eq!(registry.get_node_info(NodeId(3)).unwrap().active_tasks, 0);
}
