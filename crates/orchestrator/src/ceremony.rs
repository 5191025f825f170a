//! Caller-side ceremony entry points
//!
//! Thin driver over the [`SessionCoordinator`]: build the request, run the
//! session to its terminal state and unpack the payload. Persisting the
//! returned share material is the caller's concern.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use threshold_types::{CeremonyResult, NodeId, SessionId};

use crate::coordinator::{SessionCoordinator, SessionRequest};
use crate::error::{OrchestrationError, Result};

/// Outcome of a completed key generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenOutcome {
    pub session_id: SessionId,
    pub parties: Vec<NodeId>,
    pub share_data: String,
    pub public_address: String,
}

/// Outcome of a completed signing ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOutcome {
    pub session_id: SessionId,
    pub parties: Vec<NodeId>,
    pub signature: Vec<u8>,
    pub recovery_id: Option<u8>,
}

/// Keygen and signing front-end over a shared coordinator
#[derive(Clone)]
pub struct CeremonyClient {
    coordinator: Arc<SessionCoordinator>,
    result_timeout: Duration,
}

impl CeremonyClient {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        let result_timeout = coordinator.config().result_timeout;
        Self {
            coordinator,
            result_timeout,
        }
    }

    /// Override the default deadline for awaiting results
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Run a key generation ceremony for `identity`
    pub async fn create_wallet(
        &self,
        identity: &str,
        total_nodes: u32,
        threshold: u32,
    ) -> Result<KeygenOutcome> {
        let request = SessionRequest::keygen(identity, total_nodes, threshold);
        let (session_id, parties, result) = self
            .coordinator
            .run_session(request, Some(self.result_timeout))
            .await?;

        match result {
            CeremonyResult::Keygen {
                share_data,
                public_address,
            } => {
                info!("Wallet for {} created in session {}", identity, session_id);
                Ok(KeygenOutcome {
                    session_id,
                    parties,
                    share_data,
                    public_address: public_address.to_lowercase(),
                })
            }
            CeremonyResult::Signature { .. } => Err(OrchestrationError::Internal(format!(
                "Session {} returned a signature for a keygen request",
                session_id
            ))),
        }
    }

    /// Run a signing ceremony over `message_digest` with a previously issued share
    pub async fn sign(
        &self,
        message_digest: Vec<u8>,
        encrypted_share: Vec<u8>,
        total_nodes: u32,
        threshold: u32,
    ) -> Result<SignOutcome> {
        let request = SessionRequest::sign(message_digest, encrypted_share, total_nodes, threshold);
        let (session_id, parties, result) = self
            .coordinator
            .run_session(request, Some(self.result_timeout))
            .await?;

        match result {
            CeremonyResult::Signature {
                signature,
                recovery_id,
            } => {
                info!("Signature produced in session {}", session_id);
                Ok(SignOutcome {
                    session_id,
                    parties,
                    signature,
                    recovery_id,
                })
            }
            CeremonyResult::Keygen { .. } => Err(OrchestrationError::Internal(format!(
                "Session {} returned key material for a signing request",
                session_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::notifier::ActionNotifier;
    use crate::registry::NodeRegistry;
    use crate::result_bus::ResultBus;
    use async_trait::async_trait;
    use threshold_types::{ActionAck, ActionRequest, CeremonyAction};

    /// Accepts every request and answers it on the bus like a healthy fleet
    struct EchoFleet {
        bus: ResultBus,
    }

    #[async_trait]
    impl ActionNotifier for EchoFleet {
        async fn notify_action(&self, request: &ActionRequest) -> Result<ActionAck> {
            let result = match request.action {
                CeremonyAction::InitKeygen => CeremonyResult::Keygen {
                    share_data: format!("share-for-{}", request.identity.clone().unwrap_or_default()),
                    public_address: "0xAbCdEf".to_string(),
                },
                CeremonyAction::InitSign => CeremonyResult::Signature {
                    signature: request.msg_hash.clone().unwrap_or_default(),
                    recovery_id: Some(1),
                },
            };
            self.bus.publish(&request.session_id, result);

            Ok(ActionAck {
                session_id: request.session_id.clone(),
                accepted: true,
                message: None,
            })
        }
    }

    fn client() -> CeremonyClient {
        let registry = NodeRegistry::new();
        for id in 1..=3 {
            registry.register_node(NodeId(id), format!("http://node{}:8080", id));
        }
        let bus = ResultBus::new();
        let coordinator = SessionCoordinator::new(
            CoordinatorConfig::default(),
            registry,
            Arc::new(EchoFleet { bus: bus.clone() }),
            bus,
        );
        CeremonyClient::new(Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_create_wallet_lowercases_address() {
        let client = client();
        let outcome = client.create_wallet("alice", 3, 2).await.unwrap();

        assert_eq!(outcome.public_address, "0xabcdef");
        assert_eq!(outcome.share_data, "share-for-alice");
        assert_eq!(outcome.parties.len(), 2);
    }

    #[tokio::test]
    async fn test_sign_returns_signature() {
        let client = client();
        let outcome = client.sign(vec![7; 32], vec![1, 2], 3, 3).await.unwrap();

        assert_eq!(outcome.signature, vec![7; 32]);
        assert_eq!(outcome.recovery_id, Some(1));
        assert_eq!(outcome.parties, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[tokio::test]
    async fn test_sign_without_digest_is_invalid() {
        let err = client().sign(Vec::new(), vec![1], 3, 2).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidRequest(_)));
    }
}
