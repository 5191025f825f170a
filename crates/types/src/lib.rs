use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Unique identifier for a node in the threshold network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// Ceremony session identifier.
///
/// Used both as the correlation key of the start notification and as the
/// topic on which the ceremony result is published. Not a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a fresh random session identifier
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

/// Node availability as reported by heartbeats.
///
/// Only `Online` nodes are eligible for health-aware quorum selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    Maintenance,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
            NodeStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl FromStr for NodeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(NodeStatus::Online),
            "offline" => Ok(NodeStatus::Offline),
            "maintenance" => Ok(NodeStatus::Maintenance),
            other => Err(Error::InvalidNodeStatus(other.to_string())),
        }
    }
}

/// Live view of one peer node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    /// Opaque connection string used by the node-communication boundary
    pub address: String,
    /// Self-reported load in [0.0, 1.0], advisory only
    pub load: f64,
    pub status: NodeStatus,
    /// Most recent registration or heartbeat
    pub last_seen: DateTime<Utc>,
    /// Ceremonies this node is currently participating in
    pub active_tasks: u32,
}

impl NodeInfo {
    /// A freshly registered node: online, idle, zero load
    pub fn new(id: NodeId, address: String) -> Self {
        Self {
            id,
            address,
            load: 0.0,
            status: NodeStatus::Online,
            last_seen: Utc::now(),
            active_tasks: 0,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}

/// Ceremony kind requested from the nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyAction {
    InitKeygen,
    InitSign,
}

impl fmt::Display for CeremonyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeremonyAction::InitKeygen => write!(f, "init_keygen"),
            CeremonyAction::InitSign => write!(f, "init_sign"),
        }
    }
}

/// Start notification sent to the node-communication boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub session_id: SessionId,
    /// Ordered party list chosen by the quorum selector
    pub parties: Vec<NodeId>,
    pub threshold: u32,
    pub action: CeremonyAction,
    /// Identity the key is generated for (keygen only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Message digest to sign (sign only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_hash: Option<Vec<u8>>,
    /// Caller's encrypted key share (sign only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_data: Option<Vec<u8>>,
}

/// Acknowledgement returned by the node-communication boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    pub session_id: SessionId,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Final ceremony payload published on the session's result topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CeremonyResult {
    /// Key generation output: opaque share material plus the derived address
    Keygen {
        share_data: String,
        public_address: String,
    },
    /// Signing output
    Signature {
        signature: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recovery_id: Option<u8>,
    },
}

impl CeremonyResult {
    /// Whether this payload is the one expected for `action`
    pub fn matches(&self, action: CeremonyAction) -> bool {
        matches!(
            (self, action),
            (CeremonyResult::Keygen { .. }, CeremonyAction::InitKeygen)
                | (CeremonyResult::Signature { .. }, CeremonyAction::InitSign)
        )
    }
}

/// Session lifecycle: `Created -> Dispatched -> {Completed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Dispatched,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Dispatched => write!(f, "dispatched"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Result type for type-level parsing
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid node status: {0}")]
    InvalidNodeStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(3).to_string(), "node-3");
    }

    #[test]
    fn test_node_status_parse() {
        assert_eq!("online".parse::<NodeStatus>().unwrap(), NodeStatus::Online);
        assert_eq!(" Maintenance ".parse::<NodeStatus>().unwrap(), NodeStatus::Maintenance);
        assert!("sleeping".parse::<NodeStatus>().is_err());
    }

    #[test]
    fn test_new_node_defaults() {
        let node = NodeInfo::new(NodeId(1), "http://node1:8080".to_string());
        assert!(node.is_online());
        assert_eq!(node.active_tasks, 0);
        assert_eq!(node.load, 0.0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_ceremony_result_wire_format() {
        let json = r#"{"kind":"keygen","share_data":"c2hhcmU=","public_address":"0xabc"}"#;
        let result: CeremonyResult = serde_json::from_str(json).unwrap();
        assert!(result.matches(CeremonyAction::InitKeygen));
        assert!(!result.matches(CeremonyAction::InitSign));
    }

    #[test]
    fn test_action_request_omits_sign_fields_for_keygen() {
        let req = ActionRequest {
            session_id: SessionId::from("abc"),
            parties: vec![NodeId(1), NodeId(2)],
            threshold: 2,
            action: CeremonyAction::InitKeygen,
            identity: Some("user-1".to_string()),
            msg_hash: None,
            share_data: None,
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["action"], "init_keygen");
        assert!(value.get("msg_hash").is_none());
        assert!(value.get("share_data").is_none());
    }
}
