//! Session-keyed result delivery
//!
//! Publish/subscribe bridge between the node that finishes a ceremony and the
//! caller awaiting it. Each session owns one topic; the topic exists exactly as
//! long as its [`ResultSubscription`] is alive.
//!
//! ```text
//! node (HTTP)            ResultBus                 PendingSession
//! ┌──────────┐  publish  ┌────────────────┐  recv  ┌──────────────┐
//! │ result   ├──────────►│ topic=session  ├───────►│ wait()       │
//! └──────────┘           └────────────────┘        └──────────────┘
//! ```

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use threshold_types::{CeremonyResult, SessionId};

use crate::error::{OrchestrationError, Result};

type Topics = Arc<Mutex<HashMap<SessionId, Sender<CeremonyResult>>>>;

/// In-process result channel namespaced by session ID
#[derive(Debug, Clone, Default)]
pub struct ResultBus {
    topics: Topics,
}

impl ResultBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the topic for `session_id`.
    ///
    /// Fails if the topic already has a live subscriber, so two sessions can
    /// never share a result stream.
    pub fn subscribe(&self, session_id: &SessionId) -> Result<ResultSubscription> {
        let mut topics = self.topics.lock();
        if topics.contains_key(session_id) {
            warn!("Rejecting duplicate subscription for session {}", session_id);
            return Err(OrchestrationError::Internal(format!(
                "Session {} already has a result subscriber",
                session_id
            )));
        }

        // One completion message is expected per session
        let (tx, rx) = async_channel::bounded(1);
        topics.insert(session_id.clone(), tx);
        debug!("Subscribed to results for session {}", session_id);

        Ok(ResultSubscription {
            session_id: session_id.clone(),
            receiver: rx,
            topics: Arc::clone(&self.topics),
        })
    }

    /// Deliver a result to the session's subscriber.
    ///
    /// Returns `false` when nobody is listening or a result was already
    /// delivered; the message is dropped in both cases.
    pub fn publish(&self, session_id: &SessionId, result: CeremonyResult) -> bool {
        let sender = self.topics.lock().get(session_id).cloned();

        match sender {
            Some(sender) => match sender.try_send(result) {
                Ok(()) => {
                    info!("Delivered result for session {}", session_id);
                    true
                }
                Err(e) => {
                    warn!("Dropping result for session {}: {}", session_id, e);
                    false
                }
            },
            None => {
                warn!("No subscriber for session {}, dropping result", session_id);
                false
            }
        }
    }

    /// Whether a subscriber is waiting on `session_id`
    pub fn is_subscribed(&self, session_id: &SessionId) -> bool {
        self.topics.lock().contains_key(session_id)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    /// Close every topic; pending waits observe a closed channel
    pub fn close_all(&self) {
        let mut topics = self.topics.lock();
        info!("Closing {} result topics", topics.len());
        topics.clear();
    }
}

/// Live subscription to one session's result topic. Unsubscribes on drop.
#[derive(Debug)]
pub struct ResultSubscription {
    session_id: SessionId,
    receiver: Receiver<CeremonyResult>,
    topics: Topics,
}

impl ResultSubscription {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Wait for the session's result
    pub async fn recv(&self) -> Result<CeremonyResult> {
        self.receiver
            .recv()
            .await
            .map_err(|_| OrchestrationError::ResultChannelClosed(self.session_id.clone()))
    }
}

impl Drop for ResultSubscription {
    fn drop(&mut self) {
        self.topics.lock().remove(&self.session_id);
        debug!("Unsubscribed from results for session {}", self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keygen_result() -> CeremonyResult {
        CeremonyResult::Keygen {
            share_data: "c2hhcmU=".to_string(),
            public_address: "0xabc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = ResultBus::new();
        let session = SessionId::from("s1");
        let sub = bus.subscribe(&session).unwrap();

        assert!(bus.publish(&session, keygen_result()));
        assert_eq!(sub.recv().await.unwrap(), keygen_result());
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_dropped() {
        let bus = ResultBus::new();
        assert!(!bus.publish(&SessionId::from("nobody"), keygen_result()));
    }

    #[tokio::test]
    async fn test_only_first_result_is_accepted() {
        let bus = ResultBus::new();
        let session = SessionId::from("s1");
        let _sub = bus.subscribe(&session).unwrap();

        assert!(bus.publish(&session, keygen_result()));
        assert!(!bus.publish(&session, keygen_result()));
    }

    #[test]
    fn test_duplicate_subscription_rejected() {
        let bus = ResultBus::new();
        let session = SessionId::from("s1");
        let _sub = bus.subscribe(&session).unwrap();
        assert!(bus.subscribe(&session).is_err());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = ResultBus::new();
        let session = SessionId::from("s1");

        let sub = bus.subscribe(&session).unwrap();
        assert!(bus.is_subscribed(&session));
        drop(sub);

        assert!(!bus.is_subscribed(&session));
        assert_eq!(bus.topic_count(), 0);
        assert!(bus.subscribe(&session).is_ok());
    }

    #[tokio::test]
    async fn test_close_all_fails_pending_waits() {
        let bus = ResultBus::new();
        let session = SessionId::from("s1");
        let sub = bus.subscribe(&session).unwrap();

        bus.close_all();

        let err = sub.recv().await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ResultChannelClosed(_)));
    }
}
