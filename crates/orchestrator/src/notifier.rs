//! Node-communication boundary
//!
//! The coordinator sends exactly one start notification per session through an
//! [`ActionNotifier`]. The receiving side fans the request out to the selected
//! parties; the cryptographic rounds happen between the nodes themselves.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use threshold_types::{ActionAck, ActionRequest};

use crate::error::{OrchestrationError, Result};

/// Delivers ceremony start notifications to the node fleet
#[async_trait]
pub trait ActionNotifier: Send + Sync {
    /// Send `request` once. Transport failures map to `DispatchFailed`.
    async fn notify_action(&self, request: &ActionRequest) -> Result<ActionAck>;
}

/// Notifier that POSTs the request as JSON to `{endpoint}/internal/notify-action`
pub struct HttpActionNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpActionNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestrationError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn notify_url(&self) -> String {
        format!("{}/internal/notify-action", self.endpoint)
    }
}

#[async_trait]
impl ActionNotifier for HttpActionNotifier {
    async fn notify_action(&self, request: &ActionRequest) -> Result<ActionAck> {
        let url = self.notify_url();
        debug!(
            "Sending {} notification for session {} to {}",
            request.action, request.session_id, url
        );

        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!("Notification for session {} failed: {}", request.session_id, e);
                OrchestrationError::DispatchFailed(format!("{} unreachable: {}", url, e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OrchestrationError::DispatchFailed(format!(
                "{} answered HTTP {}",
                url, status
            )));
        }

        resp.json::<ActionAck>()
            .await
            .map_err(|e| OrchestrationError::DispatchFailed(format!("Malformed acknowledgement: {}", e)))
    }
}
