//! Per-organization ceremony usage counters
//!
//! Recording is fire-and-forget: each event is applied on a detached task so
//! request latency never depends on bookkeeping.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEvent {
    WalletCreated,
    SignatureProduced,
    CeremonyFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounts {
    pub wallets_created: u64,
    pub signatures_produced: u64,
    pub ceremonies_failed: u64,
}

impl UsageCounts {
    fn apply(&mut self, event: UsageEvent) {
        match event {
            UsageEvent::WalletCreated => self.wallets_created += 1,
            UsageEvent::SignatureProduced => self.signatures_produced += 1,
            UsageEvent::CeremonyFailed => self.ceremonies_failed += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UsageRecorder {
    counts: Arc<RwLock<HashMap<Uuid, UsageCounts>>>,
}

impl UsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` for `organization_id` in the background
    pub fn record(&self, organization_id: Uuid, event: UsageEvent) -> JoinHandle<()> {
        let counts = Arc::clone(&self.counts);
        tokio::spawn(async move {
            counts
                .write()
                .entry(organization_id)
                .or_default()
                .apply(event);
            debug!("Recorded {:?} for organization {}", event, organization_id);
        })
    }

    pub fn counts_for(&self, organization_id: Uuid) -> UsageCounts {
        self.counts
            .read()
            .get(&organization_id)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_are_per_organization() {
        let recorder = UsageRecorder::new();
        let acme = Uuid::new_v4();
        let globex = Uuid::new_v4();

        recorder.record(acme, UsageEvent::WalletCreated).await.unwrap();
        recorder.record(acme, UsageEvent::SignatureProduced).await.unwrap();
        recorder.record(acme, UsageEvent::SignatureProduced).await.unwrap();
        recorder.record(globex, UsageEvent::CeremonyFailed).await.unwrap();

        assert_eq!(
            recorder.counts_for(acme),
            UsageCounts {
                wallets_created: 1,
                signatures_produced: 2,
                ceremonies_failed: 0,
            }
        );
        assert_eq!(recorder.counts_for(globex).ceremonies_failed, 1);
        assert_eq!(recorder.counts_for(Uuid::new_v4()), UsageCounts::default());
    }
}
