//! Internal API handlers for node-to-coordinator communication

use threshold_orchestrator::ResultBus;
use threshold_types::{CeremonyResult, SessionId};
use tracing::info;

use crate::error::ApiError;

/// Hand a finished ceremony to whoever is waiting on the session
pub fn publish_result(
    results: &ResultBus,
    session_id: &str,
    result: CeremonyResult,
) -> Result<(), ApiError> {
    let session_id = SessionId::from(session_id);
    info!("Received ceremony result for session {}", session_id);

    if results.publish(&session_id, result) {
        Ok(())
    } else {
        Err(ApiError::NoSubscriber(session_id.to_string()))
    }
}
