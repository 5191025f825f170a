//! Session diagnostics endpoints
//!
//! Both endpoints need a request context so session IDs are not enumerable
//! by anonymous callers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use threshold_orchestrator::SessionRecord;
use threshold_types::SessionId;

use crate::{context::RequestContext, state::AppState, ApiResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionRecord>,
    pub active: usize,
}

/// GET /api/v1/sessions - All retained sessions, newest first
pub async fn list_sessions(
    State(state): State<AppState>,
    _ctx: RequestContext,
) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.coordinator.list_sessions(),
        active: state.coordinator.active_session_count(),
    })
}

/// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    _ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionRecord>> {
    Ok(Json(state.coordinator.get_session(&SessionId::from(id))?))
}
