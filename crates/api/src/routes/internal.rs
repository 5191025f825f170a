//! Internal API routes for node-to-coordinator communication

use crate::handlers::internal;
use crate::state::AppState;
use crate::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use threshold_types::CeremonyResult;

/// Create internal routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/results/:session_id", post(publish_result))
}

/// POST /internal/results/:session_id - Deliver a finished ceremony
pub async fn publish_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(result): Json<CeremonyResult>,
) -> ApiResult<StatusCode> {
    internal::publish_result(&state.results, &session_id, result)?;
    Ok(StatusCode::ACCEPTED)
}
