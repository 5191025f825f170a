//! Usage reporting endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{context::RequestContext, state::AppState, usage::UsageCounts, ApiResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageResponse {
    pub organization_id: Uuid,
    #[serde(flatten)]
    pub counts: UsageCounts,
}

/// GET /api/v1/usage - Ceremony counts for the caller's organization
pub async fn get_usage(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Json<UsageResponse>> {
    Ok(Json(UsageResponse {
        organization_id: ctx.organization_id,
        counts: state.usage.counts_for(ctx.organization_id),
    }))
}
