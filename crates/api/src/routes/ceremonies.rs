//! Keygen and signing endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use threshold_types::{NodeId, SessionId};

use crate::{context::RequestContext, handlers::ceremony, state::AppState, ApiResult};

/// Request to generate a new threshold key
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWalletRequest {
    pub identity: String,
    #[serde(default)]
    pub total_nodes: Option<u32>,
    #[serde(default)]
    pub threshold: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub session_id: SessionId,
    pub parties: Vec<NodeId>,
    /// Encrypted share material; storing it is the caller's job
    pub share_data: String,
    pub public_address: String,
}

/// Request to sign a digest with an existing share
#[derive(Debug, Serialize, Deserialize)]
pub struct SignRequest {
    /// Hex digest, optional `0x` prefix
    pub message_hash: String,
    /// Base64 share returned by wallet creation
    pub share_data: String,
    #[serde(default)]
    pub total_nodes: Option<u32>,
    #[serde(default)]
    pub threshold: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub session_id: SessionId,
    pub parties: Vec<NodeId>,
    /// Hex-encoded signature
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_id: Option<u8>,
}

/// POST /api/v1/wallets - Run a keygen ceremony
pub async fn create_wallet(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<(StatusCode, Json<WalletResponse>)> {
    let outcome =
        ceremony::create_wallet(&state, &ctx, &req.identity, req.total_nodes, req.threshold)
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(WalletResponse {
            session_id: outcome.session_id,
            parties: outcome.parties,
            share_data: outcome.share_data,
            public_address: outcome.public_address,
        }),
    ))
}

/// POST /api/v1/signatures - Run a signing ceremony
pub async fn sign(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<SignRequest>,
) -> ApiResult<Json<SignatureResponse>> {
    let outcome = ceremony::sign(
        &state,
        &ctx,
        &req.message_hash,
        &req.share_data,
        req.total_nodes,
        req.threshold,
    )
    .await?;

    Ok(Json(SignatureResponse {
        session_id: outcome.session_id,
        parties: outcome.parties,
        signature: hex::encode(outcome.signature),
        recovery_id: outcome.recovery_id,
    }))
}
