//! Keygen and signing business logic handlers

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use threshold_orchestrator::{KeygenOutcome, SignOutcome};
use tracing::info;

use crate::context::{Permission, RequestContext};
use crate::error::ApiError;
use crate::state::AppState;
use crate::usage::UsageEvent;

/// Run a keygen ceremony on behalf of the caller's organization
pub async fn create_wallet(
    state: &AppState,
    ctx: &RequestContext,
    identity: &str,
    total_nodes: Option<u32>,
    threshold: Option<u32>,
) -> Result<KeygenOutcome, ApiError> {
    ctx.require(Permission::WalletsCreate)?;

    let identity = identity.trim();
    if identity.is_empty() {
        return Err(ApiError::BadRequest("identity must not be empty".to_string()));
    }

    let total_nodes = total_nodes.unwrap_or(state.defaults.total_nodes);
    let threshold = threshold.unwrap_or(state.defaults.threshold);
    info!(
        "{} requested keygen for {} ({}-of-{})",
        ctx.principal, identity, threshold, total_nodes
    );

    let outcome = state
        .ceremonies
        .create_wallet(identity, total_nodes, threshold)
        .await;

    let event = if outcome.is_ok() {
        UsageEvent::WalletCreated
    } else {
        UsageEvent::CeremonyFailed
    };
    state.usage.record(ctx.organization_id, event);

    Ok(outcome?)
}

/// Run a signing ceremony over a hex digest with a base64 share
pub async fn sign(
    state: &AppState,
    ctx: &RequestContext,
    message_hash: &str,
    share_data: &str,
    total_nodes: Option<u32>,
    threshold: Option<u32>,
) -> Result<SignOutcome, ApiError> {
    ctx.require(Permission::TransactionsSign)?;

    let digest = decode_digest(message_hash)?;
    let share = BASE64
        .decode(share_data.trim())
        .map_err(|e| ApiError::BadRequest(format!("share_data is not valid base64: {}", e)))?;

    let total_nodes = total_nodes.unwrap_or(state.defaults.total_nodes);
    let threshold = threshold.unwrap_or(state.defaults.threshold);
    info!(
        "{} requested signature over {} ({}-of-{})",
        ctx.principal,
        hex::encode(&digest),
        threshold,
        total_nodes
    );

    let outcome = state
        .ceremonies
        .sign(digest, share, total_nodes, threshold)
        .await;

    let event = if outcome.is_ok() {
        UsageEvent::SignatureProduced
    } else {
        UsageEvent::CeremonyFailed
    };
    state.usage.record(ctx.organization_id, event);

    Ok(outcome?)
}

fn decode_digest(message_hash: &str) -> Result<Vec<u8>, ApiError> {
    let trimmed = message_hash.trim();
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let digest = hex::decode(raw)
        .map_err(|e| ApiError::BadRequest(format!("message_hash is not valid hex: {}", e)))?;
    if digest.is_empty() {
        return Err(ApiError::BadRequest("message_hash must not be empty".to_string()));
    }
    Ok(digest)
}
