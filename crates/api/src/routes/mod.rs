//! HTTP routes

pub mod ceremonies;
pub mod health;
pub mod internal;
pub mod nodes;
pub mod sessions;
pub mod usage;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Public `/api/v1` routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/nodes", post(nodes::register_node).get(nodes::list_nodes))
        .route(
            "/nodes/:id",
            get(nodes::get_node).delete(nodes::deregister_node),
        )
        .route("/nodes/:id/heartbeat", post(nodes::heartbeat))
        .route("/wallets", post(ceremonies::create_wallet))
        .route("/signatures", post(ceremonies::sign))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", get(sessions::get_session))
        .route("/usage", get(usage::get_usage))
}
