//! HTTP API for the threshold ceremony coordinator
//!
//! - `/health`: liveness plus a short cluster summary
//! - `/api/v1/...`: node membership, ceremonies, sessions and usage
//! - `/internal/...`: result publication by the nodes

pub mod context;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod usage;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub use context::{Permission, RequestContext};
pub use error::{ApiError, ErrorBody};
pub use state::{AppState, CeremonyDefaults};

/// Result type for endpoint handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Build the complete router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api/v1", routes::api_routes())
        .nest("/internal", routes::internal::routes())
        .with_state(state)
}

/// Serve the API on `addr` until the task is aborted
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
