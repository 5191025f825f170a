//! API error envelope
//!
//! Every failure leaves the server as `{"error": <message>, "error_code": <CODE>}`
//! with a status code that depends only on the error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use threshold_orchestrator::OrchestrationError;

/// JSON body returned on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("No subscriber for session {0}")]
    NoSubscriber(String),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("{0}")]
    InternalError(String),
}

impl ApiError {
    /// HTTP status and stable error code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "INSUFFICIENT_PERMISSIONS"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::NoSubscriber(_) => (StatusCode::NOT_FOUND, "NO_SUBSCRIBER"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Orchestration(e) => match e {
                OrchestrationError::InsufficientNodes { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "INSUFFICIENT_NODES")
                }
                OrchestrationError::DispatchFailed(_) => (StatusCode::BAD_GATEWAY, "DISPATCH_FAILED"),
                OrchestrationError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "CEREMONY_TIMEOUT"),
                OrchestrationError::Cancelled(_) => (StatusCode::CONFLICT, "SESSION_CANCELLED"),
                OrchestrationError::InvalidThreshold(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_THRESHOLD")
                }
                OrchestrationError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
                OrchestrationError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
                OrchestrationError::UnknownNode(_) => (StatusCode::NOT_FOUND, "NODE_NOT_FOUND"),
                OrchestrationError::ResultChannelClosed(_)
                | OrchestrationError::Config(_)
                | OrchestrationError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!("Request failed with {}: {}", code, self);
        } else {
            warn!("Request rejected with {}: {}", code, self);
        }

        // Internal details stay in the log
        let message = match &self {
            ApiError::InternalError(_)
            | ApiError::Orchestration(OrchestrationError::Internal(_))
            | ApiError::Orchestration(OrchestrationError::Config(_)) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: message,
            error_code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
