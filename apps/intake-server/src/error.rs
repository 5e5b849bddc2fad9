//! Error types for the intake server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use intake_core::IntakeError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing X-User-Id header")]
    Unauthorized,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Upload limit of {limit} reached for the {plan} plan")]
    QuotaExceeded { plan: String, limit: u32 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("No document loaded")]
    NoDocument,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<IntakeError> for ApiError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::MalformedUpload(msg) => ApiError::MalformedUpload(msg),
            IntakeError::NoDocument => ApiError::NoDocument,
            e @ (IntakeError::InvalidZoom { .. } | IntakeError::PageOutOfRange { .. }) => {
                ApiError::InvalidRequest(e.to_string())
            }
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::SessionExpired(_) => (StatusCode::GONE, self.to_string()),
            ApiError::QuotaExceeded { .. } => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::MalformedUpload(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::NoDocument => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
