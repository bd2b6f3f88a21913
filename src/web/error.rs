//! API error taxonomy
//!
//! Every failure is terminal for the current request: no retries, no
//! partial stats payloads. Each variant maps to a status code and a stable
//! machine-readable code the dashboard can branch on.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

use super::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("server misconfigured: {0}")]
    Misconfigured(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotConfigured => ApiError::Misconfigured(err.to_string()),
            AuthError::BadCredential => ApiError::Unauthorized,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
            ),
            ApiError::Misconfigured(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_misconfigured",
                self.to_string(),
            ),
            // Grouped with storage failures as a server error; the collect
            // integration is fire-and-forget and owns any retry
            ApiError::InvalidPayload(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "invalid_payload",
                self.to_string(),
            ),
            ApiError::Storage(e) => {
                tracing::error!("Storage failure: {}", e);
                // Internal details stay in the log
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "storage failure".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}
