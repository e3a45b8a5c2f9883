use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthRejected;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("trip {0} has no assigned driver")]
    NoAssignedDriver(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthRejected> for AppError {
    fn from(err: AuthRejected) -> Self {
        match err {
            AuthRejected::RoleNotAllowed(_) => AppError::Forbidden(err.to_string()),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NoAssignedDriver(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Store(StoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Store(err @ StoreError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, err.to_string())
            }
            AppError::Store(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
