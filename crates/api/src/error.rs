//! API error responses

use alerting::AlertError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Alert(#[from] AlertError),

    /// Malformed query parameter or body field
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Alert(AlertError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Alert(AlertError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Alert(AlertError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Alert(AlertError::Repository { .. }) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
