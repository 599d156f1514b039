//! HTTP error type and its JSON envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::core::errors::StoreError;

/// Error returned by request handlers, rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum AppError {
    /// The request body is well-formed JSON but not acceptable.
    Validation(String),
    /// Anything else.
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Validation(msg) | Self::Internal(msg) => msg,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.message(), "Request failed");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Body sent when a handler panics.
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let message = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(ToString::to_string))
        .unwrap_or_else(|| "internal server error".to_string());
    AppError::Internal(message).into_response()
}
